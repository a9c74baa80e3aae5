//! Communication Agent - lifecycle and partition orchestration
//!
//! Handles:
//! - The `Stopped -> Starting -> Running -> Stopping -> Stopped` state machine
//! - One listener and one sender client per configured priority partition
//! - Filter-driven diff-and-patch revalidation of listener clients
//! - Sender resolution with default-priority fallback
//! - Transmission with guaranteed active-count release

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use courier_common::{
    AgentSettings, Capabilities, Direction, EventCategory, EventSeverity, ListenerPartitionConfig,
    MessageFilterWrapper, SenderPartitionConfig, ServiceStatus, StatsSettings,
    TransmissionPayload,
};
use crate::client::{
    ClientHolder, ClientStatistics, ListenerClientHolder, SenderClientHolder,
};
use crate::collector::DataCollector;
use crate::comms_metrics;
use crate::error::StartupStage;
use crate::factory::ClientFactory;
use crate::statistics::ResourceTracker;
use crate::{CommsError, Result};

// ============================================================================
// Capability traits
// ============================================================================

/// Generic service lifecycle
#[async_trait]
pub trait Service: Send + Sync {
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
    fn status(&self) -> ServiceStatus;
}

/// Inbound capability surface
#[async_trait]
pub trait Listener: Service {
    fn channel_id(&self) -> &str;
    fn priority_partitions(&self) -> Vec<i32>;
    fn clients(&self) -> Vec<Arc<ListenerClientHolder>>;

    /// Pull from the client at `priority`. An idle partition yields nothing.
    async fn messages_pull(
        &self,
        priority: i32,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>>;
}

/// Outbound capability surface
#[async_trait]
pub trait Sender: Service {
    fn channel_id(&self) -> &str;
    fn priority_partitions(&self) -> Vec<i32>;
    fn clients(&self) -> Vec<Arc<SenderClientHolder>>;
    async fn transmit(&self, payload: &mut TransmissionPayload) -> Result<()>;
}

// ============================================================================
// Revalidation
// ============================================================================

/// Outcome of comparing the stored filter list with an incoming one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RevalidationAction {
    StopAll,
    StartAll,
    Revalidate,
    Unchanged,
}

pub(crate) fn revalidation_action(
    old: &[MessageFilterWrapper],
    new: &[MessageFilterWrapper],
) -> RevalidationAction {
    if new.is_empty() {
        return RevalidationAction::StopAll;
    }
    if old.is_empty() {
        return RevalidationAction::StartAll;
    }

    let old: HashSet<&MessageFilterWrapper> = old.iter().collect();
    let new: HashSet<&MessageFilterWrapper> = new.iter().collect();
    if old.symmetric_difference(&new).next().is_some() {
        RevalidationAction::Revalidate
    } else {
        RevalidationAction::Unchanged
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Serializable view of an agent and its clients
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatistics {
    pub channel_id: String,
    pub status: ServiceStatus,
    pub listener_start_count: u64,
    pub sender_start_count: u64,
    pub listeners: Vec<ClientStatistics>,
    pub senders: Vec<ClientStatistics>,
    pub supported_message_types: Vec<String>,
}

pub struct CommunicationAgent {
    settings: AgentSettings,
    factory: Arc<dyn ClientFactory>,
    collector: Option<Arc<dyn DataCollector>>,
    resource_tracker: Option<Arc<ResourceTracker>>,
    stats_settings: StatsSettings,
    status: AtomicU8,
    /// Serializes start/stop
    lifecycle: Mutex<()>,
    listener_clients: DashMap<i32, Arc<ListenerClientHolder>>,
    sender_clients: DashMap<i32, Arc<SenderClientHolder>>,
    /// Filters for the listening channel; kept across stop/start
    supported_message_types: RwLock<Vec<MessageFilterWrapper>>,
    /// No two revalidations interleave, and stop waits for an in-progress one
    revalidate_lock: Mutex<()>,
    listener_start_count: AtomicU64,
    sender_start_count: AtomicU64,
}

impl CommunicationAgent {
    pub fn new(settings: AgentSettings, factory: Arc<dyn ClientFactory>) -> Self {
        Self {
            settings,
            factory,
            collector: None,
            resource_tracker: None,
            stats_settings: StatsSettings::default(),
            status: AtomicU8::new(ServiceStatus::Stopped.as_u8()),
            lifecycle: Mutex::new(()),
            listener_clients: DashMap::new(),
            sender_clients: DashMap::new(),
            supported_message_types: RwLock::new(Vec::new()),
            revalidate_lock: Mutex::new(()),
            listener_start_count: AtomicU64::new(0),
            sender_start_count: AtomicU64::new(0),
        }
    }

    pub fn with_collector(mut self, collector: Arc<dyn DataCollector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn with_resource_tracker(mut self, tracker: Arc<ResourceTracker>) -> Self {
        self.resource_tracker = Some(tracker);
        self
    }

    pub fn with_stats_settings(mut self, settings: StatsSettings) -> Self {
        self.stats_settings = settings;
        self
    }

    pub fn settings(&self) -> &AgentSettings {
        &self.settings
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus::from_u8(self.status.load(Ordering::SeqCst))
    }

    fn set_status(&self, status: ServiceStatus) {
        self.status.store(status.as_u8(), Ordering::SeqCst);
    }

    pub fn channel_id(&self) -> &str {
        &self.settings.channel_id
    }

    pub fn mapping_channel_id(&self) -> Option<&str> {
        self.settings.mapping_channel_id.as_deref()
    }

    pub fn listening_channel_id(&self) -> &str {
        self.settings.listening_channel_id()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.settings.capabilities
    }

    pub fn can_listen(&self) -> bool {
        self.settings.capabilities.can_listen()
    }

    pub fn can_send(&self) -> bool {
        self.settings.capabilities.can_send()
    }

    pub fn listener_start_count(&self) -> u64 {
        self.listener_start_count.load(Ordering::SeqCst)
    }

    pub fn sender_start_count(&self) -> u64 {
        self.sender_start_count.load(Ordering::SeqCst)
    }

    fn report(&self, category: EventCategory, error: &CommsError) {
        if let Some(collector) = &self.collector {
            collector.exception(category, &self.settings.channel_id, error);
        }
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Start the agent. Only valid from `Stopped`.
    ///
    /// Senders are validated and started before listeners. Any failure leaves
    /// the agent `Faulted`; partitions that already started stay started.
    pub async fn start(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let status = self.status();
        if status != ServiceStatus::Stopped {
            return Err(CommsError::InvalidState { operation: "start", status });
        }

        self.set_status(ServiceStatus::Starting);
        info!(
            channel_id = %self.settings.channel_id,
            capabilities = ?self.settings.capabilities,
            "Starting communication agent"
        );

        match self.start_internal().await {
            Ok(()) => {
                self.set_status(ServiceStatus::Running);
                info!(
                    channel_id = %self.settings.channel_id,
                    listeners = self.listener_clients.len(),
                    senders = self.sender_clients.len(),
                    "Communication agent running"
                );
                Ok(())
            }
            Err(e) => {
                self.set_status(ServiceStatus::Faulted);
                error!(channel_id = %self.settings.channel_id, error = %e, "Communication agent startup failed");
                if let Some(collector) = &self.collector {
                    collector.event(
                        EventCategory::Startup,
                        EventSeverity::Critical,
                        e.to_string(),
                        self.settings.channel_id.clone(),
                    );
                }
                Err(e)
            }
        }
    }

    async fn start_internal(&self) -> Result<()> {
        self.settings_validate()?;
        let channel_id = self.settings.channel_id.as_str();

        if self.can_send() {
            self.sender_settings_validate()
                .map_err(|e| CommsError::startup(channel_id, StartupStage::SenderSettings, e))?;
            self.senders_start_all()
                .await
                .map_err(|e| CommsError::startup(channel_id, StartupStage::SenderStart, e))?;
        }

        if self.can_listen() {
            self.listener_settings_validate()
                .map_err(|e| CommsError::startup(channel_id, StartupStage::ListenerSettings, e))?;

            let has_filters = !self.supported_message_types.read().is_empty();
            if has_filters {
                self.listener_clients_start_all()
                    .await
                    .map_err(|e| CommsError::startup(channel_id, StartupStage::ListenerStart, e))?;
            } else {
                debug!(channel_id = %channel_id, "No active filters, listeners idle until a filter change");
            }
        }

        Ok(())
    }

    /// Stop the agent. Valid from `Running` or `Faulted`.
    ///
    /// Listeners are torn down before senders. Teardown continues past
    /// individual client failures; the first failure is returned and the
    /// agent always ends `Stopped`.
    pub async fn stop(&self) -> Result<()> {
        let _lifecycle = self.lifecycle.lock().await;

        let status = self.status();
        if !matches!(status, ServiceStatus::Running | ServiceStatus::Faulted) {
            return Err(CommsError::InvalidState { operation: "stop", status });
        }

        self.set_status(ServiceStatus::Stopping);
        info!(channel_id = %self.settings.channel_id, "Stopping communication agent");

        let _revalidate = self.revalidate_lock.lock().await;
        let listeners = self.listener_clients_stop_all().await;
        let senders = self.senders_stop_all().await;

        self.set_status(ServiceStatus::Stopped);
        info!(channel_id = %self.settings.channel_id, "Communication agent stopped");

        listeners.and(senders)
    }

    // ------------------------------------------------------------------------
    // Settings validation
    // ------------------------------------------------------------------------

    pub fn settings_validate(&self) -> Result<()> {
        if self.settings.channel_id.trim().is_empty() {
            return Err(CommsError::ChannelIdUndefined);
        }
        Ok(())
    }

    pub fn listener_settings_validate(&self) -> Result<()> {
        self.partitions_validate(
            Direction::Listener,
            self.settings.listener_partitions.iter().map(|p| p.priority),
        )
    }

    pub fn sender_settings_validate(&self) -> Result<()> {
        self.partitions_validate(
            Direction::Sender,
            self.settings.sender_partitions.iter().map(|p| p.priority),
        )
    }

    fn partitions_validate(
        &self,
        direction: Direction,
        priorities: impl Iterator<Item = i32>,
    ) -> Result<()> {
        let mut seen = HashSet::new();
        for priority in priorities {
            if !seen.insert(priority) {
                return Err(CommsError::DuplicatePriority {
                    channel_id: self.settings.channel_id.clone(),
                    direction,
                    priority,
                });
            }
        }

        if seen.is_empty() {
            return Err(CommsError::PartitionsUndefined {
                channel_id: self.settings.channel_id.clone(),
                direction,
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listener clients
    // ------------------------------------------------------------------------

    /// Create, register and start the listener client for one partition.
    pub async fn listener_client_start(&self, partition: &ListenerPartitionConfig) -> Result<()> {
        match self.listener_client_start_internal(partition).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    channel_id = %self.settings.channel_id,
                    priority = partition.priority,
                    error = %e,
                    "Failed to start listener client"
                );
                self.report(EventCategory::Listener, &e);
                Err(e)
            }
        }
    }

    async fn listener_client_start_internal(&self, partition: &ListenerPartitionConfig) -> Result<()> {
        let filters = self.supported_message_types();
        let transport = self
            .factory
            .listener_client_create(&self.settings, partition, &filters)
            .await?;

        let client = Arc::new(
            ClientHolder::new(
                Direction::Listener,
                partition.priority,
                &self.settings.channel_id,
                self.settings.mapping_channel_id.as_deref(),
                transport,
                self.stats_settings,
            )
            .with_resource_profiles(self.settings.resource_profiles.clone())
            .with_rate_limiting(partition.supports_rate_limiting),
        );

        if let Some(previous) = self.listener_clients.insert(partition.priority, client.clone()) {
            if previous.is_active() {
                warn!(client = %previous.name(), "Replacing active listener client");
                if let Err(e) = previous.stop().await {
                    warn!(client = %previous.name(), error = %e, "Failed to stop replaced listener client");
                }
            }
        }

        client.start().await?;
        self.listener_start_count.fetch_add(1, Ordering::SeqCst);
        comms_metrics::record_client_start(&self.settings.channel_id, Direction::Listener);
        Ok(())
    }

    /// Stop and deregister the listener client at `priority`, if any.
    pub async fn listener_client_stop(&self, priority: i32) -> Result<()> {
        let Some((_, client)) = self.listener_clients.remove(&priority) else {
            return Ok(());
        };

        if let Err(e) = client.stop().await {
            error!(client = %client.name(), error = %e, "Failed to stop listener client");
            self.report(EventCategory::Listener, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Start every configured listener partition that is not already active.
    /// Stops at the first failure without rolling back earlier partitions.
    pub async fn listener_clients_start_all(&self) -> Result<()> {
        for partition in &self.settings.listener_partitions {
            let active = self
                .listener_clients
                .get(&partition.priority)
                .map(|c| c.is_active())
                .unwrap_or(false);
            if active {
                debug!(
                    channel_id = %self.settings.channel_id,
                    priority = partition.priority,
                    "Listener client already active"
                );
                continue;
            }
            self.listener_client_start(partition).await?;
        }
        Ok(())
    }

    /// Stop every listener client, continuing past failures.
    pub async fn listener_clients_stop_all(&self) -> Result<()> {
        let mut first_error = None;
        for priority in self.listener_client_priorities() {
            if let Err(e) = self.listener_client_stop(priority).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn listener_client_priorities(&self) -> Vec<i32> {
        let mut priorities: Vec<i32> = self.listener_clients.iter().map(|e| *e.key()).collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));
        priorities
    }

    /// Entry point for changes to the platform-wide active filter set.
    ///
    /// Only filters for this agent's listening channel are kept. Ignored
    /// unless the agent is running and can listen.
    pub async fn listener_commands_active_change(&self, filters: &[MessageFilterWrapper]) -> Result<()> {
        let listening = self.listening_channel_id();
        let relevant: Vec<MessageFilterWrapper> = filters
            .iter()
            .filter(|f| f.is_channel(listening))
            .cloned()
            .collect();

        if !self.can_listen() || self.status() != ServiceStatus::Running {
            debug!(
                channel_id = %self.settings.channel_id,
                status = %self.status(),
                "Ignoring filter change outside the running window"
            );
            return Ok(());
        }

        self.listener_clients_validate(relevant).await
    }

    /// Replace the stored filter list and reconcile the listener clients.
    ///
    /// - new list empty: stop all listener clients
    /// - old list empty: start all configured partitions
    /// - lists differ as sets: push the new list to every client
    /// - otherwise nothing happens
    pub async fn listener_clients_validate(&self, filters: Vec<MessageFilterWrapper>) -> Result<()> {
        let _revalidate = self.revalidate_lock.lock().await;

        // Stop may have begun while waiting for the lock
        if self.status() != ServiceStatus::Running {
            return Ok(());
        }

        let action = {
            let mut current = self.supported_message_types.write();
            let previous = std::mem::replace(&mut *current, filters.clone());
            revalidation_action(&previous, &current)
        };

        debug!(
            channel_id = %self.settings.channel_id,
            action = ?action,
            filters = filters.len(),
            "Listener filter change"
        );

        match action {
            RevalidationAction::Unchanged => Ok(()),
            RevalidationAction::StopAll => {
                info!(channel_id = %self.settings.channel_id, "No active filters, stopping listener clients");
                self.listener_clients_stop_all().await
            }
            RevalidationAction::StartAll => {
                info!(channel_id = %self.settings.channel_id, "Filters activated, starting listener clients");
                self.listener_clients_start_all().await
            }
            RevalidationAction::Revalidate => {
                comms_metrics::record_listener_revalidation(&self.settings.channel_id);
                let mut first_error = None;
                // Inactive clients pick the filters up on their next start
                for client in self.listener_clients().into_iter().filter(|c| c.is_active()) {
                    if let Err(e) = self.listener_client_validate(&client, &filters).await {
                        first_error.get_or_insert(e);
                    }
                }
                first_error.map_or(Ok(()), Err)
            }
        }
    }

    /// Push a new filter list down to one running client.
    pub async fn listener_client_validate(
        &self,
        client: &ListenerClientHolder,
        filters: &[MessageFilterWrapper],
    ) -> Result<()> {
        match client.validate(filters).await {
            Ok(()) => {
                debug!(client = %client.name(), filters = filters.len(), "Listener client revalidated");
                Ok(())
            }
            Err(e) => {
                client.error_increment();
                error!(client = %client.name(), error = %e, "Listener client revalidation failed");
                self.report(EventCategory::Listener, &e);
                Err(e)
            }
        }
    }

    /// Listener clients, highest priority first
    pub fn listener_clients(&self) -> Vec<Arc<ListenerClientHolder>> {
        let mut clients: Vec<_> = self.listener_clients.iter().map(|e| e.value().clone()).collect();
        clients.sort_by(|a, b| b.priority().cmp(&a.priority()));
        clients
    }

    pub fn listener_client(&self, priority: i32) -> Option<Arc<ListenerClientHolder>> {
        self.listener_clients.get(&priority).map(|c| c.clone())
    }

    /// Configured listener priorities, highest first
    pub fn listener_priority_partitions(&self) -> Vec<i32> {
        let mut priorities: Vec<i32> =
            self.settings.listener_partitions.iter().map(|p| p.priority).collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));
        priorities
    }

    pub fn supported_message_types(&self) -> Vec<MessageFilterWrapper> {
        self.supported_message_types.read().clone()
    }

    /// Pull from the listener client at `priority`. Idle partitions yield nothing.
    pub async fn listener_messages_pull(
        &self,
        priority: i32,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>> {
        match self.listener_client(priority) {
            Some(client) if client.is_active() => client.messages_pull(count, wait).await,
            _ => Ok(Vec::new()),
        }
    }

    /// Drive one backend poll cycle, for backends that support polling.
    pub async fn listener_poll(&self) -> Result<()> {
        if !(self.factory.listener_poll_supported() || self.factory.listener_poll_required()) {
            return Err(CommsError::NotImplemented("listener_poll"));
        }
        self.factory.listener_poll(&self.listener_clients()).await
    }

    /// Admission factor for this agent's listeners: the most restrictive
    /// adjustment across its resource profiles, `1.0` when untracked.
    pub fn listener_rate_limit_adjustment(&self) -> f64 {
        match &self.resource_tracker {
            Some(tracker) => tracker.rate_limit_adjustment_percentage(&self.settings.resource_profiles),
            None => 1.0,
        }
    }

    // ------------------------------------------------------------------------
    // Sender clients
    // ------------------------------------------------------------------------

    /// Create, register and start the sender client for one partition.
    pub async fn sender_start(&self, partition: &SenderPartitionConfig) -> Result<()> {
        match self.sender_start_internal(partition).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!(
                    channel_id = %self.settings.channel_id,
                    priority = partition.priority,
                    error = %e,
                    "Failed to start sender client"
                );
                self.report(EventCategory::Sender, &e);
                Err(e)
            }
        }
    }

    async fn sender_start_internal(&self, partition: &SenderPartitionConfig) -> Result<()> {
        let transport = self.factory.sender_create(&self.settings, partition).await?;

        let client = Arc::new(
            ClientHolder::new(
                Direction::Sender,
                partition.priority,
                &self.settings.channel_id,
                self.settings.mapping_channel_id.as_deref(),
                transport,
                self.stats_settings,
            )
            .with_resource_profiles(self.settings.resource_profiles.clone()),
        );

        if let Some(previous) = self.sender_clients.insert(partition.priority, client.clone()) {
            if previous.is_active() {
                warn!(client = %previous.name(), "Replacing active sender client");
                if let Err(e) = previous.stop().await {
                    warn!(client = %previous.name(), error = %e, "Failed to stop replaced sender client");
                }
            }
        }

        client.start().await?;
        self.sender_start_count.fetch_add(1, Ordering::SeqCst);
        comms_metrics::record_client_start(&self.settings.channel_id, Direction::Sender);
        Ok(())
    }

    /// Stop and deregister the sender client at `priority`, if any.
    pub async fn sender_stop(&self, priority: i32) -> Result<()> {
        let Some((_, client)) = self.sender_clients.remove(&priority) else {
            return Ok(());
        };

        if let Err(e) = client.stop().await {
            error!(client = %client.name(), error = %e, "Failed to stop sender client");
            self.report(EventCategory::Sender, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Start every configured sender partition, stopping at the first failure.
    pub async fn senders_start_all(&self) -> Result<()> {
        for partition in &self.settings.sender_partitions {
            self.sender_start(partition).await?;
        }
        Ok(())
    }

    /// Stop every sender client, continuing past failures.
    pub async fn senders_stop_all(&self) -> Result<()> {
        let mut priorities: Vec<i32> = self.sender_clients.iter().map(|e| *e.key()).collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));

        let mut first_error = None;
        for priority in priorities {
            if let Err(e) = self.sender_stop(priority).await {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Resolve the sender for `priority`: exact match, else the configured
    /// default priority, else an error naming the channel and priority.
    pub fn sender_client_resolve(&self, priority: i32) -> Result<Arc<SenderClientHolder>> {
        if self.sender_clients.is_empty() {
            return Err(CommsError::ClientsUndefined {
                channel_id: self.settings.channel_id.clone(),
                priority: None,
            });
        }

        if let Some(client) = self.sender_clients.get(&priority) {
            return Ok(client.clone());
        }

        self.settings
            .sender_default_priority
            .and_then(|default| self.sender_clients.get(&default).map(|c| c.clone()))
            .ok_or_else(|| CommsError::ClientsUndefined {
                channel_id: self.settings.channel_id.clone(),
                priority: Some(priority),
            })
    }

    /// Transmit a payload through the sender resolved from its channel priority.
    ///
    /// The payload trace records the outcome. Failures are logged, counted
    /// against the client and returned; nothing is retried here.
    pub async fn sender_transmit(&self, payload: &mut TransmissionPayload) -> Result<()> {
        let client = match self.sender_client_resolve(payload.message.channel_priority) {
            Ok(client) => client,
            Err(e) => {
                error!(
                    channel_id = %self.settings.channel_id,
                    priority = payload.message.channel_priority,
                    error = %e,
                    "sender_transmit: no sender client"
                );
                payload.trace_write(format!("Exception: {}", e));
                comms_metrics::record_transmit(&self.settings.channel_id, false);
                self.report(EventCategory::Transmission, &e);
                return Err(e);
            }
        };

        let result = {
            let _active = client.track();
            client.transmit(payload).await
        };

        match result {
            Ok(()) => {
                payload.trace_write(format!("Sent: {}", client.name()));
                comms_metrics::record_transmit(&self.settings.channel_id, true);
                Ok(())
            }
            Err(e) => {
                error!(
                    channel_id = %self.settings.channel_id,
                    client = %client.name(),
                    payload_id = %payload.id,
                    error = %e,
                    "sender_transmit: transmission failed"
                );
                payload.trace_write(format!("Exception: {}", e));
                client.error_increment();
                comms_metrics::record_transmit(&self.settings.channel_id, false);
                self.report(EventCategory::Transmission, &e);
                Err(e)
            }
        }
    }

    /// Sender clients, highest priority first
    pub fn sender_clients(&self) -> Vec<Arc<SenderClientHolder>> {
        let mut clients: Vec<_> = self.sender_clients.iter().map(|e| e.value().clone()).collect();
        clients.sort_by(|a, b| b.priority().cmp(&a.priority()));
        clients
    }

    /// Configured sender priorities, highest first
    pub fn sender_priority_partitions(&self) -> Vec<i32> {
        let mut priorities: Vec<i32> =
            self.settings.sender_partitions.iter().map(|p| p.priority).collect();
        priorities.sort_unstable_by(|a, b| b.cmp(a));
        priorities
    }

    // ------------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------------

    pub fn statistics(&self) -> AgentStatistics {
        AgentStatistics {
            channel_id: self.settings.channel_id.clone(),
            status: self.status(),
            listener_start_count: self.listener_start_count(),
            sender_start_count: self.sender_start_count(),
            listeners: self.listener_clients().iter().map(|c| c.statistics()).collect(),
            senders: self.sender_clients().iter().map(|c| c.statistics()).collect(),
            supported_message_types: self
                .supported_message_types
                .read()
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

#[async_trait]
impl Service for CommunicationAgent {
    async fn start(&self) -> Result<()> {
        CommunicationAgent::start(self).await
    }

    async fn stop(&self) -> Result<()> {
        CommunicationAgent::stop(self).await
    }

    fn status(&self) -> ServiceStatus {
        CommunicationAgent::status(self)
    }
}

#[async_trait]
impl Listener for CommunicationAgent {
    fn channel_id(&self) -> &str {
        &self.settings.channel_id
    }

    fn priority_partitions(&self) -> Vec<i32> {
        self.listener_priority_partitions()
    }

    fn clients(&self) -> Vec<Arc<ListenerClientHolder>> {
        self.listener_clients()
    }

    async fn messages_pull(
        &self,
        priority: i32,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>> {
        self.listener_messages_pull(priority, count, wait).await
    }
}

#[async_trait]
impl Sender for CommunicationAgent {
    fn channel_id(&self) -> &str {
        &self.settings.channel_id
    }

    fn priority_partitions(&self) -> Vec<i32> {
        self.sender_priority_partitions()
    }

    fn clients(&self) -> Vec<Arc<SenderClientHolder>> {
        self.sender_clients()
    }

    async fn transmit(&self, payload: &mut TransmissionPayload) -> Result<()> {
        self.sender_transmit(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(message_type: &str) -> MessageFilterWrapper {
        MessageFilterWrapper::new("orders", Some(message_type), None)
    }

    #[test]
    fn test_empty_new_list_stops_all() {
        assert_eq!(revalidation_action(&[filter("a")], &[]), RevalidationAction::StopAll);
        assert_eq!(revalidation_action(&[], &[]), RevalidationAction::StopAll);
    }

    #[test]
    fn test_empty_old_list_starts_all() {
        assert_eq!(revalidation_action(&[], &[filter("a")]), RevalidationAction::StartAll);
    }

    #[test]
    fn test_set_equality_is_unchanged() {
        let old = vec![filter("a"), filter("b")];
        let new = vec![filter("b"), filter("a"), filter("a")];
        assert_eq!(revalidation_action(&old, &new), RevalidationAction::Unchanged);
    }

    #[test]
    fn test_added_or_removed_entry_revalidates() {
        let old = vec![filter("a")];
        assert_eq!(
            revalidation_action(&old, &[filter("a"), filter("b")]),
            RevalidationAction::Revalidate
        );
        assert_eq!(
            revalidation_action(&[filter("a"), filter("b")], &old),
            RevalidationAction::Revalidate
        );
    }
}
