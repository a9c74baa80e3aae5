//! Client holders
//!
//! A [`ClientHolder`] binds one transport connection to a single priority
//! partition of a channel. It carries the partition identity and the
//! per-client statistics, and wraps the transport calls with active-request
//! accounting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, warn};

use courier_common::{
    Direction, MessageFilterWrapper, ResourceProfile, StatsSettings, TransmissionPayload,
};
use crate::comms_metrics;
use crate::statistics::{ActiveGuard, StatsContainer, StatsSnapshot};
use crate::Result;

// ============================================================================
// Transport traits
// ============================================================================

/// Inbound side of a concrete transport backend
#[async_trait]
pub trait ListenerTransport: Send + Sync {
    /// Open the connection and begin receiving
    async fn start(&self) -> Result<()>;

    /// Close the connection
    async fn stop(&self) -> Result<()>;

    /// Pull up to `count` payloads, waiting at most `wait` for the first one.
    /// `None` returns immediately with whatever is available.
    async fn messages_pull(
        &self,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>>;

    /// Report the outcome of processing a pulled payload (complete/abandon)
    async fn message_signal(&self, _payload: &TransmissionPayload, _success: bool) -> Result<()> {
        Ok(())
    }

    /// Reconfigure the subscription for a new filter list without a restart.
    /// Backends with no server-side filtering leave this as a no-op.
    async fn validate(&self, _filters: &[MessageFilterWrapper]) -> Result<()> {
        Ok(())
    }
}

/// Outbound side of a concrete transport backend
#[async_trait]
pub trait SenderTransport: Send + Sync {
    async fn start(&self) -> Result<()>;

    async fn stop(&self) -> Result<()>;

    /// Deliver one payload
    async fn transmit(&self, payload: &TransmissionPayload) -> Result<()>;
}

// ============================================================================
// Client holder
// ============================================================================

pub type ListenerClientHolder = ClientHolder<dyn ListenerTransport>;
pub type SenderClientHolder = ClientHolder<dyn SenderTransport>;

/// Derived client name: `"{Direction}|{ChannelId}|{Priority}"`
pub fn client_name(direction: Direction, channel_id: &str, priority: i32) -> String {
    format!("{}|{}|{}", direction, channel_id, priority)
}

pub struct ClientHolder<T: ?Sized> {
    direction: Direction,
    priority: i32,
    channel_id: String,
    mapping_channel_id: Option<String>,
    name: String,
    resource_profiles: Vec<ResourceProfile>,
    supports_rate_limiting: bool,
    active: AtomicBool,
    stats: StatsContainer,
    transport: Arc<T>,
}

impl<T: ?Sized> std::fmt::Debug for ClientHolder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHolder")
            .field("direction", &self.direction)
            .field("priority", &self.priority)
            .field("channel_id", &self.channel_id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> ClientHolder<T> {
    pub fn new(
        direction: Direction,
        priority: i32,
        channel_id: &str,
        mapping_channel_id: Option<&str>,
        transport: Arc<T>,
        stats_settings: StatsSettings,
    ) -> Self {
        Self {
            direction,
            priority,
            channel_id: channel_id.to_string(),
            mapping_channel_id: mapping_channel_id.map(str::to_string),
            name: client_name(direction, channel_id, priority),
            resource_profiles: Vec::new(),
            supports_rate_limiting: false,
            active: AtomicBool::new(false),
            stats: StatsContainer::new(stats_settings),
            transport,
        }
    }

    pub fn with_resource_profiles(mut self, profiles: Vec<ResourceProfile>) -> Self {
        self.resource_profiles = profiles;
        self
    }

    pub fn with_rate_limiting(mut self, supported: bool) -> Self {
        self.supports_rate_limiting = supported;
        self
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    pub fn mapping_channel_id(&self) -> Option<&str> {
        self.mapping_channel_id.as_deref()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resource_profiles(&self) -> &[ResourceProfile] {
        &self.resource_profiles
    }

    pub fn supports_rate_limiting(&self) -> bool {
        self.supports_rate_limiting
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    pub fn stats(&self) -> &StatsContainer {
        &self.stats
    }

    /// Start tick of the new operation
    pub fn active_increment(&self) -> u32 {
        self.stats.active_increment()
    }

    pub fn active_decrement(&self, start: u32) {
        self.stats.active_decrement(start);
    }

    /// Active count held until the guard drops
    pub fn track(&self) -> ActiveGuard<'_> {
        self.stats.track()
    }

    pub fn error_increment(&self) {
        self.stats.error_increment();
    }

    pub fn active_count(&self) -> i64 {
        self.stats.active_count()
    }

    pub fn error_count(&self) -> u64 {
        self.stats.error_count()
    }

    pub fn statistics(&self) -> ClientStatistics {
        ClientStatistics {
            name: self.name.clone(),
            direction: self.direction,
            priority: self.priority,
            is_active: self.is_active(),
            stats: self.stats.snapshot(),
        }
    }

    fn set_active(&self, active: bool) -> bool {
        self.active.swap(active, Ordering::SeqCst)
    }
}

impl ClientHolder<dyn ListenerTransport> {
    pub async fn start(&self) -> Result<()> {
        self.transport.start().await?;
        self.set_active(true);
        info!(client = %self.name, "Listener client started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        if !self.set_active(false) {
            debug!(client = %self.name, "Listener client already stopped");
        }
        self.transport.stop().await?;
        info!(client = %self.name, "Listener client stopped");
        Ok(())
    }

    pub async fn validate(&self, filters: &[MessageFilterWrapper]) -> Result<()> {
        self.transport.validate(filters).await
    }

    /// Pull payloads from the transport, stamping each with this client as
    /// its source.
    pub async fn messages_pull(
        &self,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>> {
        let pulled = {
            let _active = self.track();
            self.transport.messages_pull(count, wait).await
        };

        match pulled {
            Ok(mut payloads) => {
                for payload in payloads.iter_mut() {
                    payload.source = Some(self.name.clone());
                    payload.trace_write(format!("Pulled: {}", self.name));
                }
                comms_metrics::record_messages_pulled(&self.channel_id, payloads.len());
                Ok(payloads)
            }
            Err(e) => {
                self.error_increment();
                warn!(client = %self.name, error = %e, "Message pull failed");
                Err(e)
            }
        }
    }

    pub async fn message_signal(&self, payload: &TransmissionPayload, success: bool) -> Result<()> {
        self.transport.message_signal(payload, success).await
    }
}

impl ClientHolder<dyn SenderTransport> {
    pub async fn start(&self) -> Result<()> {
        self.transport.start().await?;
        self.set_active(true);
        info!(client = %self.name, "Sender client started");
        Ok(())
    }

    pub async fn stop(&self) -> Result<()> {
        self.set_active(false);
        self.transport.stop().await?;
        info!(client = %self.name, "Sender client stopped");
        Ok(())
    }

    pub async fn transmit(&self, payload: &TransmissionPayload) -> Result<()> {
        self.transport.transmit(payload).await
    }
}

/// Serializable view of one client
#[derive(Debug, Clone, Serialize)]
pub struct ClientStatistics {
    pub name: String,
    pub direction: Direction,
    pub priority: i32,
    pub is_active: bool,
    pub stats: StatsSnapshot,
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::ServiceMessage;
    use parking_lot::Mutex;

    struct QueueListener {
        queued: Mutex<Vec<TransmissionPayload>>,
        fail: bool,
    }

    #[async_trait]
    impl ListenerTransport for QueueListener {
        async fn start(&self) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }

        async fn messages_pull(
            &self,
            count: usize,
            _wait: Option<Duration>,
        ) -> Result<Vec<TransmissionPayload>> {
            if self.fail {
                return Err(crate::CommsError::transport("queue", "connection reset"));
            }
            let mut queued = self.queued.lock();
            let take = count.min(queued.len());
            Ok(queued.drain(..take).collect())
        }
    }

    fn holder(fail: bool) -> ListenerClientHolder {
        let queued = (0..3)
            .map(|_| TransmissionPayload::new(ServiceMessage::new("orders", "order", "create")))
            .collect();
        let transport: Arc<dyn ListenerTransport> = Arc::new(QueueListener {
            queued: Mutex::new(queued),
            fail,
        });
        ClientHolder::new(Direction::Listener, 1, "orders", None, transport, StatsSettings::default())
    }

    #[test]
    fn test_client_name() {
        assert_eq!(client_name(Direction::Listener, "orders", 1), "Listener|orders|1");
        assert_eq!(client_name(Direction::Sender, "orders", -2), "Sender|orders|-2");
    }

    #[tokio::test]
    async fn test_pull_stamps_source_and_trace() {
        let client = holder(false);
        client.start().await.unwrap();
        assert!(client.is_active());

        let payloads = client.messages_pull(2, None).await.unwrap();
        assert_eq!(payloads.len(), 2);
        for payload in &payloads {
            assert_eq!(payload.source.as_deref(), Some("Listener|orders|1"));
            assert!(payload.trace_contains("Pulled: Listener|orders|1"));
        }
        assert_eq!(client.active_count(), 0);
        assert_eq!(client.stats().completed_count(), 1);
    }

    #[tokio::test]
    async fn test_pull_failure_counts_error() {
        let client = holder(true);
        assert!(client.messages_pull(1, None).await.is_err());
        assert_eq!(client.error_count(), 1);
        assert_eq!(client.active_count(), 0);
    }

    #[tokio::test]
    async fn test_stop_clears_active() {
        let client = holder(false);
        client.start().await.unwrap();
        client.stop().await.unwrap();
        assert!(!client.is_active());
        assert!(!client.statistics().is_active);
    }
}
