//! In-process transport backend
//!
//! [`ManualFabric`] is a set of in-memory queues keyed by `(channel, priority)`.
//! [`ManualClientFactory`] builds sender transports that enqueue into it and
//! listener transports that drain it, applying the last filter list they were
//! given the way a broker applies subscription rules.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, trace};

use courier_common::{
    AgentSettings, ListenerPartitionConfig, MessageFilterWrapper, SenderPartitionConfig,
    TransmissionPayload,
};
use crate::client::{ListenerTransport, SenderTransport};
use crate::factory::ClientFactory;
use crate::{CommsError, Result};

// ============================================================================
// Fabric
// ============================================================================

type QueueKey = (String, i32);

#[derive(Default)]
pub struct ManualFabric {
    queues: DashMap<QueueKey, VecDeque<TransmissionPayload>>,
    notify: Notify,
}

impl ManualFabric {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(channel_id: &str, priority: i32) -> QueueKey {
        (channel_id.to_lowercase(), priority)
    }

    pub fn enqueue(&self, channel_id: &str, priority: i32, payload: TransmissionPayload) {
        self.queues
            .entry(Self::key(channel_id, priority))
            .or_default()
            .push_back(payload);
        self.notify.notify_waiters();
    }

    pub fn dequeue(&self, channel_id: &str, priority: i32, count: usize) -> Vec<TransmissionPayload> {
        match self.queues.get_mut(&Self::key(channel_id, priority)) {
            Some(mut queue) => {
                let take = count.min(queue.len());
                queue.drain(..take).collect()
            }
            None => Vec::new(),
        }
    }

    pub fn depth(&self, channel_id: &str, priority: i32) -> usize {
        self.queues
            .get(&Self::key(channel_id, priority))
            .map(|q| q.len())
            .unwrap_or(0)
    }

    /// Total queued payloads across every channel and priority
    pub fn total_depth(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    async fn wait_for_enqueue(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

// ============================================================================
// Transports
// ============================================================================

/// Start/stop/validate call counts for one manual transport
#[derive(Debug, Default)]
pub struct ManualTransportCounters {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub validations: AtomicUsize,
}

impl ManualTransportCounters {
    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn validations(&self) -> usize {
        self.validations.load(Ordering::SeqCst)
    }
}

pub struct ManualSender {
    fabric: Arc<ManualFabric>,
    priority: i32,
    running: AtomicBool,
    counters: Arc<ManualTransportCounters>,
}

#[async_trait]
impl SenderTransport for ManualSender {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn transmit(&self, payload: &TransmissionPayload) -> Result<()> {
        if !self.running.load(Ordering::SeqCst) {
            return Err(CommsError::transport(
                format!("manual|{}", payload.message.channel_id),
                "sender is not running",
            ));
        }

        self.fabric
            .enqueue(&payload.message.channel_id, self.priority, payload.clone());
        trace!(payload_id = %payload.id, priority = self.priority, "Enqueued on manual fabric");
        Ok(())
    }
}

pub struct ManualListener {
    fabric: Arc<ManualFabric>,
    channel_id: String,
    priority: i32,
    filters: RwLock<Vec<MessageFilterWrapper>>,
    running: AtomicBool,
    counters: Arc<ManualTransportCounters>,
}

impl ManualListener {
    fn pull_matching(&self, count: usize) -> Vec<TransmissionPayload> {
        let filters = self.filters.read();
        let mut delivered = Vec::new();

        // Drain in bounded chunks so unmatched payloads are discarded without
        // starving the caller of matched ones
        while delivered.len() < count {
            let chunk = self.fabric.dequeue(&self.channel_id, self.priority, count - delivered.len());
            if chunk.is_empty() {
                break;
            }
            for payload in chunk {
                if filters.iter().any(|f| f.matches(&payload.message)) {
                    delivered.push(payload);
                } else {
                    debug!(
                        payload_id = %payload.id,
                        channel_id = %self.channel_id,
                        "Discarding payload with no matching filter"
                    );
                }
            }
        }
        delivered
    }
}

#[async_trait]
impl ListenerTransport for ManualListener {
    async fn start(&self) -> Result<()> {
        self.running.store(true, Ordering::SeqCst);
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.running.store(false, Ordering::SeqCst);
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn messages_pull(
        &self,
        count: usize,
        wait: Option<Duration>,
    ) -> Result<Vec<TransmissionPayload>> {
        if !self.running.load(Ordering::SeqCst) || count == 0 {
            return Ok(Vec::new());
        }

        let deadline = wait.map(|w| tokio::time::Instant::now() + w);
        loop {
            let delivered = self.pull_matching(count);
            if !delivered.is_empty() {
                return Ok(delivered);
            }

            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(tokio::time::Instant::now()),
                None => return Ok(delivered),
            };
            if remaining.is_zero() {
                return Ok(delivered);
            }
            // Short slices so an enqueue racing the check is never missed for long
            self.fabric
                .wait_for_enqueue(remaining.min(Duration::from_millis(50)))
                .await;
        }
    }

    async fn validate(&self, filters: &[MessageFilterWrapper]) -> Result<()> {
        *self.filters.write() = filters.to_vec();
        self.counters.validations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Factory
// ============================================================================

pub struct ManualClientFactory {
    fabric: Arc<ManualFabric>,
    listener_counters: DashMap<i32, Arc<ManualTransportCounters>>,
    sender_counters: DashMap<i32, Arc<ManualTransportCounters>>,
}

impl ManualClientFactory {
    pub fn new(fabric: Arc<ManualFabric>) -> Self {
        Self {
            fabric,
            listener_counters: DashMap::new(),
            sender_counters: DashMap::new(),
        }
    }

    pub fn fabric(&self) -> &Arc<ManualFabric> {
        &self.fabric
    }

    /// Counters shared by every listener transport built for `priority`
    pub fn listener_counters(&self, priority: i32) -> Arc<ManualTransportCounters> {
        self.listener_counters.entry(priority).or_default().clone()
    }

    /// Counters shared by every sender transport built for `priority`
    pub fn sender_counters(&self, priority: i32) -> Arc<ManualTransportCounters> {
        self.sender_counters.entry(priority).or_default().clone()
    }
}

#[async_trait]
impl ClientFactory for ManualClientFactory {
    async fn listener_client_create(
        &self,
        settings: &AgentSettings,
        partition: &ListenerPartitionConfig,
        filters: &[MessageFilterWrapper],
    ) -> Result<Arc<dyn ListenerTransport>> {
        Ok(Arc::new(ManualListener {
            fabric: self.fabric.clone(),
            channel_id: settings.listening_channel_id().to_string(),
            priority: partition.priority,
            filters: RwLock::new(filters.to_vec()),
            running: AtomicBool::new(false),
            counters: self.listener_counters(partition.priority),
        }))
    }

    async fn sender_create(
        &self,
        _settings: &AgentSettings,
        partition: &SenderPartitionConfig,
    ) -> Result<Arc<dyn SenderTransport>> {
        Ok(Arc::new(ManualSender {
            fabric: self.fabric.clone(),
            priority: partition.priority,
            running: AtomicBool::new(false),
            counters: self.sender_counters(partition.priority),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_common::ServiceMessage;

    fn payload(channel: &str, message_type: &str) -> TransmissionPayload {
        TransmissionPayload::new(ServiceMessage::new(channel, message_type, "create"))
    }

    #[test]
    fn test_fabric_is_case_insensitive_on_channel() {
        let fabric = ManualFabric::new();
        fabric.enqueue("Orders", 1, payload("Orders", "order"));
        assert_eq!(fabric.depth("orders", 1), 1);
        assert_eq!(fabric.depth("orders", 0), 0);

        let pulled = fabric.dequeue("ORDERS", 1, 10);
        assert_eq!(pulled.len(), 1);
        assert_eq!(fabric.total_depth(), 0);
    }

    #[tokio::test]
    async fn test_listener_discards_unmatched() {
        let fabric = Arc::new(ManualFabric::new());
        let listener = ManualListener {
            fabric: fabric.clone(),
            channel_id: "orders".to_string(),
            priority: 0,
            filters: RwLock::new(vec![MessageFilterWrapper::new("orders", Some("order"), None)]),
            running: AtomicBool::new(false),
            counters: Arc::new(ManualTransportCounters::default()),
        };
        listener.start().await.unwrap();

        fabric.enqueue("orders", 0, payload("orders", "invoice"));
        fabric.enqueue("orders", 0, payload("orders", "order"));

        let pulled = listener.messages_pull(10, None).await.unwrap();
        assert_eq!(pulled.len(), 1);
        assert_eq!(pulled[0].message.message_type.as_deref(), Some("order"));
        assert_eq!(fabric.depth("orders", 0), 0);
    }

    #[tokio::test]
    async fn test_listener_waits_for_enqueue() {
        let fabric = Arc::new(ManualFabric::new());
        let factory = ManualClientFactory::new(fabric.clone());
        let settings = AgentSettings::new("orders", courier_common::Capabilities::Listener);
        let filters = vec![MessageFilterWrapper::new("orders", None, None)];
        let listener = factory
            .listener_client_create(&settings, &ListenerPartitionConfig::new(0), &filters)
            .await
            .unwrap();
        listener.start().await.unwrap();

        let producer = fabric.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.enqueue("orders", 0, payload("orders", "order"));
        });

        let pulled = listener
            .messages_pull(1, Some(Duration::from_secs(2)))
            .await
            .unwrap();
        assert_eq!(pulled.len(), 1);
    }

    #[tokio::test]
    async fn test_stopped_sender_rejects() {
        let factory = ManualClientFactory::new(Arc::new(ManualFabric::new()));
        let settings = AgentSettings::new("orders", courier_common::Capabilities::Sender);
        let sender = factory
            .sender_create(&settings, &SenderPartitionConfig::new(1))
            .await
            .unwrap();

        assert!(sender.transmit(&payload("orders", "order")).await.is_err());
        sender.start().await.unwrap();
        sender.transmit(&payload("orders", "order")).await.unwrap();
        assert_eq!(factory.fabric().depth("orders", 1), 1);
        assert_eq!(factory.sender_counters(1).starts(), 1);
    }
}
