//! Shared mock transports for agent scenario tests.
//!
//! Every transport call is appended to a shared event log such as
//! `"listener_start:1"` or `"sender_stop:0"` so tests can assert on counts
//! and ordering.

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_comms::{
    ClientFactory, CommsError, CommunicationAgent, ListenerTransport, SenderTransport,
};
use courier_common::{
    AgentSettings, Capabilities, ListenerPartitionConfig, MessageFilterWrapper,
    SenderPartitionConfig, ServiceMessage, TransmissionPayload,
};

pub type EventLog = Arc<Mutex<Vec<String>>>;

pub struct MockListener {
    priority: i32,
    events: EventLog,
    fail_start: bool,
    fail_validate: bool,
    filters: Mutex<Vec<MessageFilterWrapper>>,
}

#[async_trait]
impl ListenerTransport for MockListener {
    async fn start(&self) -> courier_comms::Result<()> {
        if self.fail_start {
            return Err(CommsError::transport(
                format!("mock-listener-{}", self.priority),
                "listener refused to start",
            ));
        }
        self.events.lock().push(format!("listener_start:{}", self.priority));
        Ok(())
    }

    async fn stop(&self) -> courier_comms::Result<()> {
        self.events.lock().push(format!("listener_stop:{}", self.priority));
        Ok(())
    }

    async fn messages_pull(
        &self,
        _count: usize,
        _wait: Option<Duration>,
    ) -> courier_comms::Result<Vec<TransmissionPayload>> {
        Ok(Vec::new())
    }

    async fn validate(&self, filters: &[MessageFilterWrapper]) -> courier_comms::Result<()> {
        self.events
            .lock()
            .push(format!("listener_validate:{}:{}", self.priority, filters.len()));
        if self.fail_validate {
            return Err(CommsError::transport(
                format!("mock-listener-{}", self.priority),
                "rule update rejected",
            ));
        }
        *self.filters.lock() = filters.to_vec();
        Ok(())
    }
}

pub struct MockSender {
    priority: i32,
    events: EventLog,
    fail_transmit: Arc<AtomicBool>,
}

#[async_trait]
impl SenderTransport for MockSender {
    async fn start(&self) -> courier_comms::Result<()> {
        self.events.lock().push(format!("sender_start:{}", self.priority));
        Ok(())
    }

    async fn stop(&self) -> courier_comms::Result<()> {
        self.events.lock().push(format!("sender_stop:{}", self.priority));
        Ok(())
    }

    async fn transmit(&self, _payload: &TransmissionPayload) -> courier_comms::Result<()> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if self.fail_transmit.load(Ordering::SeqCst) {
            return Err(CommsError::transport(
                format!("mock-sender-{}", self.priority),
                "broker unavailable",
            ));
        }
        self.events.lock().push(format!("transmit:{}", self.priority));
        Ok(())
    }
}

/// Factory producing recording mock transports
#[derive(Default)]
pub struct MockFactory {
    pub events: EventLog,
    pub fail_listener_start: Mutex<HashSet<i32>>,
    pub fail_sender_start: Mutex<HashSet<i32>>,
    pub fail_validate: Mutex<HashSet<i32>>,
    pub fail_transmit: Arc<AtomicBool>,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events.lock().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn listener_client_create(
        &self,
        _settings: &AgentSettings,
        partition: &ListenerPartitionConfig,
        filters: &[MessageFilterWrapper],
    ) -> courier_comms::Result<Arc<dyn ListenerTransport>> {
        self.events
            .lock()
            .push(format!("listener_create:{}:{}", partition.priority, filters.len()));
        Ok(Arc::new(MockListener {
            priority: partition.priority,
            events: self.events.clone(),
            fail_start: self.fail_listener_start.lock().contains(&partition.priority),
            fail_validate: self.fail_validate.lock().contains(&partition.priority),
            filters: Mutex::new(filters.to_vec()),
        }))
    }

    async fn sender_create(
        &self,
        _settings: &AgentSettings,
        partition: &SenderPartitionConfig,
    ) -> courier_comms::Result<Arc<dyn SenderTransport>> {
        if self.fail_sender_start.lock().contains(&partition.priority) {
            return Err(CommsError::transport(
                format!("mock-sender-{}", partition.priority),
                "sender could not be created",
            ));
        }
        Ok(Arc::new(MockSender {
            priority: partition.priority,
            events: self.events.clone(),
            fail_transmit: self.fail_transmit.clone(),
        }))
    }
}

pub fn settings(
    channel_id: &str,
    capabilities: Capabilities,
    listeners: &[i32],
    senders: &[i32],
) -> AgentSettings {
    AgentSettings {
        listener_partitions: ListenerPartitionConfig::init(listeners),
        sender_partitions: SenderPartitionConfig::init(senders),
        ..AgentSettings::new(channel_id, capabilities)
    }
}

pub fn agent(settings: AgentSettings, factory: &Arc<MockFactory>) -> CommunicationAgent {
    CommunicationAgent::new(settings, factory.clone())
}

pub fn filter(channel_id: &str, message_type: &str) -> MessageFilterWrapper {
    MessageFilterWrapper::new(channel_id, Some(message_type), None)
}

pub fn payload(channel_id: &str, priority: i32) -> TransmissionPayload {
    TransmissionPayload::new(ServiceMessage::new(channel_id, "order", "create").with_priority(priority))
}
