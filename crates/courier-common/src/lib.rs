use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

pub mod logging;

// ============================================================================
// Agent Identity & Lifecycle
// ============================================================================

/// Declared capabilities of a communication agent, fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Capabilities {
    Listener,
    Sender,
    Bidirectional,
}

impl Capabilities {
    pub fn can_listen(&self) -> bool {
        matches!(self, Capabilities::Listener | Capabilities::Bidirectional)
    }

    pub fn can_send(&self) -> bool {
        matches!(self, Capabilities::Sender | Capabilities::Bidirectional)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::Bidirectional
    }
}

/// Direction of a partition or client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Listener,
    Sender,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Listener => write!(f, "Listener"),
            Direction::Sender => write!(f, "Sender"),
        }
    }
}

/// Generic service lifecycle state.
///
/// `Stopped -> Starting -> Running -> Stopping -> Stopped`, with `Faulted`
/// entered when startup fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ServiceStatus {
    Stopped,
    Starting,
    Running,
    Stopping,
    Faulted,
}

impl ServiceStatus {
    pub fn as_u8(self) -> u8 {
        match self {
            ServiceStatus::Stopped => 0,
            ServiceStatus::Starting => 1,
            ServiceStatus::Running => 2,
            ServiceStatus::Stopping => 3,
            ServiceStatus::Faulted => 4,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => ServiceStatus::Starting,
            2 => ServiceStatus::Running,
            3 => ServiceStatus::Stopping,
            4 => ServiceStatus::Faulted,
            _ => ServiceStatus::Stopped,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Partition Configuration
// ============================================================================

/// One priority lane on the listening side of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerPartitionConfig {
    /// Partition priority. Higher values are serviced preferentially downstream.
    pub priority: i32,
    /// Relative weighting applied by the consumer when ordering partitions
    pub priority_weighting: f64,
    /// Maximum time a pulled payload may spend in processing
    pub payload_max_processing_time_secs: u64,
    /// Lock duration requested from the fabric for pulled messages
    pub fabric_max_message_lock_secs: u64,
    /// Whether clients on this partition take part in resource rate limiting
    pub supports_rate_limiting: bool,
}

impl Default for ListenerPartitionConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            priority_weighting: 1.0,
            payload_max_processing_time_secs: 120,
            fabric_max_message_lock_secs: 270,
            supports_rate_limiting: false,
        }
    }
}

impl ListenerPartitionConfig {
    pub fn new(priority: i32) -> Self {
        Self { priority, ..Self::default() }
    }

    /// Build one default partition per priority.
    pub fn init(priorities: &[i32]) -> Vec<Self> {
        priorities.iter().map(|p| Self::new(*p)).collect()
    }

    /// High and normal priority lanes.
    pub fn default_set() -> Vec<Self> {
        Self::init(&[1, 0])
    }
}

/// One priority lane on the sending side of a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderPartitionConfig {
    pub priority: i32,
    pub fabric_max_message_lock_secs: u64,
}

impl Default for SenderPartitionConfig {
    fn default() -> Self {
        Self {
            priority: 0,
            fabric_max_message_lock_secs: 270,
        }
    }
}

impl SenderPartitionConfig {
    pub fn new(priority: i32) -> Self {
        Self { priority, ..Self::default() }
    }

    pub fn init(priorities: &[i32]) -> Vec<Self> {
        priorities.iter().map(|p| Self::new(*p)).collect()
    }

    pub fn default_set() -> Vec<Self> {
        Self::init(&[1])
    }
}

/// Named rate-limit budget shared by every client that references it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceProfile {
    pub id: String,
}

impl ResourceProfile {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Settings describing one communication agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    pub channel_id: String,
    /// Redirects inbound filter matching to a different logical channel
    pub mapping_channel_id: Option<String>,
    pub capabilities: Capabilities,
    pub listener_partitions: Vec<ListenerPartitionConfig>,
    pub sender_partitions: Vec<SenderPartitionConfig>,
    /// Priority used when a transmit asks for an unprovisioned partition
    pub sender_default_priority: Option<i32>,
    pub resource_profiles: Vec<ResourceProfile>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            channel_id: String::new(),
            mapping_channel_id: None,
            capabilities: Capabilities::Bidirectional,
            listener_partitions: ListenerPartitionConfig::default_set(),
            sender_partitions: SenderPartitionConfig::default_set(),
            sender_default_priority: None,
            resource_profiles: Vec::new(),
        }
    }
}

impl AgentSettings {
    pub fn new(channel_id: impl Into<String>, capabilities: Capabilities) -> Self {
        Self {
            channel_id: channel_id.into(),
            capabilities,
            ..Self::default()
        }
    }

    /// Channel that inbound filters are matched against.
    pub fn listening_channel_id(&self) -> &str {
        self.mapping_channel_id
            .as_deref()
            .filter(|m| !m.is_empty())
            .unwrap_or(&self.channel_id)
    }
}

/// Batch archival settings for client and resource statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSettings {
    /// Number of completed operations collected before a batch is archived
    pub batch_size: u32,
    /// Number of archived batches retained in the circular history
    pub history_length: usize,
}

impl Default for StatsSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            history_length: 20,
        }
    }
}

// ============================================================================
// Messages & Filters
// ============================================================================

/// Identifies one subscribable message shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageFilterWrapper {
    pub channel_id: String,
    pub message_type: Option<String>,
    pub action_type: Option<String>,
}

impl MessageFilterWrapper {
    pub fn new(
        channel_id: impl Into<String>,
        message_type: Option<&str>,
        action_type: Option<&str>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            message_type: message_type.map(str::to_string),
            action_type: action_type.map(str::to_string),
        }
    }

    /// Whether this filter belongs to the given channel (case-insensitive).
    pub fn is_channel(&self, channel_id: &str) -> bool {
        self.channel_id.eq_ignore_ascii_case(channel_id)
    }

    /// Whether a message falls under this filter. Missing parts act as wildcards.
    pub fn matches(&self, message: &ServiceMessage) -> bool {
        fn part(filter: &Option<String>, value: &Option<String>) -> bool {
            match (filter, value) {
                (None, _) => true,
                (Some(f), Some(v)) => f.eq_ignore_ascii_case(v),
                (Some(_), None) => false,
            }
        }

        self.is_channel(&message.channel_id)
            && part(&self.message_type, &message.message_type)
            && part(&self.action_type, &message.action_type)
    }
}

impl fmt::Display for MessageFilterWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.channel_id,
            self.message_type.as_deref().unwrap_or("*"),
            self.action_type.as_deref().unwrap_or("*"),
        )
    }
}

/// The message carried through a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMessage {
    pub id: Uuid,
    #[serde(default)]
    pub originator_key: Option<String>,
    #[serde(default)]
    pub correlation_key: Option<String>,
    pub channel_id: String,
    #[serde(default)]
    pub channel_priority: i32,
    #[serde(default)]
    pub message_type: Option<String>,
    #[serde(default)]
    pub action_type: Option<String>,
    #[serde(default)]
    pub response_channel_id: Option<String>,
    #[serde(default)]
    pub body: Option<serde_json::Value>,
    pub enqueued_at: DateTime<Utc>,
}

impl ServiceMessage {
    pub fn new(channel_id: impl Into<String>, message_type: &str, action_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            originator_key: None,
            correlation_key: None,
            channel_id: channel_id.into(),
            channel_priority: 0,
            message_type: Some(message_type.to_string()),
            action_type: Some(action_type.to_string()),
            response_channel_id: None,
            body: None,
            enqueued_at: Utc::now(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.channel_priority = priority;
        self
    }

    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// One line of a payload's processing trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub at: DateTime<Utc>,
    pub text: String,
}

/// A message in flight between the dispatch core and the task scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransmissionPayload {
    pub id: Uuid,
    pub message: ServiceMessage,
    /// Name of the client the payload was pulled from, if any
    pub source: Option<String>,
    pub trace: Vec<TraceEntry>,
}

impl TransmissionPayload {
    pub fn new(message: ServiceMessage) -> Self {
        Self {
            id: Uuid::new_v4(),
            message,
            source: None,
            trace: Vec::new(),
        }
    }

    pub fn trace_write(&mut self, text: impl Into<String>) {
        self.trace.push(TraceEntry {
            at: Utc::now(),
            text: text.into(),
        });
    }

    pub fn trace_contains(&self, needle: &str) -> bool {
        self.trace.iter().any(|t| t.text.contains(needle))
    }
}

// ============================================================================
// Collector Event Types
// ============================================================================

/// Categories for events reported to a data collector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Agent startup and settings validation
    Startup,
    /// Configuration errors
    Configuration,
    /// Listener client start/stop/validation
    Listener,
    /// Sender client start/stop
    Sender,
    /// Outbound transmission failures
    Transmission,
    /// Resource throttling signals
    Resource,
}

/// Event severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventSeverity {
    Info,
    Warn,
    Error,
    Critical,
}

/// An event recorded by a data collector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorEvent {
    pub id: String,
    pub category: EventCategory,
    pub severity: EventSeverity,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl CollectorEvent {
    pub fn new(
        category: EventCategory,
        severity: EventSeverity,
        message: String,
        source: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            category,
            severity,
            message,
            source,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(Capabilities::Listener.can_listen());
        assert!(!Capabilities::Listener.can_send());
        assert!(Capabilities::Sender.can_send());
        assert!(!Capabilities::Sender.can_listen());
        assert!(Capabilities::Bidirectional.can_listen());
        assert!(Capabilities::Bidirectional.can_send());
    }

    #[test]
    fn test_service_status_round_trip() {
        for status in [
            ServiceStatus::Stopped,
            ServiceStatus::Starting,
            ServiceStatus::Running,
            ServiceStatus::Stopping,
            ServiceStatus::Faulted,
        ] {
            assert_eq!(ServiceStatus::from_u8(status.as_u8()), status);
        }
    }

    #[test]
    fn test_partition_init() {
        let partitions = ListenerPartitionConfig::init(&[2, 1, 0]);
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].priority, 2);
        assert_eq!(SenderPartitionConfig::default_set()[0].priority, 1);
    }

    #[test]
    fn test_listening_channel_prefers_mapping() {
        let mut settings = AgentSettings::new("orders", Capabilities::Listener);
        assert_eq!(settings.listening_channel_id(), "orders");

        settings.mapping_channel_id = Some("orders-internal".to_string());
        assert_eq!(settings.listening_channel_id(), "orders-internal");

        settings.mapping_channel_id = Some(String::new());
        assert_eq!(settings.listening_channel_id(), "orders");
    }

    #[test]
    fn test_filter_matching() {
        let msg = ServiceMessage::new("Orders", "Invoice", "Create");

        assert!(MessageFilterWrapper::new("orders", Some("invoice"), Some("create")).matches(&msg));
        assert!(MessageFilterWrapper::new("ORDERS", Some("Invoice"), None).matches(&msg));
        assert!(MessageFilterWrapper::new("orders", None, None).matches(&msg));
        assert!(!MessageFilterWrapper::new("orders", Some("Invoice"), Some("Delete")).matches(&msg));
        assert!(!MessageFilterWrapper::new("billing", None, None).matches(&msg));
    }

    #[test]
    fn test_payload_trace() {
        let mut payload = TransmissionPayload::new(ServiceMessage::new("orders", "a", "b"));
        payload.trace_write("Sent: Sender|orders|0");
        assert!(payload.trace_contains("Sent:"));
        assert_eq!(payload.trace.len(), 1);
    }
}
