//! Communication dispatch core
//!
//! A [`CommunicationAgent`] manages the listener and sender clients of one
//! logical channel, one client per priority partition. Concrete transports
//! plug in through [`ClientFactory`]; [`ResourceTracker`] turns live retry
//! pressure into an admission factor for upstream producers.

pub mod agent;
pub mod client;
pub mod collector;
pub mod comms_metrics;
pub mod error;
pub mod factory;
pub mod manual;
pub mod statistics;

pub use agent::{AgentStatistics, CommunicationAgent, Listener, Sender, Service};
pub use client::{
    client_name, ClientHolder, ClientStatistics, ListenerClientHolder, ListenerTransport,
    SenderClientHolder, SenderTransport,
};
pub use collector::{DataCollector, EventCollector};
pub use error::{CommsError, StartupStage};
pub use factory::ClientFactory;
pub use manual::{ManualClientFactory, ManualFabric};
pub use statistics::{
    ResourceRequestResult, ResourceRetryReason, ResourceStatistics, ResourceTracker,
    StatsContainer,
};

pub type Result<T> = std::result::Result<T, CommsError>;
