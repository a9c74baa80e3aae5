//! Backend factory seam
//!
//! Each concrete transport (broker queue, topic, socket) implements
//! [`ClientFactory`] and is injected into a
//! [`CommunicationAgent`](crate::CommunicationAgent). The agent owns the
//! partition bookkeeping; the factory only builds transports.

use std::sync::Arc;

use async_trait::async_trait;

use courier_common::{
    AgentSettings, ListenerPartitionConfig, MessageFilterWrapper, SenderPartitionConfig,
};
use crate::client::{ListenerClientHolder, ListenerTransport, SenderTransport};
use crate::{CommsError, Result};

#[async_trait]
pub trait ClientFactory: Send + Sync {
    /// Build a listener transport for one partition. `filters` is the agent's
    /// current filter list for the listening channel. Must not start I/O.
    async fn listener_client_create(
        &self,
        settings: &AgentSettings,
        partition: &ListenerPartitionConfig,
        filters: &[MessageFilterWrapper],
    ) -> Result<Arc<dyn ListenerTransport>>;

    /// Build a sender transport for one partition. Must not start I/O.
    async fn sender_create(
        &self,
        settings: &AgentSettings,
        partition: &SenderPartitionConfig,
    ) -> Result<Arc<dyn SenderTransport>>;

    /// Whether this backend can be driven by explicit polling
    fn listener_poll_supported(&self) -> bool {
        false
    }

    /// Whether this backend must be polled to receive anything
    fn listener_poll_required(&self) -> bool {
        false
    }

    /// Drive one poll cycle over the running listener clients
    async fn listener_poll(&self, _clients: &[Arc<ListenerClientHolder>]) -> Result<()> {
        Err(CommsError::NotImplemented("listener_poll"))
    }
}
