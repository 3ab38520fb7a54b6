//! Outbound delivery capability supplied by a transport.

use async_trait::async_trait;

use crate::types::{Outbound, ParticipantId};

/// Deliver a notice or relayed content to one participant.
///
/// Fire-and-forget from the engine's point of view: failures are reported
/// back to the caller of the triggering operation and never retried.
#[async_trait]
pub trait Deliver: Send + Sync + 'static {
    async fn deliver(&self, to: ParticipantId, message: Outbound) -> anyhow::Result<()>;
}

#[cfg(any(test, feature = "test-support"))]
mod memory;
#[cfg(any(test, feature = "test-support"))]
pub use memory::MemoryDeliverer;
