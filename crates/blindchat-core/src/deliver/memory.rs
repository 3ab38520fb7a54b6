use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;

use super::Deliver;
use crate::types::{Outbound, ParticipantId};

/// In-memory deliverer that records every message. Compiled for tests and
/// behind the `test-support` feature.
#[derive(Debug, Default)]
pub struct MemoryDeliverer {
    sent: Mutex<Vec<(ParticipantId, Outbound)>>,
    unreachable: Mutex<HashSet<ParticipantId>>,
}

impl MemoryDeliverer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery to `id` fail.
    pub fn set_unreachable(&self, id: ParticipantId) {
        self.unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id);
    }

    /// Everything delivered so far, in order.
    pub fn sent(&self) -> Vec<(ParticipantId, Outbound)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Messages delivered to `id`, in order.
    pub fn sent_to(&self, id: ParticipantId) -> Vec<Outbound> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| *to == id)
            .map(|(_, message)| message)
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl Deliver for MemoryDeliverer {
    async fn deliver(&self, to: ParticipantId, message: Outbound) -> anyhow::Result<()> {
        let unreachable = self
            .unreachable
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&to);
        if unreachable {
            anyhow::bail!("participant {to} is unreachable");
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((to, message));
        Ok(())
    }
}
