//! Pairing engine: the idle → waiting → connected state machine.
//!
//! Every transition runs as one [`SessionStore::transaction`], which collects
//! the notices to send. Delivery happens only after the lock is released, and
//! a failed delivery never rolls the transition back.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::deliver::Deliver;
use crate::error::PairingError;
use crate::notice::Notice;
use crate::session::SessionState;
use crate::store::{Registry, SessionStore, StoreSnapshot};
use crate::types::{Outbound, ParticipantId, Payload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectOutcome {
    AlreadyConnected,
    Paired { partner: ParticipantId },
    Waiting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    NothingToStop,
    /// `partner` is `None` when the partner's session had already vanished.
    Ended { partner: Option<ParticipantId> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextOutcome {
    /// The partner that was left behind, if there was one.
    pub left: Option<ParticipantId>,
    pub connect: ConnectOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    NotWaiting,
    Cancelled,
}

type Outbox = Vec<(ParticipantId, Notice)>;

pub struct PairingEngine {
    store: SessionStore,
    deliverer: Arc<dyn Deliver>,
}

impl PairingEngine {
    pub fn new(deliverer: Arc<dyn Deliver>) -> Self {
        Self {
            store: SessionStore::new(),
            deliverer,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.store.snapshot().await
    }

    /// Pair `id` with the longest-waiting participant, or queue it.
    pub async fn connect(&self, id: ParticipantId) -> Result<ConnectOutcome, PairingError> {
        let (outcome, outbox) = self
            .store
            .transaction(|reg| {
                let mut outbox = Outbox::new();
                let outcome = connect_locked(reg, id, &mut outbox);
                (outcome, outbox)
            })
            .await;

        self.flush(outbox).await?;
        Ok(outcome)
    }

    /// End the chat `id` is in and tell both sides.
    pub async fn stop(&self, id: ParticipantId) -> Result<StopOutcome, PairingError> {
        let (outcome, outbox) = self
            .store
            .transaction(|reg| {
                let mut outbox = Outbox::new();
                let outcome = stop_locked(reg, id, &mut outbox);
                (outcome, outbox)
            })
            .await;

        self.flush(outbox).await?;
        Ok(outcome)
    }

    /// Leave the current chat (if any) and look for a new partner, atomically.
    pub async fn next(&self, id: ParticipantId) -> Result<NextOutcome, PairingError> {
        let (outcome, outbox) = self
            .store
            .transaction(|reg| {
                let mut outbox = Outbox::new();
                let connected = reg.get(id).is_some_and(|s| s.is_connected());
                let left = if connected {
                    match stop_locked(reg, id, &mut outbox) {
                        StopOutcome::Ended { partner } => partner,
                        StopOutcome::NothingToStop => None,
                    }
                } else {
                    None
                };
                let connect = connect_locked(reg, id, &mut outbox);
                (NextOutcome { left, connect }, outbox)
            })
            .await;

        self.flush(outbox).await?;
        Ok(outcome)
    }

    /// Withdraw `id` from the waiting pool.
    pub async fn cancel(&self, id: ParticipantId) -> Result<CancelOutcome, PairingError> {
        let (outcome, outbox) = self
            .store
            .transaction(|reg| {
                let waiting = reg.get(id).is_some_and(|s| s.is_waiting());
                if !waiting {
                    return (CancelOutcome::NotWaiting, vec![(id, Notice::NotWaiting)]);
                }
                reg.pool.remove(id);
                if let Some(session) = reg.get_mut(id) {
                    session.reset();
                }
                info!(participant = %id, "Search cancelled");
                (CancelOutcome::Cancelled, vec![(id, Notice::SearchCancelled)])
            })
            .await;

        self.flush(outbox).await?;
        Ok(outcome)
    }

    /// Current state of `id`. Unknown participants are idle.
    pub async fn status(&self, id: ParticipantId) -> SessionState {
        self.store
            .get(id)
            .await
            .map(|session| session.state)
            .unwrap_or_default()
    }

    /// Forward `payload` unchanged to the partner of `id`.
    pub async fn relay(&self, id: ParticipantId, payload: Payload) -> Result<(), PairingError> {
        let target = self
            .store
            .transaction(|reg| {
                let partner = match reg.get(id) {
                    Some(session) if session.is_connected() => session.partner,
                    _ => return Err(PairingError::NotConnected(id)),
                };
                let Some(partner) = partner else {
                    return Err(PairingError::NotConnected(id));
                };

                let reachable = reg
                    .get(partner)
                    .is_some_and(|p| p.is_connected() && p.partner == Some(id));
                if !reachable {
                    warn!(participant = %id, %partner, "Partner session missing, resetting requester");
                    if let Some(session) = reg.get_mut(id) {
                        session.reset();
                    }
                    return Err(PairingError::PartnerUnavailable(id));
                }
                Ok(partner)
            })
            .await?;

        debug!(from = %id, to = %target, kind = payload.kind_label(), "Relaying message");
        self.deliverer
            .deliver(target, Outbound::Content(payload))
            .await
            .map_err(|source| PairingError::DeliveryFailed {
                participant: target,
                source,
            })
    }

    /// Send every queued notice; report the first failure.
    async fn flush(&self, outbox: Outbox) -> Result<(), PairingError> {
        let mut first_error = None;
        for (to, notice) in outbox {
            if let Err(source) = self.deliverer.deliver(to, Outbound::Notice(notice)).await {
                warn!(participant = %to, ?notice, %source, "Notice delivery failed");
                first_error.get_or_insert(PairingError::DeliveryFailed {
                    participant: to,
                    source,
                });
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn connect_locked(reg: &mut Registry, id: ParticipantId, outbox: &mut Outbox) -> ConnectOutcome {
    if reg.get_or_create(id).is_connected() {
        outbox.push((id, Notice::AlreadyConnected));
        return ConnectOutcome::AlreadyConnected;
    }

    // A participant that is already waiting rejoins at the tail.
    reg.pool.remove(id);

    if let Ok(candidate) = reg.pool.dequeue() {
        match reg.get_mut(candidate) {
            Some(partner) => {
                partner.connect_to(id);
                reg.get_or_create(id).connect_to(candidate);
                info!(participant = %id, partner = %candidate, "Participants paired");
                outbox.push((id, Notice::Connected));
                outbox.push((candidate, Notice::Connected));
                return ConnectOutcome::Paired { partner: candidate };
            }
            None => warn!(candidate = %candidate, "Queued participant has no session"),
        }
    }

    reg.get_or_create(id).wait();
    if let Err(e) = reg.pool.enqueue(id) {
        warn!(participant = %id, %e, "Enqueue rejected");
    }
    debug!(participant = %id, waiting = reg.pool.len(), "Participant waiting");
    outbox.push((id, Notice::Waiting));
    ConnectOutcome::Waiting
}

fn stop_locked(reg: &mut Registry, id: ParticipantId, outbox: &mut Outbox) -> StopOutcome {
    let partner = match reg.get(id) {
        Some(session) if session.is_connected() => session.partner,
        _ => {
            outbox.push((id, Notice::NothingToStop));
            return StopOutcome::NothingToStop;
        }
    };

    let mut left = None;
    if let Some(pid) = partner {
        match reg.get_mut(pid) {
            Some(other) if other.partner == Some(id) => {
                other.reset();
                outbox.push((pid, Notice::PartnerLeft));
                left = Some(pid);
            }
            Some(_) => warn!(participant = %id, partner = %pid, "Partner is paired elsewhere"),
            None => warn!(participant = %id, partner = %pid, "Partner session missing"),
        }
    }

    if let Some(session) = reg.get_mut(id) {
        session.reset();
    }
    info!(participant = %id, partner = ?left, "Chat ended");
    outbox.push((id, Notice::ChatEnded));
    StopOutcome::Ended { partner: left }
}
