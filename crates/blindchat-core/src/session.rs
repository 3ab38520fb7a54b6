//! Session model: per-participant pairing state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::ParticipantId;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Waiting,
    Connected,
}

/// Pairing state of one participant.
///
/// `partner` is `Some` exactly when `state` is [`SessionState::Connected`].
/// The fields are only mutated by the engine while the store lock is held;
/// callers outside the crate only ever see cloned snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: ParticipantId,
    pub state: SessionState,
    pub partner: Option<ParticipantId>,
    /// Time of the last state change.
    pub since: DateTime<Utc>,
}

impl Session {
    pub fn new(id: ParticipantId) -> Self {
        Self {
            id,
            state: SessionState::Idle,
            partner: None,
            since: Utc::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn is_waiting(&self) -> bool {
        self.state == SessionState::Waiting
    }

    pub(crate) fn connect_to(&mut self, partner: ParticipantId) {
        self.state = SessionState::Connected;
        self.partner = Some(partner);
        self.since = Utc::now();
    }

    pub(crate) fn wait(&mut self) {
        self.state = SessionState::Waiting;
        self.partner = None;
        self.since = Utc::now();
    }

    pub(crate) fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.partner = None;
        self.since = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_is_idle() {
        let session = Session::new(ParticipantId(7));
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.partner.is_none());
    }

    #[test]
    fn test_transitions_keep_partner_consistent() {
        let mut session = Session::new(ParticipantId(1));
        session.wait();
        assert!(session.is_waiting());
        assert!(session.partner.is_none());

        session.connect_to(ParticipantId(2));
        assert!(session.is_connected());
        assert_eq!(session.partner, Some(ParticipantId(2)));

        session.reset();
        assert_eq!(session.state, SessionState::Idle);
        assert!(session.partner.is_none());
    }
}
