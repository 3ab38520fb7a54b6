//! In-memory session store guarding sessions and the waiting pool.

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::pool::WaitingPool;
use crate::session::{Session, SessionState};
use crate::types::ParticipantId;

/// Everything the store lock protects.
///
/// Only the engine in this crate gets `&mut Registry`, through
/// [`SessionStore::transaction`].
#[derive(Debug, Default)]
pub(crate) struct Registry {
    sessions: HashMap<ParticipantId, Session>,
    pub(crate) pool: WaitingPool,
}

impl Registry {
    pub(crate) fn get_or_create(&mut self, id: ParticipantId) -> &mut Session {
        self.sessions.entry(id).or_insert_with(|| {
            tracing::debug!(participant = %id, "Session created");
            Session::new(id)
        })
    }

    pub(crate) fn get(&self, id: ParticipantId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ParticipantId) -> Option<&mut Session> {
        self.sessions.get_mut(&id)
    }

    fn snapshot(&self) -> StoreSnapshot {
        let mut sessions: Vec<Session> = self.sessions.values().cloned().collect();
        sessions.sort_by_key(|s| s.id);

        let count = |state: SessionState| sessions.iter().filter(|s| s.state == state).count();
        let (idle, waiting, connected) = (
            count(SessionState::Idle),
            count(SessionState::Waiting),
            count(SessionState::Connected),
        );
        StoreSnapshot {
            idle,
            waiting,
            connected,
            pool: self.pool.iter().collect(),
            sessions,
        }
    }
}

/// Point-in-time copy of the store, taken under the lock.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot {
    pub idle: usize,
    pub waiting: usize,
    pub connected: usize,
    /// Waiting pool, oldest first.
    pub pool: Vec<ParticipantId>,
    #[serde(skip)]
    pub sessions: Vec<Session>,
}

impl StoreSnapshot {
    /// `sessions` is sorted by id, so this is a binary search.
    pub fn session(&self, id: ParticipantId) -> Option<&Session> {
        self.sessions
            .binary_search_by_key(&id, |s| s.id)
            .ok()
            .map(|i| &self.sessions[i])
    }

    /// Describe every broken pairing or pool invariant. Empty when consistent.
    pub fn violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen = std::collections::HashSet::new();
        for id in &self.pool {
            if !seen.insert(*id) {
                problems.push(format!("{id} queued more than once"));
            }
            match self.session(*id) {
                Some(s) if s.is_waiting() => {}
                Some(s) => problems.push(format!("{id} queued while {:?}", s.state)),
                None => problems.push(format!("{id} queued without a session")),
            }
        }

        for session in &self.sessions {
            match (session.state, session.partner) {
                (SessionState::Waiting, _) if !seen.contains(&session.id) => {
                    problems.push(format!("{} waiting but not queued", session.id));
                }
                (SessionState::Connected, None) => {
                    problems.push(format!("{} connected without a partner", session.id));
                }
                (SessionState::Connected, Some(partner)) if partner == session.id => {
                    problems.push(format!("{} paired with itself", session.id));
                }
                (SessionState::Connected, Some(partner)) => {
                    let mirrored = self
                        .session(partner)
                        .is_some_and(|p| p.is_connected() && p.partner == Some(session.id));
                    if !mirrored {
                        problems.push(format!("{} -> {partner} is not symmetric", session.id));
                    }
                }
                (SessionState::Idle | SessionState::Waiting, Some(partner)) => {
                    problems.push(format!(
                        "{} keeps partner {partner} while {:?}",
                        session.id, session.state
                    ));
                }
                _ => {}
            }
        }

        problems
    }
}

/// Concurrency-safe registry of participant sessions and the waiting pool.
///
/// A single store-wide lock serializes every read and write, so pairing two
/// sessions and touching the pool happen as one atomic step.
#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<Registry>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the session for `id`, creating an idle one if needed.
    pub async fn get_or_create(&self, id: ParticipantId) -> Session {
        self.inner.lock().await.get_or_create(id).clone()
    }

    pub async fn get(&self, id: ParticipantId) -> Option<Session> {
        self.inner.lock().await.get(id).cloned()
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.inner.lock().await.snapshot()
    }

    /// Number of participants in the waiting pool.
    pub async fn waiting_len(&self) -> usize {
        self.inner.lock().await.pool.len()
    }

    /// Run `f` with exclusive access to sessions and pool.
    ///
    /// `f` is synchronous, so the lock can never be held across an await.
    pub(crate) async fn transaction<R>(&self, f: impl FnOnce(&mut Registry) -> R) -> R {
        let mut registry = self.inner.lock().await;
        f(&mut registry)
    }
}
