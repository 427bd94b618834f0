//! The session store seam.

use crate::error::StoreError;
use crate::session::Session;
use shadowauth_types::SessionToken;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Outcome of a compare-and-swap commit.
#[derive(Debug, Clone)]
pub enum CasOutcome {
    /// The update was committed.
    Committed,
    /// The stored row's `current_step` no longer matches; carries the live row.
    Conflict(Arc<Session>),
    /// No row exists for the token.
    Missing,
}

/// Storage seam for session rows. The durable keyed store is an external
/// collaborator behind this trait; `MemorySessionStore` ships in-repo.
///
/// `compare_and_swap` is the commit primitive upholding the monotonic-step
/// invariant: an update commits only if the stored row's `current_step`
/// still equals `expected_step`.
pub trait SessionStore: Send + Sync {
    /// Loads the latest committed row for a token.
    fn load(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError>;

    /// Inserts a fresh row, failing `Duplicate` if the token exists.
    fn insert(&self, session: Session) -> Result<(), StoreError>;

    /// Commits `updated` iff the stored row's `current_step` equals
    /// `expected_step`, returning the live row on conflict.
    fn compare_and_swap(
        &self,
        token: &SessionToken,
        expected_step: u32,
        updated: Session,
    ) -> Result<CasOutcome, StoreError>;

    /// Removes a row, returning it if present.
    fn remove(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError>;
}

/// In-memory session store.
///
/// Reads clone an `Arc` under a briefly held read lock, so `get_status`
/// polling never blocks writers for the duration of a mutation.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionToken, Arc<Session>>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of live session rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Returns true if no session rows exist.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().unwrap().is_empty()
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError> {
        Ok(self.sessions.read().unwrap().get(token).cloned())
    }

    fn insert(&self, session: Session) -> Result<(), StoreError> {
        let mut sessions = self.sessions.write().unwrap();
        if sessions.contains_key(&session.token) {
            return Err(StoreError::Duplicate(session.token));
        }
        sessions.insert(session.token, Arc::new(session));
        Ok(())
    }

    fn compare_and_swap(
        &self,
        token: &SessionToken,
        expected_step: u32,
        updated: Session,
    ) -> Result<CasOutcome, StoreError> {
        let mut sessions = self.sessions.write().unwrap();
        let Some(live) = sessions.get(token) else {
            return Ok(CasOutcome::Missing);
        };
        if live.current_step != expected_step {
            return Ok(CasOutcome::Conflict(live.clone()));
        }
        sessions.insert(*token, Arc::new(updated));
        Ok(CasOutcome::Committed)
    }

    fn remove(&self, token: &SessionToken) -> Result<Option<Arc<Session>>, StoreError> {
        Ok(self.sessions.write().unwrap().remove(token))
    }
}
