//! The session row and its read-only snapshot.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use shadowauth_types::{ScriptId, SessionToken};
use std::collections::BTreeMap;

/// Per-step issuance and completion record.
///
/// A step's proof is created when its checkpoint URL is issued; completion
/// stamps it. Its existence is the weak server-visible evidence required
/// even for steps without an anti-bypass token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepProof {
    /// Anti-bypass token value minted for the step, when flagged.
    pub issued_token: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One user's progress through a script's checkpoint sequence.
///
/// Invariants: `current_step` is in `[0, total_steps]` and never decreases
/// within a session; `completed` implies `current_step == total_steps` and
/// a set `generated_key`. Mutated only by the session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: SessionToken,
    pub script_id: ScriptId,
    pub total_steps: u32,
    pub current_step: u32,
    /// Step number → issuance/completion record.
    pub proofs: BTreeMap<u32, StepProof>,
    pub generated_key: Option<String>,
    pub key_expires_at: Option<DateTime<Utc>>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// Advanced by mutating operations only; `get_status` never refreshes it.
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    /// Creates a fresh session at step 0 with a new token.
    #[must_use]
    pub fn new(script_id: ScriptId, total_steps: u32, now: DateTime<Utc>) -> Self {
        Self {
            token: SessionToken::new(),
            script_id,
            total_steps,
            current_step: 0,
            proofs: BTreeMap::new(),
            generated_key: None,
            key_expires_at: None,
            completed: false,
            created_at: now,
            last_activity_at: now,
        }
    }

    /// Returns true if the inactivity TTL has elapsed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now.signed_duration_since(self.last_activity_at) > ttl
    }

    /// Returns the read-only snapshot served to polling clients.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            current_step: self.current_step,
            completed: self.completed,
            generated_key: self.generated_key.clone(),
            key_expires_at: self.key_expires_at,
        }
    }
}

/// The polling contract: what a client sees of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub current_step: u32,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_expires_at: Option<DateTime<Utc>>,
}
