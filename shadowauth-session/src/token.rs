//! Anti-bypass tokens: short-lived, single-use proof that a user actually
//! reached the checkpoint provider.
//!
//! This token is the sole integrity control preventing a user from claiming
//! a checkpoint without visiting the provider, so unguessability and
//! single-use enforcement are load-bearing security properties.

use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, Rng};
use shadowauth_types::SessionToken;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;

/// Random alphanumeric characters in a token value (~190 bits).
const TOKEN_LEN: usize = 32;

/// Default token TTL.
const DEFAULT_TTL_MINS: i64 = 10;

/// Reasons a token fails to verify. All of them surface to the client as
/// a verification failure that requires re-requesting the checkpoint URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    /// No token was ever minted for this (session, step).
    #[error("no checkpoint token was issued for this step")]
    NotIssued,

    /// The supplied value does not match the latest minted token.
    #[error("checkpoint token does not match")]
    Mismatch,

    /// The token was already consumed.
    #[error("checkpoint token already consumed")]
    Consumed,

    /// The token is past its TTL.
    #[error("checkpoint token expired")]
    Expired,
}

/// A single-use bearer token bound to one (session, step) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AntiBypassToken {
    pub value: String,
    pub session_token: SessionToken,
    pub step: u32,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub consumed: bool,
}

/// In-memory anti-bypass token service.
///
/// Minting a token for a (session, step) pair replaces any prior token for
/// that pair, so a re-requested checkpoint URL invalidates the old link.
/// Exactly-once consumption is enforced under the write lock. There is no
/// background sweep; `mint` and `consume` prune entries past their TTL, and
/// `revoke_session` drops a session's entries wholesale.
pub struct AntiBypassTokens {
    tokens: RwLock<HashMap<(SessionToken, u32), AntiBypassToken>>,
    ttl: Duration,
}

impl AntiBypassTokens {
    /// Creates a token service with the default 10 minute TTL.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(DEFAULT_TTL_MINS))
    }

    /// Creates a token service with a custom TTL (for testing).
    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            tokens: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Mints a fresh token bound to (session, step), replacing any prior
    /// token for that pair.
    pub fn mint(&self, session: &SessionToken, step: u32, now: DateTime<Utc>) -> AntiBypassToken {
        let token = AntiBypassToken {
            value: generate_token_value(),
            session_token: *session,
            step,
            issued_at: now,
            expires_at: now + self.ttl,
            consumed: false,
        };
        let mut tokens = self.tokens.write().unwrap();
        tokens.retain(|_, t| now < t.expires_at);
        tokens.insert((*session, step), token.clone());
        token
    }

    /// Consumes a token, succeeding exactly once.
    ///
    /// # Errors
    ///
    /// - `NotIssued` if nothing was minted for the (session, step) pair
    /// - `Mismatch` if the value differs from the latest minted token
    /// - `Consumed` on re-use
    /// - `Expired` past the TTL
    pub fn consume(
        &self,
        value: &str,
        session: &SessionToken,
        step: u32,
        now: DateTime<Utc>,
    ) -> Result<(), TokenError> {
        let mut tokens = self.tokens.write().unwrap();
        // Prune expired entries opportunistically. The requested pair is
        // kept so an expired token reports `Expired`, not `NotIssued`.
        tokens.retain(|key, t| *key == (*session, step) || now < t.expires_at);
        let token = tokens
            .get_mut(&(*session, step))
            .ok_or(TokenError::NotIssued)?;
        if token.value != value {
            return Err(TokenError::Mismatch);
        }
        if token.consumed {
            return Err(TokenError::Consumed);
        }
        if now >= token.expires_at {
            return Err(TokenError::Expired);
        }
        token.consumed = true;
        Ok(())
    }

    /// Drops all outstanding tokens for a session. Used by session reset.
    pub fn revoke_session(&self, session: &SessionToken) {
        self.tokens
            .write()
            .unwrap()
            .retain(|(owner, _), _| owner != session);
    }

    /// Returns the number of tracked tokens, consumed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.read().unwrap().len()
    }

    /// Returns true if no tokens are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.read().unwrap().is_empty()
    }
}

impl Default for AntiBypassTokens {
    fn default() -> Self {
        Self::new()
    }
}

fn generate_token_value() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}
