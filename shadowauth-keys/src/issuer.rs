//! Key minting with check-and-retry uniqueness.

use crate::error::{KeyError, KeyResult, KeyStoreError};
use crate::key::{IssuedKey, KeyDuration};
use crate::store::KeyStore;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use shadowauth_types::ScriptId;
use std::sync::Arc;

/// Prefix carried by every minted key value.
pub const KEY_PREFIX: &str = "shadowauth_";

/// Random alphanumeric characters after the prefix (~143 bits).
const KEY_SUFFIX_LEN: usize = 24;

/// Collisions are negligible at this namespace size; the retry bound exists
/// so a misbehaving store cannot spin the issuer forever.
const MAX_MINT_ATTEMPTS: u32 = 8;

/// Mints globally unique key values and persists them into the shared store.
///
/// Effectively-once per session is the session manager's job (it guards on
/// the session's `generated_key`); the issuer only guarantees uniqueness.
pub struct KeyIssuer {
    store: Arc<dyn KeyStore>,
}

impl KeyIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self { store }
    }

    /// Returns the backing store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn KeyStore> {
        &self.store
    }

    /// Mints a key for a script, persisting it before returning.
    ///
    /// The store's `insert_new` duplicate check is the uniqueness guarantee:
    /// a colliding candidate is discarded and a fresh one generated.
    ///
    /// # Errors
    ///
    /// Returns `KeyError::Exhausted` if every candidate collided, or a store
    /// error if the backend failed.
    pub fn issue(
        &self,
        script_id: &ScriptId,
        duration: KeyDuration,
        now: DateTime<Utc>,
    ) -> KeyResult<IssuedKey> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let key = IssuedKey {
                value: generate_key_value(),
                script_id: script_id.clone(),
                duration,
                issued_at: now,
                expires_at: duration.duration().map(|d| now + d),
                hwid: None,
                banned: false,
            };
            match self.store.insert_new(key.clone()) {
                Ok(()) => return Ok(key),
                Err(KeyStoreError::Duplicate) => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(KeyError::Exhausted {
            attempts: MAX_MINT_ATTEMPTS,
        })
    }
}

/// Generates a `shadowauth_`-prefixed random key value.
fn generate_key_value() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{KEY_PREFIX}{suffix}")
}
