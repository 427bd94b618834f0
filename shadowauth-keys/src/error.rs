//! Error types for key minting and storage.

use thiserror::Error;

/// Result type for key operations.
pub type KeyResult<T> = Result<T, KeyError>;

/// Errors from the key store seam.
#[derive(Debug, Error)]
pub enum KeyStoreError {
    /// The key value already exists in the store.
    #[error("key value already exists")]
    Duplicate,

    /// The backing store failed.
    #[error("key store failure: {0}")]
    Backend(String),
}

/// Errors that can occur while minting a key.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Every generated candidate collided with an existing key.
    #[error("could not mint a unique key after {attempts} attempts")]
    Exhausted { attempts: u32 },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] KeyStoreError),
}
