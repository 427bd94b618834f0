//! Error types for the session layer.

use crate::token::TokenError;
use shadowauth_types::SessionToken;
use thiserror::Error;

/// Result type for session manager operations.
pub type GateResult<T> = Result<T, GateError>;

/// Errors from the session store seam.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A session row with this token already exists.
    #[error("session already exists: {0}")]
    Duplicate(SessionToken),

    /// The backing store failed.
    #[error("session store failure: {0}")]
    Backend(String),
}

/// The error taxonomy of the checkpoint gate.
///
/// `NotFound` and `SessionExpired` are terminal for the client (a fresh
/// `start` is required); `InvalidStep`/`OutOfOrder` are recoverable by
/// resyncing via `get_status`; `VerificationFailed` is recoverable by
/// re-requesting the checkpoint URL.
#[derive(Debug, Error)]
pub enum GateError {
    /// Unknown script or session.
    #[error("not found")]
    NotFound,

    /// Checkpoint URL requested for a step other than the next one.
    #[error("invalid step: expected {expected}, requested {requested}")]
    InvalidStep { expected: u32, requested: u32 },

    /// Completion signaled for a step ahead of the next one.
    #[error("step out of order: expected {expected}, requested {requested}")]
    OutOfOrder { expected: u32, requested: u32 },

    /// Anti-bypass verification failed; the client must re-request the
    /// checkpoint URL.
    #[error("checkpoint verification failed: {0}")]
    VerificationFailed(#[from] TokenError),

    /// The session is gone or past its inactivity TTL.
    #[error("session expired")]
    SessionExpired,

    /// Store or issuer failure; retry with backoff.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for GateError {
    fn from(e: StoreError) -> Self {
        Self::Internal(e.to_string())
    }
}
