//! Core identifier types for ShadowAuth.
//!
//! This crate defines the opaque identifiers shared by every layer of the
//! key-issuance service:
//! - Script identifiers (operator-chosen, validated strings)
//! - Session tokens (UUID v4 bearer secrets)
//!
//! Domain types (checkpoint specs, sessions, issued keys) belong to their
//! respective crates, not here.

mod ids;

pub use ids::{ScriptId, SessionToken};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in identifier operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("script id must be non-empty")]
    EmptyScriptId,

    #[error("invalid session token: {0}")]
    InvalidSessionToken(#[from] uuid::Error),
}
