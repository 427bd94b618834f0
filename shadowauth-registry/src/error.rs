//! Error types for the checkpoint registry.

use thiserror::Error;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors that can occur while loading or validating checkpoint configuration.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A script entry carries an empty or whitespace-only ID.
    #[error("script id must be non-empty")]
    EmptyScriptId,

    /// The same script ID appears twice in one document.
    #[error("duplicate script id: {0}")]
    DuplicateScript(String),

    /// Checkpoint orders are not unique and contiguous starting at 1.
    #[error("script '{script_id}': checkpoint orders must be contiguous from 1 (expected {expected}, found {found})")]
    InvalidSequence {
        script_id: String,
        expected: u32,
        found: u32,
    },

    /// A checkpoint has an empty URL template.
    #[error("script '{script_id}': checkpoint {order} has an empty url template")]
    EmptyTemplate { script_id: String, order: u32 },

    /// Configuration file could not be read.
    #[error("failed to read registry file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration document is not valid JSON.
    #[error("invalid registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}
