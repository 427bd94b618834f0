//! Checkpoint session state machine for ShadowAuth.
//!
//! A session tracks one user's progress through a script's ordered
//! checkpoint sequence and mints exactly one license key when the sequence
//! completes. The design tolerates the unreliability of third-party
//! completion signals: every operation is safe under retry, duplicates of
//! an applied step are success, and step advancement is guarded both by
//! single-use anti-bypass tokens and a compare-and-swap on the session row.
//!
//! # Components
//!
//! - **Session / SessionSnapshot**: the durable row and the read-only
//!   polling contract
//! - **SessionStore**: the seam to the durable keyed store, with a
//!   `compare_and_swap` commit primitive
//! - **AntiBypassTokens**: short-lived single-use tokens proving a user
//!   actually reached the checkpoint provider
//! - **SessionManager**: the state machine exposing start, checkpoint_url,
//!   complete_step, status and reset
//!
//! # State machine
//!
//! States are the integers `0..=total_steps` plus the terminal completed
//! flag, reachable only at `total_steps`. Every successful `complete_step`
//! advances the state by exactly 1; there is no rollback — only
//! `reset_session` supersedes a session, and only a fresh `start` mints a
//! usable replacement.

mod error;
mod manager;
mod session;
mod store;
mod token;

pub use error::{GateError, GateResult, StoreError};
pub use manager::{CheckpointInfo, SessionConfig, SessionManager, StartedSession};
pub use session::{Session, SessionSnapshot, StepProof};
pub use store::{CasOutcome, MemorySessionStore, SessionStore};
pub use token::{AntiBypassToken, AntiBypassTokens, TokenError};
