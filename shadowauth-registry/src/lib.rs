//! Script and checkpoint configuration for ShadowAuth.
//!
//! A script's access gate is an ordered, linear sequence of checkpoints:
//! externally hosted ad-verification steps a user must walk before a key is
//! minted. This crate owns that configuration:
//!
//! - **Registry**: per-script checkpoint lists, loaded from a JSON document
//!   and validated on construction (orders unique and contiguous from 1)
//! - **Provider adapters**: per-provider redirect-URL composition, since
//!   different ad-link providers take the callback destination in different
//!   parameter shapes
//!
//! The registry is read-only at runtime; the session manager only ever looks
//! up scripts and checkpoints by ID.

mod error;
mod provider;
mod registry;

pub use error::{RegistryError, RegistryResult};
pub use provider::{
    EncodedRedirectAdapter, PlaceholderAdapter, ProviderAdapter, ProviderAdapters, RedirectContext,
};
pub use registry::{CheckpointSpec, Registry, ScriptEntry};
