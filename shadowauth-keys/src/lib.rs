//! License key minting for ShadowAuth.
//!
//! Keys minted here land in the same store shape used by subscription and
//! promo-code keys issued elsewhere, so the downstream validation/HWID
//! subsystem handles checkpoint-earned keys with no special casing. This
//! crate owns:
//!
//! - the `IssuedKey` row and its expiry/ban status evaluation
//! - the `KeyStore` seam to the shared durable key store (an in-memory
//!   implementation ships for tests and single-node deployments)
//! - the `KeyIssuer`, which generates globally unique key values with
//!   check-and-retry against the store

mod error;
mod issuer;
mod key;
mod store;

pub use error::{KeyError, KeyResult, KeyStoreError};
pub use issuer::{KeyIssuer, KEY_PREFIX};
pub use key::{IssuedKey, KeyDuration, KeyStatus};
pub use store::{KeyStore, MemoryKeyStore};
