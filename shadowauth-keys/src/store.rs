//! The key store seam.

use crate::error::KeyStoreError;
use crate::key::IssuedKey;
use std::collections::HashMap;
use std::sync::RwLock;

/// Storage seam for issued keys. The durable store shared with the
/// subscription subsystem sits behind this trait; `MemoryKeyStore` ships
/// in-repo.
pub trait KeyStore: Send + Sync {
    /// Inserts a key, failing `Duplicate` if the value already exists.
    /// The duplicate check is the issuer's uniqueness guarantee, so it must
    /// be atomic with the insert.
    fn insert_new(&self, key: IssuedKey) -> Result<(), KeyStoreError>;

    /// Fetches a key by value.
    fn get(&self, value: &str) -> Result<Option<IssuedKey>, KeyStoreError>;

    /// Returns the number of stored keys.
    fn len(&self) -> Result<usize, KeyStoreError>;
}

/// In-memory key store backed by a `RwLock<HashMap>`.
#[derive(Debug, Default)]
pub struct MemoryKeyStore {
    keys: RwLock<HashMap<String, IssuedKey>>,
}

impl MemoryKeyStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn insert_new(&self, key: IssuedKey) -> Result<(), KeyStoreError> {
        let mut keys = self.keys.write().unwrap();
        if keys.contains_key(&key.value) {
            return Err(KeyStoreError::Duplicate);
        }
        keys.insert(key.value.clone(), key);
        Ok(())
    }

    fn get(&self, value: &str) -> Result<Option<IssuedKey>, KeyStoreError> {
        Ok(self.keys.read().unwrap().get(value).cloned())
    }

    fn len(&self) -> Result<usize, KeyStoreError> {
        Ok(self.keys.read().unwrap().len())
    }
}
