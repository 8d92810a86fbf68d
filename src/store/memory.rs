//! In-memory store.

use std::collections::HashMap;
use std::sync::RwLock;

use zeroize::Zeroize;

use super::SecureKeyStore;
use crate::errors::{Result, VaultError};

/// A process-local store backed by a `RwLock<HashMap>`.
///
/// Nothing survives the process.  Blobs are zeroized when replaced or
/// deleted.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|map| map.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> VaultError {
    VaultError::StoreError("memory store lock poisoned".into())
}

impl SecureKeyStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let map = self.entries.read().map_err(poisoned)?;
        map.get(name)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(name.to_string()))
    }

    fn set(&self, name: &str, blob: &[u8]) -> Result<()> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| VaultError::WriteFailed("memory store lock poisoned".into()))?;
        if let Some(mut old) = map.insert(name.to_string(), blob.to_vec()) {
            old.zeroize();
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let mut map = self.entries.write().map_err(poisoned)?;
        match map.remove(name) {
            Some(mut old) => {
                old.zeroize();
                Ok(())
            }
            None => Err(VaultError::NotFound(name.to_string())),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.entries
            .read()
            .map(|map| map.contains_key(name))
            .unwrap_or(false)
    }

    fn names(&self) -> Result<Vec<String>> {
        let map = self.entries.read().map_err(poisoned)?;
        let mut names: Vec<String> = map.keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
