//! OS keyring backend.
//!
//! Stores each entry in the operating system's secure credential store:
//! - macOS: Keychain
//! - Windows: Credential Manager
//! - Linux: Secret Service (GNOME Keyring / KDE Wallet)
//!
//! Keyring APIs take strings, so blobs are stored base64-encoded.  The
//! keyring cannot enumerate its entries, so the store also keeps an index
//! entry listing every name it has written.  A name is added to the index
//! before its entry is written and removed after its entry is deleted.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, warn};

use super::SecureKeyStore;
use crate::errors::{Result, VaultError};

/// Account name of the index entry.
const INDEX_ACCOUNT: &str = "__seedvault_index";

/// A store backed by the OS keyring under one service name.
pub struct KeyringStore {
    service: String,
    /// Serializes index read-modify-write cycles within this process.
    index_lock: Mutex<()>,
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            index_lock: Mutex::new(()),
        }
    }

    fn entry(&self, account: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, account)
            .map_err(|e| VaultError::StoreError(format!("failed to create keyring entry: {e}")))
    }

    fn read_index(&self) -> Result<Vec<String>> {
        match self.entry(INDEX_ACCOUNT)?.get_password() {
            Ok(json) => serde_json::from_str(&json)
                .map_err(|e| VaultError::StoreError(format!("keyring index is corrupt: {e}"))),
            Err(keyring::Error::NoEntry) => Ok(Vec::new()),
            Err(e) => Err(VaultError::StoreError(format!(
                "failed to read keyring index: {e}"
            ))),
        }
    }

    fn update_index(&self, f: impl FnOnce(&mut Vec<String>)) -> Result<()> {
        let _guard = self
            .index_lock
            .lock()
            .map_err(|_| VaultError::StoreError("keyring index lock poisoned".into()))?;

        let mut names = self.read_index()?;
        f(&mut names);
        names.sort();
        names.dedup();

        let json = serde_json::to_string(&names)
            .map_err(|e| VaultError::SerializationError(format!("keyring index: {e}")))?;
        self.entry(INDEX_ACCOUNT)?
            .set_password(&json)
            .map_err(|e| VaultError::StoreError(format!("failed to write keyring index: {e}")))
    }
}

impl SecureKeyStore for KeyringStore {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        let encoded = match self.entry(name)?.get_password() {
            Ok(encoded) => encoded,
            Err(keyring::Error::NoEntry) => return Err(VaultError::NotFound(name.to_string())),
            Err(e) => {
                return Err(VaultError::StoreError(format!(
                    "failed to read '{name}' from keyring: {e}"
                )))
            }
        };

        BASE64
            .decode(encoded)
            .map_err(|e| VaultError::StoreError(format!("keyring entry '{name}' is not base64: {e}")))
    }

    fn set(&self, name: &str, blob: &[u8]) -> Result<()> {
        // Index first: an entry that exists must always be enumerable.  A
        // listed name without an entry is filtered out by `names()`.
        self.update_index(|names| names.push(name.to_string()))
            .map_err(|e| VaultError::WriteFailed(format!("'{name}': {e}")))?;

        let entry = self
            .entry(name)
            .map_err(|e| VaultError::WriteFailed(e.to_string()))?;
        entry.set_password(&BASE64.encode(blob)).map_err(|e| {
            VaultError::WriteFailed(format!("failed to store '{name}' in keyring: {e}"))
        })?;

        debug!(name = %name, "keyring entry written");
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        let result = match self.entry(name)?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Err(VaultError::NotFound(name.to_string())),
            Err(e) => {
                return Err(VaultError::StoreError(format!(
                    "failed to delete '{name}' from keyring: {e}"
                )))
            }
        };

        if let Err(e) = self.update_index(|names| names.retain(|n| n != name)) {
            warn!(name = %name, error = %e, "keyring index update failed");
        }
        result
    }

    fn exists(&self, name: &str) -> bool {
        self.entry(name)
            .map(|entry| entry.get_password().is_ok())
            .unwrap_or(false)
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self
            .read_index()?
            .into_iter()
            .filter(|name| self.exists(name))
            .collect())
    }
}
