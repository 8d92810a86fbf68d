//! Name-keyed secure blob stores.
//!
//! [`SecureKeyStore`] is the contract the vault core needs from the
//! platform secret store: atomic per-name get/set/delete.  Backends:
//!
//! - [`MemoryStore`] — process-local map
//! - [`FileStore`] — one owner-only file per entry, atomic rename on write
//! - `KeyringStore` — OS keychain (feature `keyring-store`)

pub mod file;
pub mod memory;

#[cfg(feature = "keyring-store")]
pub mod keyring;

pub use file::FileStore;
pub use memory::MemoryStore;

#[cfg(feature = "keyring-store")]
pub use self::keyring::KeyringStore;

use crate::errors::Result;

/// A durable, access-controlled name → blob store.
///
/// Writes under one name are last-writer-wins and atomic: a reader sees
/// either the previous blob or the new one, never a mix.
pub trait SecureKeyStore: Send + Sync {
    /// Read the blob stored under `name`, or `NotFound`.
    fn get(&self, name: &str) -> Result<Vec<u8>>;

    /// Store `blob` under `name`, replacing any previous value.
    ///
    /// Fails with `WriteFailed`; on failure the previous value is intact.
    fn set(&self, name: &str, blob: &[u8]) -> Result<()>;

    /// Remove the entry, or `NotFound` if there is none.
    fn delete(&self, name: &str) -> Result<()>;

    /// Whether an entry exists under `name`.
    fn exists(&self, name: &str) -> bool;

    /// Names of every entry currently stored.
    fn names(&self) -> Result<Vec<String>>;
}

impl<T: SecureKeyStore + ?Sized> SecureKeyStore for std::sync::Arc<T> {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        (**self).get(name)
    }

    fn set(&self, name: &str, blob: &[u8]) -> Result<()> {
        (**self).set(name, blob)
    }

    fn delete(&self, name: &str) -> Result<()> {
        (**self).delete(name)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn names(&self) -> Result<Vec<String>> {
        (**self).names()
    }
}
