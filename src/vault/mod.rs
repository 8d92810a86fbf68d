//! Vault module: named, passcode-encrypted entries in a secure store.
//!
//! This module provides:
//! - The persisted JSON record and recovery naming (`record`)
//! - `VaultManager` for creating, opening, rekeying and purging vaults (`manager`)

pub mod manager;
pub mod record;

// Re-export the most commonly used items.
pub use manager::{BatchRekeyReport, MigrationStatus, VaultManager, STORAGE_KEY_NAME};
pub use record::{recovery_name, VaultRecord, RECOVERY_SUFFIX};
