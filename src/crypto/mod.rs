//! Cryptographic primitives for SeedVault.
//!
//! This module provides:
//! - Versioned PBKDF2-HMAC-SHA512 key derivation (`kdf`)
//! - AES-256-CBC, AES-256-GCM and HMAC-SHA256 primitives (`encryption`)
//! - Zeroizing key material wrappers (`keys`)

pub mod encryption;
pub mod kdf;
pub mod keys;

// Re-export the most commonly used items so callers can write:
//   use crate::crypto::{derive_keys, DerivationMetadata, ...};
pub use kdf::{derive_keys, random_bytes, DerivationMetadata, DerivedKeys, KdfParams};
pub use keys::{EncryptionKey, StorageEncryptionKey};
