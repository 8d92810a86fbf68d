//! Versioned vault cipher.
//!
//! Every generation is a variant of [`CipherVersion`], keyed by the integer
//! tag stored in the vault metadata.  New data is always written with
//! [`CipherVersion::LATEST`]; existing data is always read with the
//! version it was written under, so older vaults never need an eager
//! rewrite.  Adding a generation means adding a variant and a module;
//! existing variants are never changed.

pub mod v1_aes_cbc;
pub mod v2_aes_gcm;

use zeroize::Zeroizing;

use crate::crypto::DerivationMetadata;
use crate::errors::{Result, VaultError};

/// Output of an encryption: ciphertext plus the metadata that reopens it.
#[derive(Debug, Clone)]
pub struct CipherOutput {
    pub ciphertext: Vec<u8>,
    pub version: u32,
    pub metadata: DerivationMetadata,
}

/// Known cipher generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CipherVersion {
    /// AES-256-CBC, PKCS#7, encrypt-then-HMAC-SHA256.
    V1AesCbc,
    /// AES-256-GCM.
    V2AesGcm,
}

impl CipherVersion {
    /// The generation used for every new encryption.
    pub const LATEST: CipherVersion = CipherVersion::V2AesGcm;

    /// All generations, oldest first.
    pub const ALL: [CipherVersion; 2] = [CipherVersion::V1AesCbc, CipherVersion::V2AesGcm];

    /// Resolve a stored version tag.
    ///
    /// An unknown tag means the data was written by a newer or foreign
    /// build.
    pub fn from_u32(version: u32) -> Result<Self> {
        match version {
            v1_aes_cbc::VERSION => Ok(CipherVersion::V1AesCbc),
            v2_aes_gcm::VERSION => Ok(CipherVersion::V2AesGcm),
            other => Err(VaultError::UnsupportedCipherVersion(other)),
        }
    }

    /// The integer tag persisted for this generation.
    pub fn as_u32(self) -> u32 {
        match self {
            CipherVersion::V1AesCbc => v1_aes_cbc::VERSION,
            CipherVersion::V2AesGcm => v2_aes_gcm::VERSION,
        }
    }

    /// Encrypt with this specific generation.
    pub fn encrypt(self, plaintext: &[u8], key: &[u8]) -> Result<CipherOutput> {
        match self {
            CipherVersion::V1AesCbc => v1_aes_cbc::encrypt(plaintext, key),
            CipherVersion::V2AesGcm => v2_aes_gcm::encrypt(plaintext, key),
        }
    }

    /// Decrypt with this specific generation.
    pub fn decrypt(
        self,
        ciphertext: &[u8],
        key: &[u8],
        metadata: &DerivationMetadata,
    ) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            CipherVersion::V1AesCbc => v1_aes_cbc::decrypt(ciphertext, key, metadata),
            CipherVersion::V2AesGcm => v2_aes_gcm::decrypt(ciphertext, key, metadata),
        }
    }
}

/// Tag of the latest known cipher generation.
pub fn latest_version() -> u32 {
    CipherVersion::LATEST.as_u32()
}

/// Encrypt `plaintext` under `key` with the latest generation, generating
/// fresh salts and iv.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<CipherOutput> {
    CipherVersion::LATEST.encrypt(plaintext, key)
}

/// Decrypt with the generation recorded in `metadata`.
///
/// Never returns partial plaintext: any failure yields an error.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    metadata: &DerivationMetadata,
) -> Result<Zeroizing<Vec<u8>>> {
    CipherVersion::from_u32(metadata.version)?.decrypt(ciphertext, key, metadata)
}
