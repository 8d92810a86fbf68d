//! Versioned password-based key derivation using PBKDF2-HMAC-SHA512.
//!
//! A raw key string is stretched in two stages:
//!
//! ```text
//! passcode_hash  = PBKDF2(raw_key, passcode_salt, passcode_rounds)
//! pre_key        = hex(pre_key_salt || passcode_hash)
//! encryption_key = PBKDF2(pre_key, encr_key_salt, encr_key_rounds)
//! ```
//!
//! Round counts, iv length and output length are fixed per cipher version
//! so that a given version derives the same key on every build.  Only the
//! salts and iv are persisted, never key bytes.

use hmac::Hmac;
use rand::RngCore;
use sha2::Sha512;
use zeroize::{Zeroize, Zeroizing};

use super::keys::EncryptionKey;
use crate::errors::{Result, VaultError};

/// Length of every salt in bytes (256 bits).
pub const SALT_LEN: usize = 32;

/// Length of the first-stage passcode hash (256 bits).
const PASSCODE_HASH_LEN: usize = 32;

/// Fixed derivation parameters for one cipher version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// PBKDF2 rounds over the raw key.
    pub passcode_rounds: u32,
    /// PBKDF2 rounds over the pre-key.
    pub encr_key_rounds: u32,
    /// Length of the iv recorded in the metadata.
    pub iv_len: usize,
    /// Length of the final encryption key material.
    pub key_len: usize,
}

impl KdfParams {
    /// Parameters for a cipher version.
    ///
    /// Append-only: an existing entry must never change, or data written
    /// under that version becomes unreadable.
    pub fn for_version(version: u32) -> Result<Self> {
        match version {
            // AES-256 key + HMAC-SHA256 key, 16-byte CBC iv.
            1 => Ok(Self {
                passcode_rounds: 91_337,
                encr_key_rounds: 33,
                iv_len: 16,
                key_len: 64,
            }),
            // AES-256 key, 12-byte GCM nonce.
            2 => Ok(Self {
                passcode_rounds: 91_337,
                encr_key_rounds: 33,
                iv_len: 12,
                key_len: 32,
            }),
            other => Err(VaultError::UnsupportedCipherVersion(other)),
        }
    }
}

/// The persisted half of a derivation: version, iv and the three salts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationMetadata {
    pub version: u32,
    pub iv: Vec<u8>,
    pub passcode_salt: Vec<u8>,
    pub pre_key_salt: Vec<u8>,
    pub encr_key_salt: Vec<u8>,
}

impl DerivationMetadata {
    /// Fresh random salts and iv for `version`.
    pub fn generate(version: u32) -> Result<Self> {
        let params = KdfParams::for_version(version)?;
        Ok(Self {
            version,
            iv: random_bytes(params.iv_len),
            passcode_salt: random_bytes(SALT_LEN),
            pre_key_salt: random_bytes(SALT_LEN),
            encr_key_salt: random_bytes(SALT_LEN),
        })
    }

    /// Check that every field has the length its version requires.
    pub fn validate(&self) -> Result<KdfParams> {
        let params = KdfParams::for_version(self.version)?;

        if self.iv.len() != params.iv_len {
            return Err(VaultError::InvalidFormat(format!(
                "iv must be {} bytes for cipher version {}, got {}",
                params.iv_len,
                self.version,
                self.iv.len()
            )));
        }

        for (field, salt) in [
            ("passcode_salt", &self.passcode_salt),
            ("pre_key_salt", &self.pre_key_salt),
            ("encr_key_salt", &self.encr_key_salt),
        ] {
            if salt.len() != SALT_LEN {
                return Err(VaultError::InvalidFormat(format!(
                    "{field} must be {SALT_LEN} bytes, got {}",
                    salt.len()
                )));
            }
        }

        Ok(params)
    }
}

/// Result of a derivation: the metadata that reproduces it plus the key.
pub struct DerivedKeys {
    pub metadata: DerivationMetadata,
    pub encryption_key: EncryptionKey,
}

/// Derive the encryption key for `version` from a raw key.
///
/// With `metadata == None` fresh salts and iv are generated (creation
/// path).  With stored metadata the same key is recomputed (open path);
/// the metadata must belong to `version` and be well-formed.
pub fn derive_keys(
    raw_key: &[u8],
    metadata: Option<&DerivationMetadata>,
    version: u32,
) -> Result<DerivedKeys> {
    let metadata = match metadata {
        Some(stored) => {
            if stored.version != version {
                return Err(VaultError::InvalidFormat(format!(
                    "metadata is for cipher version {}, expected {version}",
                    stored.version
                )));
            }
            stored.clone()
        }
        None => DerivationMetadata::generate(version)?,
    };
    let params = metadata.validate()?;

    let mut passcode_hash = [0u8; PASSCODE_HASH_LEN];
    pbkdf2_sha512(
        raw_key,
        &metadata.passcode_salt,
        params.passcode_rounds,
        &mut passcode_hash,
    )?;

    let mut pre_key_bytes = Vec::with_capacity(SALT_LEN + PASSCODE_HASH_LEN);
    pre_key_bytes.extend_from_slice(&metadata.pre_key_salt);
    pre_key_bytes.extend_from_slice(&passcode_hash);
    let pre_key = Zeroizing::new(hex::encode(&pre_key_bytes));

    passcode_hash.zeroize();
    pre_key_bytes.zeroize();

    let mut key = vec![0u8; params.key_len];
    pbkdf2_sha512(
        pre_key.as_bytes(),
        &metadata.encr_key_salt,
        params.encr_key_rounds,
        &mut key,
    )?;

    Ok(DerivedKeys {
        metadata,
        encryption_key: EncryptionKey::new(key),
    })
}

fn pbkdf2_sha512(password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) -> Result<()> {
    pbkdf2::pbkdf2::<Hmac<Sha512>>(password, salt, rounds, out)
        .map_err(|e| VaultError::KeyDerivationFailed(format!("PBKDF2 failed: {e}")))
}

/// Fill a buffer of `len` bytes from the OS-seeded CSPRNG.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rng().fill_bytes(&mut buf);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metadata_has_version_lengths() {
        let v1 = DerivationMetadata::generate(1).unwrap();
        assert_eq!(v1.iv.len(), 16);
        let v2 = DerivationMetadata::generate(2).unwrap();
        assert_eq!(v2.iv.len(), 12);
        assert_eq!(v2.passcode_salt.len(), SALT_LEN);
        assert_ne!(v2.pre_key_salt, v2.encr_key_salt);
    }

    #[test]
    fn stored_metadata_reproduces_key() {
        let created = derive_keys(b"Secret Key", None, 2).unwrap();
        let reopened = derive_keys(b"Secret Key", Some(&created.metadata), 2).unwrap();
        assert_eq!(
            created.encryption_key.as_bytes(),
            reopened.encryption_key.as_bytes()
        );
        assert_eq!(created.encryption_key.as_bytes().len(), 32);
    }

    #[test]
    fn different_key_gives_different_material() {
        let created = derive_keys(b"one", None, 2).unwrap();
        let other = derive_keys(b"two", Some(&created.metadata), 2).unwrap();
        assert_ne!(
            created.encryption_key.as_bytes(),
            other.encryption_key.as_bytes()
        );
    }

    #[test]
    fn v1_outputs_aes_and_mac_key() {
        let keys = derive_keys(b"k", None, 1).unwrap();
        assert_eq!(keys.encryption_key.as_bytes().len(), 64);
    }

    #[test]
    fn unknown_version_is_rejected() {
        assert!(matches!(
            derive_keys(b"k", None, 99),
            Err(VaultError::UnsupportedCipherVersion(99))
        ));
    }

    #[test]
    fn malformed_metadata_is_invalid_format() {
        let mut meta = DerivationMetadata::generate(2).unwrap();
        meta.pre_key_salt.truncate(5);
        assert!(matches!(
            derive_keys(b"k", Some(&meta), 2),
            Err(VaultError::InvalidFormat(_))
        ));
    }

    #[test]
    fn version_mismatch_is_invalid_format() {
        let meta = DerivationMetadata::generate(1).unwrap();
        assert!(matches!(
            derive_keys(b"k", Some(&meta), 2),
            Err(VaultError::InvalidFormat(_))
        ));
    }
}
