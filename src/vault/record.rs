//! Persisted vault record and its JSON layout.
//!
//! Each vault is stored in the secure store as one JSON document:
//!
//! ```text
//! {
//!   "cipherVersion": 2,
//!   "iv":            "<hex>",
//!   "passcode_salt": "<hex>",
//!   "pre_key_salt":  "<hex>",
//!   "encr_key_salt": "<hex>",
//!   "ciphertext":    "<base64>"
//! }
//! ```
//!
//! The whole record is written with a single store `set`, so an entry is
//! either absent or complete.  During a rekey the previous record is kept
//! verbatim under `<name>_recovery`.

use serde::{Deserialize, Serialize};

use crate::cipher::CipherOutput;
use crate::crypto::DerivationMetadata;
use crate::errors::{Result, VaultError};

/// Suffix appended to a vault name for its recovery copy.
pub const RECOVERY_SUFFIX: &str = "_recovery";

/// Name of the recovery copy for `vault_name`.
pub fn recovery_name(vault_name: &str) -> String {
    format!("{vault_name}{RECOVERY_SUFFIX}")
}

/// One stored vault: ciphertext plus everything needed to re-derive its key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultRecord {
    /// Cipher generation that produced `ciphertext`.
    #[serde(rename = "cipherVersion")]
    pub cipher_version: u32,

    #[serde(with = "hex::serde")]
    pub iv: Vec<u8>,

    #[serde(with = "hex::serde")]
    pub passcode_salt: Vec<u8>,

    #[serde(with = "hex::serde")]
    pub pre_key_salt: Vec<u8>,

    #[serde(with = "hex::serde")]
    pub encr_key_salt: Vec<u8>,

    /// Serialized as a base64 string in JSON.
    #[serde(serialize_with = "base64_encode", deserialize_with = "base64_decode")]
    pub ciphertext: Vec<u8>,
}

impl VaultRecord {
    /// Build a record from a fresh encryption.
    pub fn from_output(output: CipherOutput) -> Self {
        let CipherOutput {
            ciphertext,
            version,
            metadata,
        } = output;

        Self {
            cipher_version: version,
            iv: metadata.iv,
            passcode_salt: metadata.passcode_salt,
            pre_key_salt: metadata.pre_key_salt,
            encr_key_salt: metadata.encr_key_salt,
            ciphertext,
        }
    }

    /// The derivation metadata embedded in this record.
    pub fn metadata(&self) -> DerivationMetadata {
        DerivationMetadata {
            version: self.cipher_version,
            iv: self.iv.clone(),
            passcode_salt: self.passcode_salt.clone(),
            pre_key_salt: self.pre_key_salt.clone(),
            encr_key_salt: self.encr_key_salt.clone(),
        }
    }

    /// Serialize to the stored JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| VaultError::SerializationError(format!("vault record: {e}")))
    }

    /// Parse stored bytes.
    ///
    /// Only the structure is checked here; field lengths and the version
    /// are checked by the cipher on decrypt, so a record written by a
    /// newer build can still be inspected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| VaultError::InvalidFormat(format!("vault record JSON: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Serde helpers for base64-encoded Vec<u8> fields
// ---------------------------------------------------------------------------

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

pub(crate) fn base64_encode<S>(data: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let encoded = BASE64.encode(data);
    serializer.serialize_str(&encoded)
}

pub(crate) fn base64_decode<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    BASE64.decode(&s).map_err(serde::de::Error::custom)
}
