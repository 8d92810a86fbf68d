//! Key material wrappers that zero their memory when dropped.

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Derived encryption key material for one cipher operation.
///
/// Layout depends on the cipher version: 32 bytes of AES key, optionally
/// followed by a 32-byte MAC key.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey {
    bytes: Vec<u8>,
}

impl EncryptionKey {
    /// Wrap raw key bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Access the raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Split into `(aes_key, mac_key)` at 32 bytes.
    ///
    /// `mac_key` is empty when the material is only an AES key.
    pub fn split(&self) -> (&[u8], &[u8]) {
        let at = self.bytes.len().min(32);
        self.bytes.split_at(at)
    }
}

/// Length of the storage encryption key in bytes (512 bits).
pub const STORAGE_KEY_LEN: usize = 64;

/// The device-wide storage encryption key, held as lowercase hex.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct StorageEncryptionKey {
    hex: String,
}

impl StorageEncryptionKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        let mut bytes = super::kdf::random_bytes(STORAGE_KEY_LEN);
        let key = Self {
            hex: hex::encode(&bytes),
        };
        bytes.zeroize();
        key
    }

    /// Parse a stored key, rejecting anything that is not
    /// `STORAGE_KEY_LEN` bytes of hex.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == STORAGE_KEY_LEN * 2 && hex.bytes().all(|b| b.is_ascii_hexdigit());
        valid.then(|| Self {
            hex: hex.to_ascii_lowercase(),
        })
    }

    /// The key as a hex string.
    pub fn as_hex(&self) -> &str {
        &self.hex
    }
}

impl std::fmt::Debug for StorageEncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StorageEncryptionKey(..)")
    }
}
