//! Cipher generation 2: AES-256-GCM.
//!
//! The iv in the metadata is the 12-byte nonce.  The version tag is bound
//! in as associated data so a blob cannot be replayed under another
//! generation's metadata.

use zeroize::Zeroizing;

use super::CipherOutput;
use crate::crypto::encryption::{aes_gcm_decrypt, aes_gcm_encrypt, GCM_TAG_LEN};
use crate::crypto::{derive_keys, DerivationMetadata};
use crate::errors::{Result, VaultError};

/// Version tag stored in the metadata.
pub const VERSION: u32 = 2;

/// Associated data for every v2 encryption.
const AAD: &[u8] = b"seedvault-cipher-v2";

/// Encrypt `plaintext` under `key` with fresh salts and nonce.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<CipherOutput> {
    let keys = derive_keys(key, None, VERSION)?;

    let ciphertext = aes_gcm_encrypt(
        keys.encryption_key.as_bytes(),
        &keys.metadata.iv,
        AAD,
        plaintext,
    )?;

    Ok(CipherOutput {
        ciphertext,
        version: VERSION,
        metadata: keys.metadata,
    })
}

/// Decrypt data written by [`encrypt`].
///
/// A tag mismatch on a well-formed blob is reported as `InvalidKey`.
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    metadata: &DerivationMetadata,
) -> Result<Zeroizing<Vec<u8>>> {
    metadata.validate()?;

    if ciphertext.len() < GCM_TAG_LEN {
        return Err(VaultError::DecryptionFailed);
    }

    let keys = derive_keys(key, Some(metadata), VERSION)?;

    aes_gcm_decrypt(keys.encryption_key.as_bytes(), &metadata.iv, AAD, ciphertext)
        .map(Zeroizing::new)
        .map_err(|_| VaultError::InvalidKey)
}
