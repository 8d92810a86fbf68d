//! Cipher generation 1: AES-256-CBC with PKCS#7 padding.
//!
//! The derived 64-byte key is split into an AES key and an HMAC key.  The
//! stored ciphertext is `cbc_ciphertext || HMAC-SHA256(mac_key, iv || cbc_ciphertext)`;
//! the tag is checked before any decryption happens.

use zeroize::Zeroizing;

use super::CipherOutput;
use crate::crypto::encryption::{
    aes_cbc_decrypt, aes_cbc_encrypt, hmac_sha256, verify_hmac_sha256, AES_BLOCK_LEN, HMAC_LEN,
};
use crate::crypto::{derive_keys, DerivationMetadata};
use crate::errors::{Result, VaultError};

/// Version tag stored in the metadata.
pub const VERSION: u32 = 1;

/// Encrypt `plaintext` under `key` with fresh salts and iv.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<CipherOutput> {
    let keys = derive_keys(key, None, VERSION)?;
    let (aes_key, mac_key) = keys.encryption_key.split();

    let mut ciphertext = aes_cbc_encrypt(aes_key, &keys.metadata.iv, plaintext)?;
    let tag = hmac_sha256(mac_key, &[&keys.metadata.iv, &ciphertext])?;
    ciphertext.extend_from_slice(&tag);

    Ok(CipherOutput {
        ciphertext,
        version: VERSION,
        metadata: keys.metadata,
    })
}

/// Decrypt data written by [`encrypt`].
pub fn decrypt(
    ciphertext: &[u8],
    key: &[u8],
    metadata: &DerivationMetadata,
) -> Result<Zeroizing<Vec<u8>>> {
    metadata.validate()?;

    // At least one padded block plus the tag.
    if ciphertext.len() < AES_BLOCK_LEN + HMAC_LEN {
        return Err(VaultError::DecryptionFailed);
    }
    let (body, tag) = ciphertext.split_at(ciphertext.len() - HMAC_LEN);

    let keys = derive_keys(key, Some(metadata), VERSION)?;
    let (aes_key, mac_key) = keys.encryption_key.split();

    if !verify_hmac_sha256(mac_key, &[&metadata.iv, body], tag)? {
        return Err(VaultError::InvalidKey);
    }

    aes_cbc_decrypt(aes_key, &metadata.iv, body).map(Zeroizing::new)
}
