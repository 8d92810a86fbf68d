//! Vault lifecycle: create, open, rekey, migrate and purge named vaults.
//!
//! `VaultManager` sits on top of a [`SecureKeyStore`] and the versioned
//! cipher.  Every mutation of a vault entry is a single atomic store
//! `set`, and the previous ciphertext is never removed before its
//! replacement has been read back and decrypted.

use std::sync::{Arc, Mutex};

use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use super::record::{recovery_name, VaultRecord, RECOVERY_SUFFIX};
use crate::biometric::software::BIOMETRIC_KEY_NAME;
use crate::cipher::{self, CipherVersion};
use crate::crypto::StorageEncryptionKey;
use crate::device::DEVICE_ID_NAME;
use crate::errors::{Result, VaultError};
use crate::store::SecureKeyStore;

/// Store entry holding the device-wide storage encryption key.
pub const STORAGE_KEY_NAME: &str = "storage_encryption_key";

/// Entries that are not vaults and cannot be used as vault names.
const RESERVED_NAMES: [&str; 3] = [STORAGE_KEY_NAME, DEVICE_ID_NAME, BIOMETRIC_KEY_NAME];

/// Entries `purge_all` leaves in place.
const PRESERVED_ON_PURGE: [&str; 2] = [DEVICE_ID_NAME, BIOMETRIC_KEY_NAME];

/// Maximum length of a vault name in bytes.
const MAX_NAME_LEN: usize = 256;

/// Result of [`VaultManager::is_migration_required`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    pub vault: String,
    pub current_version: u32,
    pub latest_version: u32,
    pub required: bool,
}

/// Per-name outcome of [`VaultManager::re_key_batch_vaults`].
///
/// The batch is best-effort: a failure on one name does not undo the
/// names that succeeded.
#[derive(Debug, Default)]
pub struct BatchRekeyReport {
    pub outcomes: Vec<(String, Result<()>)>,
}

impl BatchRekeyReport {
    /// `true` when every vault was rekeyed.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(|(_, outcome)| outcome.is_ok())
    }

    /// Names that were rekeyed.
    pub fn succeeded(&self) -> Vec<&str> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_ok())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// Names that failed, with the reason.
    pub fn failed(&self) -> Vec<(&str, &VaultError)> {
        self.outcomes
            .iter()
            .filter_map(|(name, outcome)| outcome.as_ref().err().map(|e| (name.as_str(), e)))
            .collect()
    }
}

/// Owner of every vault stored in one secure store.
pub struct VaultManager {
    store: Arc<dyn SecureKeyStore>,

    /// Storage encryption key, loaded lazily on first request.
    storage_key: Mutex<Option<StorageEncryptionKey>>,
}

impl VaultManager {
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self {
            store,
            storage_key: Mutex::new(None),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn SecureKeyStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Vault lifecycle
    // ------------------------------------------------------------------

    /// Create a new vault holding `data`, encrypted under `key`.
    ///
    /// An existing vault is never overwritten.  The new entry is read
    /// back and decrypted before returning; if that fails it is removed
    /// again, so no record is left behind on failure.
    pub fn create_vault(&self, name: &str, data: &str, key: &str) -> Result<()> {
        validate_vault_name(name)?;

        if self.store.exists(name) {
            return Err(VaultError::AlreadyExists(name.to_string()));
        }

        let record = VaultRecord::from_output(cipher::encrypt(data.as_bytes(), key.as_bytes())?);
        self.store.set(name, &record.to_bytes()?)?;

        if let Err(e) = self.confirm(name, key, data) {
            warn!(vault = %name, error = %e, "new vault failed verification, removing it");
            self.discard(name);
            return Err(e);
        }

        info!(vault = %name, cipher_version = record.cipher_version, "vault created");
        Ok(())
    }

    /// Whether a vault entry exists.  No decryption is attempted.
    pub fn vault_exist(&self, name: &str) -> bool {
        self.store.exists(name)
    }

    /// Decrypt a vault and return its plaintext.
    ///
    /// With `recoverable`, a primary entry that is missing, corrupt or
    /// does not open with `key` falls back to the recovery copy left by an
    /// interrupted rekey.  When the primary was missing it is restored
    /// from that copy; an existing primary is never overwritten here,
    /// since it may already hold the rekeyed record.
    pub fn open_vault(&self, name: &str, key: &str, recoverable: bool) -> Result<Zeroizing<String>> {
        validate_vault_name(name)?;

        let primary = self
            .read_record(name)
            .and_then(|record| decrypt_record(&record, key));

        let primary_error = match primary {
            Ok(clear) => {
                debug!(vault = %name, "vault opened");
                return Ok(clear);
            }
            Err(e) => e,
        };

        let primary_missing = matches!(primary_error, VaultError::NotFound(_));
        if !recoverable || !(primary_missing || falls_back_to_recovery(&primary_error)) {
            return Err(primary_error);
        }

        let recovery = recovery_name(name);
        let recovery_bytes = match self.store.get(&recovery) {
            Ok(bytes) => bytes,
            Err(VaultError::NotFound(_)) => return Err(primary_error),
            Err(e) => return Err(e),
        };

        let clear = match VaultRecord::from_bytes(&recovery_bytes)
            .and_then(|record| decrypt_record(&record, key))
        {
            Ok(clear) => clear,
            Err(e) if primary_missing => return Err(e),
            Err(_) => return Err(primary_error),
        };

        warn!(vault = %name, "vault opened from recovery copy");

        if primary_missing {
            match self.store.set(name, &recovery_bytes) {
                Ok(()) => {
                    self.discard(&recovery);
                    info!(vault = %name, "vault restored from recovery copy");
                }
                Err(e) => warn!(vault = %name, error = %e, "failed to restore vault from recovery copy"),
            }
        }

        Ok(clear)
    }

    /// Re-encrypt a vault under `new_key`, migrating it to the latest
    /// cipher version.
    ///
    /// The current record is first copied to the recovery entry.  The
    /// primary entry is replaced in one atomic write, then read back and
    /// decrypted with `new_key`; only after that is the recovery copy
    /// dropped.  On any failure the vault still opens with `old_key`.
    pub fn re_key_vault(&self, name: &str, old_key: &str, new_key: &str) -> Result<()> {
        validate_vault_name(name)?;

        let RekeySource {
            bytes: old_bytes,
            record: old_record,
            clear,
            resumed,
        } = self.read_rekey_source(name, old_key)?;

        // Any stale recovery copy is replaced by the record that just opened.
        let recovery = recovery_name(name);
        self.store.set(&recovery, &old_bytes)?;

        let new_record =
            VaultRecord::from_output(cipher::encrypt(clear.as_bytes(), new_key.as_bytes())?);

        if let Err(e) = self.store.set(name, &new_record.to_bytes()?) {
            // The primary was not replaced.  Unless it came from an earlier
            // interrupted rekey, it still opens with `old_key` on its own.
            if !resumed {
                self.discard(&recovery);
            }
            return Err(e);
        }

        if let Err(e) = self.confirm(name, new_key, &clear) {
            warn!(vault = %name, error = %e, "rekeyed vault failed verification, rolling back");
            match self.store.set(name, &old_bytes) {
                Ok(()) => self.discard(&recovery),
                Err(restore) => {
                    warn!(vault = %name, error = %restore, "rollback failed, recovery copy kept")
                }
            }
            return Err(e);
        }

        if let Err(e) = self.store.delete(&recovery) {
            warn!(vault = %name, error = %e, "failed to remove recovery copy after rekey");
        }

        info!(
            vault = %name,
            from_version = old_record.cipher_version,
            to_version = new_record.cipher_version,
            "vault rekeyed"
        );
        Ok(())
    }

    /// Rekey several vaults, one at a time.
    ///
    /// Each vault is rekeyed with the same guarantees as
    /// [`re_key_vault`](Self::re_key_vault); the batch as a whole is not
    /// atomic.
    pub fn re_key_batch_vaults<S: AsRef<str>>(
        &self,
        names: &[S],
        old_key: &str,
        new_key: &str,
    ) -> BatchRekeyReport {
        let mut report = BatchRekeyReport::default();

        for name in names {
            let name = name.as_ref();
            let outcome = self.re_key_vault(name, old_key, new_key);
            if let Err(e) = &outcome {
                warn!(vault = %name, error = %e, "batch rekey failed for vault");
            }
            report.outcomes.push((name.to_string(), outcome));
        }

        info!(
            total = report.outcomes.len(),
            failed = report.failed().len(),
            "batch rekey finished"
        );
        report
    }

    /// Compare the stored cipher version against the latest one, without
    /// decrypting.
    pub fn is_migration_required(&self, name: &str) -> Result<MigrationStatus> {
        validate_vault_name(name)?;

        let record = self.read_record(name)?;
        let current = CipherVersion::from_u32(record.cipher_version)?;

        Ok(MigrationStatus {
            vault: name.to_string(),
            current_version: current.as_u32(),
            latest_version: CipherVersion::LATEST.as_u32(),
            required: current < CipherVersion::LATEST,
        })
    }

    // ------------------------------------------------------------------
    // Storage encryption key
    // ------------------------------------------------------------------

    /// The device-wide storage encryption key, generated and stored on
    /// first use.
    ///
    /// A stored key that cannot be parsed is an error; it is never
    /// silently replaced.
    pub fn get_storage_encryption_key(&self) -> Result<StorageEncryptionKey> {
        let mut cached = self
            .storage_key
            .lock()
            .map_err(|_| VaultError::StoreError("storage key lock poisoned".into()))?;

        if let Some(key) = cached.as_ref() {
            return Ok(key.clone());
        }

        let key = match self.store.get(STORAGE_KEY_NAME) {
            Ok(bytes) => parse_storage_key(&bytes)?,
            Err(VaultError::NotFound(_)) => {
                let fresh = StorageEncryptionKey::generate();
                self.store.set(STORAGE_KEY_NAME, fresh.as_hex().as_bytes())?;
                info!("storage encryption key generated");

                // Read back so concurrent initializers settle on the
                // value that actually landed in the store.
                parse_storage_key(&self.store.get(STORAGE_KEY_NAME)?)?
            }
            Err(e) => return Err(e),
        };

        *cached = Some(key.clone());
        Ok(key)
    }

    /// Whether the storage encryption key has been created.
    pub fn is_storage_encryption_key_exist(&self) -> bool {
        self.store.exists(STORAGE_KEY_NAME)
    }

    // ------------------------------------------------------------------
    // Purge
    // ------------------------------------------------------------------

    /// Permanently delete a vault and its recovery copy.
    pub fn purge_vault(&self, name: &str) -> Result<()> {
        validate_vault_name(name)?;

        let removed_primary = delete_if_present(self.store.as_ref(), name)?;
        let removed_recovery = delete_if_present(self.store.as_ref(), &recovery_name(name))?;

        if !removed_primary && !removed_recovery {
            return Err(VaultError::NotFound(name.to_string()));
        }

        info!(vault = %name, "vault purged");
        Ok(())
    }

    /// Permanently delete every vault, every recovery copy and the
    /// storage encryption key.
    ///
    /// The device unique id and the biometric key are left alone.
    pub fn purge_all(&self) -> Result<()> {
        let names = self.store.names()?;
        let mut purged = 0usize;

        for name in names
            .iter()
            .filter(|name| !PRESERVED_ON_PURGE.contains(&name.as_str()))
        {
            if delete_if_present(self.store.as_ref(), name)? {
                purged += 1;
            }
        }

        if let Ok(mut cached) = self.storage_key.lock() {
            *cached = None;
        }

        info!(entries = purged, "all vaults purged");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// The record a rekey starts from, with its bytes and plaintext.
    ///
    /// Normally the primary entry.  If the primary does not open with
    /// `old_key` but the recovery copy does, an earlier rekey stopped
    /// after replacing the primary and is resumed from the copy.
    fn read_rekey_source(&self, name: &str, old_key: &str) -> Result<RekeySource> {
        let primary_bytes = self.store.get(name)?;
        let primary_error = match open_bytes(&primary_bytes, old_key) {
            Ok((record, clear)) => {
                return Ok(RekeySource {
                    bytes: primary_bytes,
                    record,
                    clear,
                    resumed: false,
                })
            }
            Err(e) if falls_back_to_recovery(&e) => e,
            Err(e) => return Err(e),
        };

        let recovery_bytes = match self.store.get(&recovery_name(name)) {
            Ok(bytes) => bytes,
            Err(VaultError::NotFound(_)) => return Err(primary_error),
            Err(e) => return Err(e),
        };

        match open_bytes(&recovery_bytes, old_key) {
            Ok((record, clear)) => {
                warn!(vault = %name, "resuming interrupted rekey from recovery copy");
                Ok(RekeySource {
                    bytes: recovery_bytes,
                    record,
                    clear,
                    resumed: true,
                })
            }
            Err(_) => Err(primary_error),
        }
    }

    /// Best-effort delete of a leftover entry.
    fn discard(&self, name: &str) {
        match self.store.delete(name) {
            Ok(()) | Err(VaultError::NotFound(_)) => {}
            Err(e) => warn!(entry = %name, error = %e, "failed to remove entry"),
        }
    }

    fn read_record(&self, name: &str) -> Result<VaultRecord> {
        VaultRecord::from_bytes(&self.store.get(name)?)
    }

    /// Read the entry back and check it decrypts to `expected`.
    fn confirm(&self, name: &str, key: &str, expected: &str) -> Result<()> {
        let clear = decrypt_record(&self.read_record(name)?, key)?;
        if bool::from(clear.as_bytes().ct_eq(expected.as_bytes())) {
            Ok(())
        } else {
            Err(VaultError::WriteFailed(format!(
                "vault '{name}' did not read back the data that was written"
            )))
        }
    }
}

/// Record a rekey starts from.
struct RekeySource {
    bytes: Vec<u8>,
    record: VaultRecord,
    clear: Zeroizing<String>,
    /// Taken from the recovery copy rather than the primary entry.
    resumed: bool,
}

/// Errors after which the recovery copy is worth trying: the primary is
/// damaged, or was already replaced under a different key.
fn falls_back_to_recovery(e: &VaultError) -> bool {
    matches!(e, VaultError::InvalidKey) || e.is_corruption()
}

fn open_bytes(bytes: &[u8], key: &str) -> Result<(VaultRecord, Zeroizing<String>)> {
    let record = VaultRecord::from_bytes(bytes)?;
    let clear = decrypt_record(&record, key)?;
    Ok((record, clear))
}

fn decrypt_record(record: &VaultRecord, key: &str) -> Result<Zeroizing<String>> {
    let mut clear = cipher::decrypt(&record.ciphertext, key.as_bytes(), &record.metadata())?;

    // Take the bytes out of the zeroizing buffer without copying them.
    let bytes = std::mem::take(&mut *clear);
    String::from_utf8(bytes).map(Zeroizing::new).map_err(|e| {
        drop(Zeroizing::new(e.into_bytes()));
        VaultError::DecryptionFailed
    })
}

fn parse_storage_key(bytes: &[u8]) -> Result<StorageEncryptionKey> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(StorageEncryptionKey::from_hex)
        .ok_or_else(|| VaultError::InvalidFormat("stored storage encryption key is malformed".into()))
}

/// Delete `name`, reporting whether anything was there.
fn delete_if_present(store: &dyn SecureKeyStore, name: &str) -> Result<bool> {
    match store.delete(name) {
        Ok(()) => Ok(true),
        Err(VaultError::NotFound(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Validate that a vault name is usable.
///
/// Allowed: ASCII letters, digits, underscores, hyphens, periods.
/// Must be non-empty, at most 256 bytes, not a reserved entry and not
/// end with the recovery suffix.
fn validate_vault_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(VaultError::InvalidFormat("vault name cannot be empty".into()));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(VaultError::InvalidFormat(format!(
            "vault name cannot exceed {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b == b'.')
    {
        return Err(VaultError::InvalidFormat(format!(
            "vault name '{name}' contains invalid characters; only ASCII letters, digits, underscores, hyphens, and periods are allowed"
        )));
    }
    if RESERVED_NAMES.contains(&name) {
        return Err(VaultError::InvalidFormat(format!(
            "'{name}' is reserved and cannot be used as a vault name"
        )));
    }
    if name.ends_with(RECOVERY_SUFFIX) {
        return Err(VaultError::InvalidFormat(format!(
            "vault name cannot end with '{RECOVERY_SUFFIX}'"
        )));
    }
    Ok(())
}
