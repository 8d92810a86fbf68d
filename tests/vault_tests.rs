//! Integration tests for the SeedVault vault manager.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use seedvault::cipher::{self, CipherVersion};
use seedvault::device::{DeviceIdentity, DEVICE_ID_NAME};
use seedvault::store::{FileStore, MemoryStore, SecureKeyStore};
use seedvault::vault::{recovery_name, VaultManager, VaultRecord};
use seedvault::{Result, VaultError};
use tempfile::TempDir;

const SEED: &str = "abandon ability able about above absent absorb abstract absurd abuse access accident";

fn manager() -> VaultManager {
    VaultManager::new(Arc::new(MemoryStore::new()))
}

/// A store that refuses writes to chosen names.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
}

impl FlakyStore {
    fn fail_writes_to(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }
}

impl SecureKeyStore for FlakyStore {
    fn get(&self, name: &str) -> Result<Vec<u8>> {
        self.inner.get(name)
    }

    fn set(&self, name: &str, blob: &[u8]) -> Result<()> {
        if self.failing.lock().unwrap().contains(name) {
            return Err(VaultError::WriteFailed(format!("injected failure for '{name}'")));
        }
        self.inner.set(name, blob)
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.inner.delete(name)
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn names(&self) -> Result<Vec<String>> {
        self.inner.names()
    }
}

/// Write a vault directly in an older cipher generation.
fn write_legacy_vault(store: &dyn SecureKeyStore, name: &str, data: &str, key: &str) {
    let output = CipherVersion::V1AesCbc
        .encrypt(data.as_bytes(), key.as_bytes())
        .unwrap();
    store
        .set(name, &VaultRecord::from_output(output).to_bytes().unwrap())
        .unwrap();
}

// ---------------------------------------------------------------------------
// Create and open
// ---------------------------------------------------------------------------

#[test]
fn create_and_open_roundtrip() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    assert!(vm.vault_exist("main"));
    assert_eq!(&*vm.open_vault("main", "123456", false).unwrap(), SEED);
}

#[test]
fn create_refuses_to_overwrite() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    assert!(matches!(
        vm.create_vault("main", "other", "000000"),
        Err(VaultError::AlreadyExists(_))
    ));
    assert_eq!(&*vm.open_vault("main", "123456", false).unwrap(), SEED);
}

#[test]
fn wrong_key_never_returns_plaintext() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    assert!(matches!(
        vm.open_vault("main", "654321", false),
        Err(VaultError::InvalidKey)
    ));
    assert!(matches!(
        vm.open_vault("main", "654321", true),
        Err(VaultError::InvalidKey)
    ));
}

#[test]
fn open_missing_vault_is_not_found() {
    let vm = manager();
    assert!(!vm.vault_exist("ghost"));
    assert!(matches!(
        vm.open_vault("ghost", "123456", false),
        Err(VaultError::NotFound(_))
    ));
}

#[test]
fn failed_create_leaves_nothing_behind() {
    let store = Arc::new(FlakyStore::default());
    store.fail_writes_to("main");
    let vm = VaultManager::new(store.clone());

    assert!(matches!(
        vm.create_vault("main", SEED, "123456"),
        Err(VaultError::WriteFailed(_))
    ));
    assert!(!vm.vault_exist("main"));
}

#[test]
fn corrupt_record_is_surfaced_not_overwritten() {
    let vm = manager();
    vm.store().set("main", b"{ definitely not a record").unwrap();

    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::InvalidFormat(_))
    ));
    assert_eq!(vm.store().get("main").unwrap(), b"{ definitely not a record");
}

#[test]
fn unknown_cipher_version_is_reported() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    let mut record = VaultRecord::from_bytes(&vm.store().get("main").unwrap()).unwrap();
    record.cipher_version = 99;
    vm.store().set("main", &record.to_bytes().unwrap()).unwrap();

    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::UnsupportedCipherVersion(99))
    ));
    assert!(matches!(
        vm.is_migration_required("main"),
        Err(VaultError::UnsupportedCipherVersion(99))
    ));
}

#[test]
fn invalid_names_are_rejected() {
    let vm = manager();
    for name in ["", "with space", "main_recovery", "storage_encryption_key", DEVICE_ID_NAME] {
        assert!(
            matches!(vm.create_vault(name, SEED, "1"), Err(VaultError::InvalidFormat(_))),
            "name {name:?} should be rejected"
        );
    }
}

// ---------------------------------------------------------------------------
// Cipher versions and migration
// ---------------------------------------------------------------------------

#[test]
fn legacy_vault_opens_and_reports_migration() {
    let vm = manager();
    write_legacy_vault(vm.store().as_ref(), "old", SEED, "123456");

    assert_eq!(&*vm.open_vault("old", "123456", false).unwrap(), SEED);

    let status = vm.is_migration_required("old").unwrap();
    assert_eq!(status.current_version, 1);
    assert_eq!(status.latest_version, cipher::latest_version());
    assert!(status.required);
}

#[test]
fn new_vault_needs_no_migration() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    let status = vm.is_migration_required("main").unwrap();
    assert_eq!(status.vault, "main");
    assert!(!status.required);
}

#[test]
fn rekey_migrates_to_latest() {
    let vm = manager();
    write_legacy_vault(vm.store().as_ref(), "old", SEED, "123456");

    vm.re_key_vault("old", "123456", "999999").unwrap();

    assert!(!vm.is_migration_required("old").unwrap().required);
    assert_eq!(&*vm.open_vault("old", "999999", false).unwrap(), SEED);
}

// ---------------------------------------------------------------------------
// Rekey
// ---------------------------------------------------------------------------

#[test]
fn rekey_switches_keys_and_cleans_up() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    vm.re_key_vault("main", "123456", "999999").unwrap();

    assert_eq!(&*vm.open_vault("main", "999999", false).unwrap(), SEED);
    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::InvalidKey)
    ));
    assert!(!vm.store().exists(&recovery_name("main")));
}

#[test]
fn rekey_with_wrong_old_key_changes_nothing() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();
    let before = vm.store().get("main").unwrap();

    assert!(matches!(
        vm.re_key_vault("main", "000000", "999999"),
        Err(VaultError::InvalidKey)
    ));
    assert_eq!(vm.store().get("main").unwrap(), before);
    assert!(!vm.store().exists(&recovery_name("main")));
}

#[test]
fn failed_primary_write_keeps_old_key_working() {
    let store = Arc::new(FlakyStore::default());
    let vm = VaultManager::new(store.clone());
    vm.create_vault("main", SEED, "123456").unwrap();

    store.fail_writes_to("main");
    assert!(matches!(
        vm.re_key_vault("main", "123456", "999999"),
        Err(VaultError::WriteFailed(_))
    ));
    store.heal();

    assert_eq!(&*vm.open_vault("main", "123456", false).unwrap(), SEED);
    assert!(matches!(
        vm.open_vault("main", "999999", false),
        Err(VaultError::InvalidKey)
    ));
}

#[test]
fn failed_recovery_write_aborts_before_touching_primary() {
    let store = Arc::new(FlakyStore::default());
    let vm = VaultManager::new(store.clone());
    vm.create_vault("main", SEED, "123456").unwrap();
    let before = store.get("main").unwrap();

    store.fail_writes_to(&recovery_name("main"));
    assert!(vm.re_key_vault("main", "123456", "999999").is_err());

    assert_eq!(store.get("main").unwrap(), before);
}

#[test]
fn interrupted_rekey_recovers_missing_primary() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    // State after a crash between saving the recovery copy and landing
    // the new primary.
    let old = vm.store().get("main").unwrap();
    vm.store().set(&recovery_name("main"), &old).unwrap();
    vm.store().delete("main").unwrap();

    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::NotFound(_))
    ));
    assert_eq!(&*vm.open_vault("main", "123456", true).unwrap(), SEED);

    // The primary was restored and the copy removed.
    assert!(vm.vault_exist("main"));
    assert!(!vm.store().exists(&recovery_name("main")));
    assert_eq!(&*vm.open_vault("main", "123456", false).unwrap(), SEED);
}

/// State after a crash between replacing the primary and removing the
/// recovery copy: primary under `new_key`, copy under the original key.
fn crash_after_primary_write(store: &dyn SecureKeyStore, name: &str, new_key: &str) {
    let old = store.get(name).unwrap();
    store.set(&recovery_name(name), &old).unwrap();
    let rekeyed = cipher::encrypt(SEED.as_bytes(), new_key.as_bytes()).unwrap();
    store
        .set(name, &VaultRecord::from_output(rekeyed).to_bytes().unwrap())
        .unwrap();
}

#[test]
fn interrupted_rekey_after_primary_write_opens_with_either_key() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();
    crash_after_primary_write(vm.store().as_ref(), "main", "999999");
    let primary = vm.store().get("main").unwrap();

    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::InvalidKey)
    ));
    assert_eq!(&*vm.open_vault("main", "123456", true).unwrap(), SEED);
    assert_eq!(&*vm.open_vault("main", "999999", false).unwrap(), SEED);
    assert!(matches!(
        vm.open_vault("main", "000000", true),
        Err(VaultError::InvalidKey)
    ));

    // Opening never rewrites an existing primary.
    assert_eq!(vm.store().get("main").unwrap(), primary);
}

#[test]
fn retried_rekey_resumes_from_recovery_copy() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();
    crash_after_primary_write(vm.store().as_ref(), "main", "999999");

    vm.re_key_vault("main", "123456", "999999").unwrap();

    assert_eq!(&*vm.open_vault("main", "999999", false).unwrap(), SEED);
    assert!(!vm.store().exists(&recovery_name("main")));
}

#[test]
fn failed_resumed_rekey_keeps_recovery_copy() {
    let store = Arc::new(FlakyStore::default());
    let vm = VaultManager::new(store.clone());
    vm.create_vault("main", SEED, "123456").unwrap();
    crash_after_primary_write(&*store, "main", "999999");

    store.fail_writes_to("main");
    assert!(matches!(
        vm.re_key_vault("main", "123456", "555555"),
        Err(VaultError::WriteFailed(_))
    ));
    store.heal();

    assert_eq!(&*vm.open_vault("main", "123456", true).unwrap(), SEED);
}

#[test]
fn damaged_primary_opens_from_recovery() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    let old = vm.store().get("main").unwrap();
    vm.store().set(&recovery_name("main"), &old).unwrap();

    let mut record = VaultRecord::from_bytes(&old).unwrap();
    record.ciphertext[0] ^= 0x01;
    vm.store().set("main", &record.to_bytes().unwrap()).unwrap();

    assert!(matches!(
        vm.open_vault("main", "123456", false),
        Err(VaultError::InvalidKey)
    ));
    assert_eq!(&*vm.open_vault("main", "123456", true).unwrap(), SEED);
}

#[test]
fn corrupt_primary_opens_from_recovery_without_rewrite() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();

    let old = vm.store().get("main").unwrap();
    vm.store().set(&recovery_name("main"), &old).unwrap();
    vm.store().set("main", b"torn").unwrap();

    assert_eq!(&*vm.open_vault("main", "123456", true).unwrap(), SEED);
    assert_eq!(vm.store().get("main").unwrap(), b"torn");
}

#[test]
fn stale_recovery_copy_is_replaced_on_rekey() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();
    vm.store().set(&recovery_name("main"), b"stale").unwrap();

    vm.re_key_vault("main", "123456", "999999").unwrap();

    assert!(!vm.store().exists(&recovery_name("main")));
    assert_eq!(&*vm.open_vault("main", "999999", true).unwrap(), SEED);
}

#[test]
fn batch_rekey_is_independent_per_vault() {
    let store = Arc::new(FlakyStore::default());
    let vm = VaultManager::new(store.clone());
    vm.create_vault("a", "seed a", "123456").unwrap();
    vm.create_vault("b", "seed b", "123456").unwrap();
    vm.create_vault("c", "seed c", "123456").unwrap();

    store.fail_writes_to("b");
    let report = vm.re_key_batch_vaults(&["a", "b", "c"], "123456", "999999");
    store.heal();

    assert!(!report.is_success());
    assert_eq!(report.succeeded(), vec!["a", "c"]);
    let failed = report.failed();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0, "b");

    assert_eq!(&*vm.open_vault("a", "999999", false).unwrap(), "seed a");
    assert_eq!(&*vm.open_vault("b", "123456", false).unwrap(), "seed b");
    assert_eq!(&*vm.open_vault("c", "999999", false).unwrap(), "seed c");
}

// ---------------------------------------------------------------------------
// Storage key and purge
// ---------------------------------------------------------------------------

#[test]
fn storage_key_is_generated_once() {
    let vm = manager();
    let first = vm.get_storage_encryption_key().unwrap();
    let second = vm.get_storage_encryption_key().unwrap();

    assert_eq!(first.as_hex(), second.as_hex());
    assert_eq!(first.as_hex().len(), 128);
}

#[test]
fn purge_vault_removes_vault_and_recovery() {
    let vm = manager();
    vm.create_vault("main", SEED, "123456").unwrap();
    vm.store().set(&recovery_name("main"), b"copy").unwrap();

    vm.purge_vault("main").unwrap();

    assert!(!vm.vault_exist("main"));
    assert!(!vm.store().exists(&recovery_name("main")));
    assert!(matches!(vm.purge_vault("main"), Err(VaultError::NotFound(_))));
}

#[test]
fn purge_all_removes_everything_but_device_id() {
    let vm = manager();
    let device = DeviceIdentity::new(Arc::clone(vm.store()));
    let device_id = device.get_device_unique_id().unwrap();

    vm.create_vault("a", "seed a", "1").unwrap();
    vm.create_vault("b", "seed b", "2").unwrap();
    let old_key = vm.get_storage_encryption_key().unwrap();
    assert!(vm.is_storage_encryption_key_exist());

    vm.purge_all().unwrap();

    assert!(!vm.vault_exist("a"));
    assert!(!vm.vault_exist("b"));
    assert!(!vm.is_storage_encryption_key_exist());
    assert_eq!(device.get_device_unique_id().unwrap(), device_id);

    // A fresh storage key is issued after purge.
    let new_key = vm.get_storage_encryption_key().unwrap();
    assert_ne!(new_key.as_hex(), old_key.as_hex());
}

#[test]
fn vaults_persist_in_file_store() {
    let tmp = TempDir::new().unwrap();

    {
        let vm = VaultManager::new(Arc::new(FileStore::open(tmp.path()).unwrap()));
        vm.create_vault("main", SEED, "123456").unwrap();
    }

    let vm = VaultManager::new(Arc::new(FileStore::open(tmp.path()).unwrap()));
    assert_eq!(&*vm.open_vault("main", "123456", false).unwrap(), SEED);
}
