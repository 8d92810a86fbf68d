use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::biometric::BackoffPolicy;
use crate::errors::{Result, VaultError};
use crate::store::{FileStore, MemoryStore, SecureKeyStore};

/// Which [`SecureKeyStore`] backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    File,
    Memory,
    Keyring,
}

/// Host-level configuration, loaded from `.seedvault.toml`.
///
/// Every field has a sensible default so SeedVault works out-of-the-box
/// without any config file at all.  Cipher cost factors are fixed per
/// cipher version and are not configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Secure store backend (default: file).
    #[serde(default = "default_store_backend")]
    pub store_backend: StoreBackend,

    /// Directory (relative to the project dir) for the file backend.
    #[serde(default = "default_store_dir")]
    pub store_dir: String,

    /// Service name used by the keyring backend.
    #[serde(default = "default_keyring_service")]
    pub keyring_service: String,

    /// Total biometric attempts before giving up (default: 3).
    #[serde(default = "default_biometric_max_attempts")]
    pub biometric_max_attempts: u32,

    /// Delay after the first failed attempt, in milliseconds (default: 500).
    #[serde(default = "default_biometric_initial_delay_ms")]
    pub biometric_initial_delay_ms: u64,

    /// Growth factor between successive delays (default: 2).
    #[serde(default = "default_biometric_backoff_multiplier")]
    pub biometric_backoff_multiplier: u32,

    /// Upper bound on any single delay, in milliseconds (default: 8000).
    #[serde(default = "default_biometric_max_delay_ms")]
    pub biometric_max_delay_ms: u64,

    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

// ── Serde default helpers ────────────────────────────────────────────

fn default_store_backend() -> StoreBackend {
    StoreBackend::File
}

fn default_store_dir() -> String {
    ".seedvault".to_string()
}

fn default_keyring_service() -> String {
    "seedvault".to_string()
}

fn default_biometric_max_attempts() -> u32 {
    3
}

fn default_biometric_initial_delay_ms() -> u64 {
    500
}

fn default_biometric_backoff_multiplier() -> u32 {
    2
}

fn default_biometric_max_delay_ms() -> u64 {
    8_000
}

fn default_log_filter() -> String {
    "seedvault=info".to_string()
}

// ── Implementation ───────────────────────────────────────────────────

impl Default for Settings {
    fn default() -> Self {
        Self {
            store_backend: default_store_backend(),
            store_dir: default_store_dir(),
            keyring_service: default_keyring_service(),
            biometric_max_attempts: default_biometric_max_attempts(),
            biometric_initial_delay_ms: default_biometric_initial_delay_ms(),
            biometric_backoff_multiplier: default_biometric_backoff_multiplier(),
            biometric_max_delay_ms: default_biometric_max_delay_ms(),
            log_filter: default_log_filter(),
        }
    }
}

impl Settings {
    /// Name of the config file we look for in the project root.
    const FILE_NAME: &'static str = ".seedvault.toml";

    /// Load settings from `<project_dir>/.seedvault.toml`.
    ///
    /// If the file does not exist, sensible defaults are returned.
    /// If the file exists but cannot be parsed, an error is returned.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let config_path = project_dir.join(Self::FILE_NAME);

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path)?;

        let settings: Settings = toml::from_str(&contents).map_err(|e| {
            VaultError::ConfigError(format!("Failed to parse {}: {e}", config_path.display()))
        })?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject biometric settings whose retry delays would not strictly
    /// increase.
    pub fn validate(&self) -> Result<()> {
        if self.biometric_max_attempts == 0 {
            return Err(VaultError::ConfigError(
                "biometric_max_attempts must be at least 1".into(),
            ));
        }
        if self.biometric_initial_delay_ms == 0 {
            return Err(VaultError::ConfigError(
                "biometric_initial_delay_ms must be greater than 0".into(),
            ));
        }
        if self.biometric_backoff_multiplier < 2 {
            return Err(VaultError::ConfigError(
                "biometric_backoff_multiplier must be at least 2".into(),
            ));
        }

        // Delays are taken after failed attempts 1..max_attempts-1.
        let policy = self.backoff_policy();
        let last = self.biometric_max_attempts.saturating_sub(1);
        for attempt in 2..=last {
            if policy.delay_for(attempt) <= policy.delay_for(attempt - 1) {
                return Err(VaultError::ConfigError(format!(
                    "biometric_max_delay_ms = {} caps the retry delays before attempt {}; raise it or lower biometric_max_attempts",
                    self.biometric_max_delay_ms, attempt
                )));
            }
        }

        Ok(())
    }

    /// Full path of the file-backend store directory.
    ///
    /// Example: `project_dir/.seedvault`
    pub fn store_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.store_dir)
    }

    /// Convert the biometric settings into a backoff policy.
    pub fn backoff_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.biometric_max_attempts,
            initial_delay: Duration::from_millis(self.biometric_initial_delay_ms),
            multiplier: self.biometric_backoff_multiplier,
            max_delay: Duration::from_millis(self.biometric_max_delay_ms),
        }
    }

    /// Open the configured store backend.
    pub fn open_store(&self, project_dir: &Path) -> Result<Arc<dyn SecureKeyStore>> {
        match self.store_backend {
            StoreBackend::File => Ok(Arc::new(FileStore::open(&self.store_path(project_dir))?)),
            StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
            #[cfg(feature = "keyring-store")]
            StoreBackend::Keyring => Ok(Arc::new(crate::store::KeyringStore::new(
                &self.keyring_service,
            ))),
            #[cfg(not(feature = "keyring-store"))]
            StoreBackend::Keyring => Err(VaultError::ConfigError(
                "store_backend = \"keyring\" requires the keyring-store feature".into(),
            )),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
