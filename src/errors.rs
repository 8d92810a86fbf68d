use thiserror::Error;

/// All errors that can occur in SeedVault.
#[derive(Debug, Error)]
pub enum VaultError {
    // --- Vault lifecycle errors ---
    #[error("Vault '{0}' not found")]
    NotFound(String),

    #[error("Vault '{0}' already exists")]
    AlreadyExists(String),

    #[error("Invalid key — the vault cannot be opened with the provided key")]
    InvalidKey,

    #[error("Decryption failed — vault data is corrupted")]
    DecryptionFailed,

    #[error("Unsupported cipher version {0}")]
    UnsupportedCipherVersion(u32),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    // --- Crypto errors ---
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    // --- Store errors ---
    #[error("Write to secure store failed: {0}")]
    WriteFailed(String),

    #[error("Secure store error: {0}")]
    StoreError(String),

    // --- Biometric errors ---
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("User cancelled authentication")]
    AuthenticationCancelled,

    #[error("Authentication failed {attempts} times — giving up")]
    AuthenticationExhausted { attempts: u32 },

    #[error("Biometric key was invalidated — delete and regenerate it")]
    KeyInvalidated,

    #[error("Biometric authentication not available: {0}")]
    BiometricUnavailable(String),

    // --- Config errors ---
    #[error("Config file error: {0}")]
    ConfigError(String),

    // --- IO errors ---
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // --- Serialization errors ---
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl VaultError {
    /// Whether the error says the stored data itself is unusable, as
    /// opposed to the caller supplying the wrong key.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            VaultError::DecryptionFailed
                | VaultError::InvalidFormat(_)
                | VaultError::UnsupportedCipherVersion(_)
        )
    }
}

/// Convenience type alias for SeedVault results.
pub type Result<T> = std::result::Result<T, VaultError>;
