//! Ed25519 key held in the secure store, gated by an [`AuthContext`].
//!
//! The key record is a JSON document under [`BIOMETRIC_KEY_NAME`]:
//!
//! ```text
//! {
//!   "secret_key":   "<hex, 32 bytes>",
//!   "enrollment":   "<token at generation time>",
//!   "verified":     false,
//!   "generated_at": "2026-01-01T00:00:00Z"
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ed25519_dalek::{Signer, SigningKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, Zeroizing};

use super::{AuthContext, AuthOutcome, BiometricEnrollment, BiometricKeyProvider, BiometricKeyState, SignedChallenge};
use crate::crypto::random_bytes;
use crate::errors::{Result, VaultError};
use crate::store::SecureKeyStore;

/// Store entry holding the biometric key record.
pub const BIOMETRIC_KEY_NAME: &str = "biometric_key";

/// Length of the random challenge signed on each authentication.
const CHALLENGE_LEN: usize = 32;

const AUTH_REASON: &str = "Authenticate to unlock your vault";

/// An enrollment that never changes.
#[derive(Debug, Clone)]
pub struct FixedEnrollment(pub String);

impl BiometricEnrollment for FixedEnrollment {
    fn enrollment_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Serialize, Deserialize)]
struct KeyRecord {
    #[serde(with = "hex::serde")]
    secret_key: Vec<u8>,
    enrollment: String,
    verified: bool,
    generated_at: DateTime<Utc>,
}

impl Drop for KeyRecord {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl KeyRecord {
    fn signing_key(&self) -> Result<SigningKey> {
        let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(
            self.secret_key
                .as_slice()
                .try_into()
                .map_err(|_| VaultError::InvalidFormat("biometric key has the wrong length".into()))?,
        );
        Ok(SigningKey::from_bytes(&bytes))
    }
}

/// Software implementation of [`BiometricKeyProvider`].
pub struct SoftwareKeyProvider {
    store: Arc<dyn SecureKeyStore>,
    enrollment: Arc<dyn BiometricEnrollment>,
}

impl SoftwareKeyProvider {
    pub fn new(store: Arc<dyn SecureKeyStore>, enrollment: Arc<dyn BiometricEnrollment>) -> Self {
        Self { store, enrollment }
    }

    fn load(&self) -> Result<Option<KeyRecord>> {
        let bytes = match self.store.get(BIOMETRIC_KEY_NAME) {
            Ok(bytes) => Zeroizing::new(bytes),
            Err(VaultError::NotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| VaultError::InvalidFormat(format!("biometric key record: {e}")))
    }

    fn save(&self, record: &KeyRecord) -> Result<()> {
        let json = Zeroizing::new(
            serde_json::to_vec(record)
                .map_err(|e| VaultError::SerializationError(format!("biometric key record: {e}")))?,
        );
        self.store.set(BIOMETRIC_KEY_NAME, &json)
    }

    fn is_current(&self, record: &KeyRecord) -> Result<bool> {
        Ok(record.enrollment == self.enrollment.enrollment_token()?)
    }
}

impl BiometricKeyProvider for SoftwareKeyProvider {
    fn key_state(&self) -> Result<BiometricKeyState> {
        let Some(record) = self.load()? else {
            return Ok(BiometricKeyState::Absent);
        };

        Ok(if !self.is_current(&record)? {
            BiometricKeyState::Invalidated
        } else if record.verified {
            BiometricKeyState::Valid
        } else {
            BiometricKeyState::Generated
        })
    }

    fn generate_key(&self) -> Result<()> {
        if let Some(record) = self.load()? {
            if !self.is_current(&record)? {
                return Err(VaultError::KeyInvalidated);
            }
            return Err(VaultError::AlreadyExists(BIOMETRIC_KEY_NAME.to_string()));
        }

        let record = KeyRecord {
            secret_key: random_bytes(32),
            enrollment: self.enrollment.enrollment_token()?,
            verified: false,
            generated_at: Utc::now(),
        };
        self.save(&record)?;

        info!("biometric key generated");
        Ok(())
    }

    fn delete_invalid_key(&self) -> Result<()> {
        match self.store.delete(BIOMETRIC_KEY_NAME) {
            Ok(()) => {
                info!("biometric key deleted");
                Ok(())
            }
            Err(VaultError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn sign_challenge(&self, ctx: &mut dyn AuthContext) -> Result<SignedChallenge> {
        let mut record = self
            .load()?
            .ok_or_else(|| VaultError::NotFound(BIOMETRIC_KEY_NAME.to_string()))?;

        if !self.is_current(&record)? {
            warn!("biometric enrollment changed since the key was generated");
            return Err(VaultError::KeyInvalidated);
        }

        match ctx.authenticate(AUTH_REASON) {
            AuthOutcome::Authenticated => {}
            AuthOutcome::Failed => {
                return Err(VaultError::AuthenticationFailed("user not recognized".into()))
            }
            AuthOutcome::TimedOut => {
                return Err(VaultError::AuthenticationFailed("prompt timed out".into()))
            }
            AuthOutcome::Cancelled => {
                debug!("biometric prompt cancelled");
                return Err(VaultError::AuthenticationCancelled);
            }
        }

        let signing_key = record.signing_key()?;
        let challenge = random_bytes(CHALLENGE_LEN);
        let signature = signing_key.sign(&challenge);

        if !record.verified {
            record.verified = true;
            self.save(&record)?;
            debug!(generated_at = %record.generated_at, "biometric key confirmed by first signature");
        }

        Ok(SignedChallenge {
            challenge,
            signature: signature.to_bytes().to_vec(),
            public_key: signing_key.verifying_key().to_bytes(),
        })
    }
}
