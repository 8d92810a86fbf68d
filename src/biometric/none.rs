//! Provider for hosts without any biometric capability.

use super::{AuthContext, BiometricKeyProvider, BiometricKeyState, SignedChallenge};
use crate::errors::{Result, VaultError};

/// A provider that never has a key.  Every operation other than
/// [`key_state`](BiometricKeyProvider::key_state) fails with
/// `BiometricUnavailable`, so callers fall back to passcode entry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBiometrics;

fn unavailable() -> VaultError {
    VaultError::BiometricUnavailable("this device has no biometric key support".into())
}

impl BiometricKeyProvider for NoBiometrics {
    fn key_state(&self) -> Result<BiometricKeyState> {
        Ok(BiometricKeyState::Absent)
    }

    fn generate_key(&self) -> Result<()> {
        Err(unavailable())
    }

    fn delete_invalid_key(&self) -> Result<()> {
        Err(unavailable())
    }

    fn sign_challenge(&self, _ctx: &mut dyn AuthContext) -> Result<SignedChallenge> {
        Err(unavailable())
    }
}
