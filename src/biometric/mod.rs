//! Biometric-gated signing keys.
//!
//! A [`BiometricKeyProvider`] owns one asymmetric key whose use requires a
//! live authentication from the user.  The host supplies that
//! authentication through an [`AuthContext`]; the provider never shows UI
//! itself.
//!
//! Key lifecycle:
//!
//! ```text
//! Absent ──generate_key──▶ Generated ──first signature──▶ Valid
//!                              │                            │
//!                              └──── enrollment changes ────┴──▶ Invalidated
//! Invalidated ──delete_invalid_key──▶ Absent
//! ```
//!
//! An invalidated key is never replaced automatically.

pub mod backoff;
pub mod none;
pub mod software;

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::errors::Result;

pub use backoff::{retry_sign, BackoffPolicy, Sleeper, ThreadSleeper};
pub use none::NoBiometrics;
pub use software::{FixedEnrollment, SoftwareKeyProvider, BIOMETRIC_KEY_NAME};

/// How a single authentication prompt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authenticated,
    /// The user was not recognized.
    Failed,
    /// The user dismissed the prompt.
    Cancelled,
    TimedOut,
}

/// Host-side authentication prompt (biometric or device passcode).
///
/// `authenticate` blocks until the user has responded.
pub trait AuthContext {
    fn authenticate(&mut self, reason: &str) -> AuthOutcome;
}

/// Reports the current biometric enrollment.
///
/// The token changes whenever enrolled biometrics change; a key created
/// under a different token is invalid.
pub trait BiometricEnrollment: Send + Sync {
    fn enrollment_token(&self) -> Result<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricKeyState {
    Absent,
    /// Created but not yet used for a successful signature.
    Generated,
    Valid,
    Invalidated,
}

/// A random challenge and its signature by the biometric key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedChallenge {
    pub challenge: Vec<u8>,
    pub signature: Vec<u8>,
    pub public_key: [u8; 32],
}

impl SignedChallenge {
    /// Check the signature against the embedded public key.
    pub fn verify(&self) -> bool {
        let Ok(key) = VerifyingKey::from_bytes(&self.public_key) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&self.signature) else {
            return false;
        };
        key.verify(&self.challenge, &signature).is_ok()
    }
}

/// A biometric-gated signing key.
pub trait BiometricKeyProvider {
    fn key_state(&self) -> Result<BiometricKeyState>;

    /// Whether a usable key exists.
    fn is_key_ready(&self) -> bool {
        matches!(
            self.key_state(),
            Ok(BiometricKeyState::Generated | BiometricKeyState::Valid)
        )
    }

    /// Create the key.  Fails if any key, valid or not, already exists.
    fn generate_key(&self) -> Result<()>;

    /// Remove the current key so a new one can be generated.
    fn delete_invalid_key(&self) -> Result<()>;

    /// Authenticate once through `ctx` and sign a fresh challenge.
    fn sign_challenge(&self, ctx: &mut dyn AuthContext) -> Result<SignedChallenge>;

    /// [`sign_challenge`](Self::sign_challenge), retrying failed
    /// authentications according to `policy`.
    fn sign_challenge_with_backoff(
        &self,
        ctx: &mut dyn AuthContext,
        policy: &BackoffPolicy,
    ) -> Result<SignedChallenge> {
        self.sign_challenge_with_sleeper(ctx, policy, &ThreadSleeper)
    }

    /// Same as [`sign_challenge_with_backoff`](Self::sign_challenge_with_backoff),
    /// waiting between attempts through `sleeper`.
    fn sign_challenge_with_sleeper(
        &self,
        ctx: &mut dyn AuthContext,
        policy: &BackoffPolicy,
        sleeper: &dyn Sleeper,
    ) -> Result<SignedChallenge> {
        retry_sign(policy, sleeper, || self.sign_challenge(&mut *ctx))
    }
}
