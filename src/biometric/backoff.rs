//! Bounded retry with exponential backoff for biometric signing.

use std::time::Duration;

use tracing::warn;

use crate::errors::{Result, VaultError};

/// How often, and how patiently, a failed authentication is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub multiplier: u32,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            multiplier: 2,
            max_delay: Duration::from_secs(8),
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Something that can block the caller for a while.
pub trait Sleeper {
    fn sleep(&self, delay: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, delay: Duration) {
        std::thread::sleep(delay);
    }
}

/// Run `op` until it succeeds, retrying only `AuthenticationFailed`.
///
/// Any other error, cancellation included, is returned at once without
/// waiting.  After `max_attempts` failures the result is
/// `AuthenticationExhausted`.
pub fn retry_sign<T, F>(policy: &BackoffPolicy, sleeper: &dyn Sleeper, mut op: F) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);

    for attempt in 1..=attempts {
        match op() {
            Ok(value) => return Ok(value),
            Err(VaultError::AuthenticationFailed(reason)) => {
                warn!(attempt, max_attempts = attempts, reason = %reason, "biometric authentication failed");
                if attempt < attempts {
                    sleeper.sleep(policy.delay_for(attempt));
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(VaultError::AuthenticationExhausted { attempts })
}
