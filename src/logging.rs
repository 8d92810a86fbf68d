//! Tracing subscriber setup for hosts embedding the vault.

use tracing_subscriber::EnvFilter;

/// Install a formatting subscriber filtered by `default_filter`.
///
/// `RUST_LOG`, when set, takes precedence.  Returns `false` if a global
/// subscriber was already installed, in which case nothing changes.
pub fn init(default_filter: &str) -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
