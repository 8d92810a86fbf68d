pub mod biometric;
pub mod cipher;
pub mod config;
pub mod crypto;
pub mod device;
pub mod errors;
pub mod logging;
pub mod store;
pub mod vault;

pub use errors::{Result, VaultError};
pub use vault::VaultManager;
