//! Stable per-device identifier.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::errors::{Result, VaultError};
use crate::store::SecureKeyStore;

/// Store entry holding the device unique id.
pub const DEVICE_ID_NAME: &str = "device_unique_id";

/// Issues the device unique id, a UUID v4 created on first request and
/// returned unchanged afterwards.  It survives `purge_all`.
pub struct DeviceIdentity {
    store: Arc<dyn SecureKeyStore>,
}

impl DeviceIdentity {
    pub fn new(store: Arc<dyn SecureKeyStore>) -> Self {
        Self { store }
    }

    pub fn get_device_unique_id(&self) -> Result<String> {
        match self.store.get(DEVICE_ID_NAME) {
            Ok(bytes) => parse_device_id(&bytes),
            Err(VaultError::NotFound(_)) => {
                let id = Uuid::new_v4().hyphenated().to_string();
                self.store.set(DEVICE_ID_NAME, id.as_bytes())?;
                info!("device unique id created");
                parse_device_id(&self.store.get(DEVICE_ID_NAME)?)
            }
            Err(e) => Err(e),
        }
    }
}

fn parse_device_id(bytes: &[u8]) -> Result<String> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(|id| id.hyphenated().to_string())
        .ok_or_else(|| VaultError::InvalidFormat("stored device id is not a UUID".into()))
}
