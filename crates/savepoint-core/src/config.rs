//! Engine configuration.
//!
//! All fields have sensible defaults so a config can be deserialized from a
//! partial document. The encryption key is held as hex and only decoded when
//! the engine is constructed; it is redacted from debug output.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default auto-sync interval in seconds.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 300;

/// Default bound on any single remote call.
pub const DEFAULT_REMOTE_TIMEOUT_SECS: u64 = 30;

/// Default per-user live save count limit.
pub const DEFAULT_MAX_SAVES_PER_USER: usize = 100;

/// Engine configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-user live save count limit
    pub max_saves_per_user: usize,
    /// 32-byte AES-256-GCM key as 64 hex characters; required only when an
    /// encrypting slot is used
    pub encryption_key: Option<String>,
    /// Auto-sync scheduler interval in seconds
    pub sync_interval_secs: u64,
    /// Timeout applied to every remote fetch/put
    pub remote_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_saves_per_user: DEFAULT_MAX_SAVES_PER_USER,
            encryption_key: None,
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("EngineConfig")
            .field("max_saves_per_user", &self.max_saves_per_user)
            .field(
                "encryption_key",
                &self.encryption_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sync_interval_secs", &self.sync_interval_secs)
            .field("remote_timeout_secs", &self.remote_timeout_secs)
            .finish()
    }
}

impl EngineConfig {
    /// Decode the configured encryption key into raw bytes.
    ///
    /// Returns `Ok(None)` when no key is configured.
    pub fn encryption_key_bytes(&self) -> Result<Option<[u8; 32]>> {
        let Some(hex_key) = &self.encryption_key else {
            return Ok(None);
        };

        let bytes = hex::decode(hex_key.trim())
            .map_err(|error| Error::InvalidInput(format!("encryption key is not hex: {error}")))?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| {
            Error::InvalidInput("encryption key must be 32 bytes (64 hex characters)".to_string())
        })?;

        Ok(Some(key))
    }
}
