//! Remote save store contract.
//!
//! The engine consumes exactly one collaborator: a remote store holding the
//! latest cloud copy per (user, game, slot) lineage. Implementations carry
//! their own payload ceiling, which is typically smaller than any local slot
//! limit.

pub mod http;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::models::SaveRecord;

pub use http::HttpCloudStore;

/// Default remote payload ceiling.
pub const DEFAULT_REMOTE_MAX_PAYLOAD_BYTES: usize = 512 * 1024;

/// Limits imposed by the remote platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteLimits {
    /// Largest payload the remote store accepts
    pub max_payload_bytes: usize,
}

impl Default for RemoteLimits {
    fn default() -> Self {
        Self {
            max_payload_bytes: DEFAULT_REMOTE_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Remote save store operations.
///
/// `put` must reject payloads above the remote ceiling with
/// [`Error::SizeExceeded`] instead of truncating.
#[async_trait]
pub trait CloudSaveStore: Send + Sync {
    /// Fetch the cloud copy for a lineage; `None` means no remote copy yet.
    async fn fetch(
        &self,
        user_id: &str,
        game_id: &str,
        slot_name: &str,
    ) -> Result<Option<SaveRecord>>;

    /// Upload a record, replacing any previous cloud copy of its lineage.
    async fn put(&self, record: &SaveRecord) -> Result<()>;
}

/// In-memory cloud store used in tests and local setups.
#[derive(Debug, Default)]
pub struct MemoryCloudStore {
    limits: RemoteLimits,
    records: Mutex<HashMap<(String, String, String), SaveRecord>>,
}

impl MemoryCloudStore {
    #[must_use]
    pub fn new(limits: RemoteLimits) -> Self {
        Self {
            limits,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Place a record directly into the store, bypassing the size check.
    ///
    /// Test helper for staging a pre-existing cloud copy.
    pub fn seed(&self, record: SaveRecord) {
        let key = lineage_key(&record);
        self.lock().insert(key, record);
    }

    /// Snapshot the stored cloud copy for a lineage.
    #[must_use]
    pub fn stored(&self, user_id: &str, game_id: &str, slot_name: &str) -> Option<SaveRecord> {
        self.lock()
            .get(&(
                user_id.to_string(),
                game_id.to_string(),
                slot_name.to_string(),
            ))
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String, String), SaveRecord>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl CloudSaveStore for MemoryCloudStore {
    async fn fetch(
        &self,
        user_id: &str,
        game_id: &str,
        slot_name: &str,
    ) -> Result<Option<SaveRecord>> {
        Ok(self.stored(user_id, game_id, slot_name))
    }

    async fn put(&self, record: &SaveRecord) -> Result<()> {
        if record.payload.len() > self.limits.max_payload_bytes {
            return Err(Error::SizeExceeded {
                size_bytes: record.payload.len(),
                limit_bytes: self.limits.max_payload_bytes,
            });
        }

        let key = lineage_key(record);
        self.lock().insert(key, record.clone());
        Ok(())
    }
}

fn lineage_key(record: &SaveRecord) -> (String, String, String) {
    (
        record.user_id.clone(),
        record.game_id.clone(),
        record.slot_name.clone(),
    )
}
