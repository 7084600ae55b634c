//! The save engine: owned state and the public operation surface.
//!
//! All engine state (save store, sync queue, conflict set) lives behind a
//! single async mutex, so every public operation is one atomic step against
//! shared state. Remote I/O never happens while the state lock is held; a
//! separate in-flight id set makes sync exclusive per save id so a
//! background tick and a foreground call cannot race on the same record.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::cloud::CloudSaveStore;
use crate::codec::Codec;
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::events::{EngineEvent, EventBus};
use crate::export::{ExportDocument, WireSave};
use crate::models::{
    ConflictRecord, ResolutionStrategy, SaveId, SaveMetadata, SaveOptions, SaveRecord,
    SlotRegistry,
};
use crate::sync::{classify, merge_records, SyncDecision, SyncOutcome};

/// Aggregate counters over the engine's current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub total_saves: usize,
    pub total_payload_bytes: usize,
    pub pending_sync: usize,
    pub unresolved_conflicts: usize,
    pub saves_per_slot: BTreeMap<String, usize>,
}

/// Serializable snapshot of the engine's persistent state.
///
/// Unlike the export document this keeps record ids verbatim, so callers can
/// persist and restore the store across process restarts. Pending conflicts
/// are intentionally not persisted; they are re-detected on the next sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub saves: Vec<SaveRecord>,
    pub sync_queue: Vec<SaveId>,
}

#[derive(Debug, Default)]
struct EngineState {
    saves: HashMap<SaveId, SaveRecord>,
    sync_queue: HashSet<SaveId>,
    conflicts: HashMap<SaveId, ConflictRecord>,
}

/// Cloud save synchronization engine.
pub struct SaveEngine {
    config: EngineConfig,
    slots: SlotRegistry,
    codec: Codec,
    cloud: Arc<dyn CloudSaveStore>,
    state: Mutex<EngineState>,
    in_flight: StdMutex<HashSet<SaveId>>,
    events: EventBus,
}

impl SaveEngine {
    /// Build an engine over the given slot catalog and cloud collaborator.
    ///
    /// Fails when the configured encryption key is malformed.
    pub fn new(
        config: EngineConfig,
        slots: SlotRegistry,
        cloud: Arc<dyn CloudSaveStore>,
    ) -> Result<Self> {
        let codec = Codec::new(config.encryption_key_bytes()?);
        Ok(Self {
            config,
            slots,
            codec,
            cloud,
            state: Mutex::new(EngineState::default()),
            in_flight: StdMutex::new(HashSet::new()),
            events: EventBus::new(),
        })
    }

    /// The slot catalog this engine enforces.
    #[must_use]
    pub const fn slots(&self) -> &SlotRegistry {
        &self.slots
    }

    /// The configured auto-sync interval.
    #[must_use]
    pub const fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.config.sync_interval_secs)
    }

    /// Subscribe to engine event notifications.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Create a new save: encode the value, assign the next version in the
    /// (user, game, slot) lineage, enqueue for sync when the slot syncs, and
    /// prune versions beyond the slot's retention window.
    pub async fn create_save<T: Serialize>(
        &self,
        user_id: &str,
        game_id: &str,
        slot_name: &str,
        value: &T,
        options: SaveOptions,
    ) -> Result<SaveRecord> {
        let slot = self
            .slots
            .get(slot_name)
            .ok_or_else(|| Error::SlotNotFound(slot_name.to_string()))?
            .clone();

        // One lock for quota check, version assignment, insert, and pruning:
        // concurrent creates for the same lineage must not compute the same
        // next version twice.
        let mut state = self.state.lock().await;

        let live_count = state
            .saves
            .values()
            .filter(|record| record.user_id == user_id)
            .count();
        if live_count >= self.config.max_saves_per_user {
            return Err(Error::QuotaExceeded {
                user_id: user_id.to_string(),
                count: live_count,
                limit: self.config.max_saves_per_user,
            });
        }

        let encoded = self.codec.encode(value, slot.encryption_enabled)?;
        if encoded.bytes.len() > slot.max_size_bytes {
            return Err(Error::SizeExceeded {
                size_bytes: encoded.bytes.len(),
                limit_bytes: slot.max_size_bytes,
            });
        }

        let version = 1 + state
            .saves
            .values()
            .filter(|record| record.in_lineage(user_id, game_id, slot_name))
            .map(|record| record.metadata.version)
            .max()
            .unwrap_or(0);

        let record = SaveRecord {
            id: SaveId::new(),
            user_id: user_id.to_string(),
            game_id: game_id.to_string(),
            slot_name: slot_name.to_string(),
            metadata: SaveMetadata {
                version,
                timestamp: Utc::now(),
                game_version: options.game_version,
                platform: options.platform,
                checksum: encoded.checksum,
                compressed: encoded.compressed,
                encrypted: encoded.encrypted,
                size_bytes: encoded.bytes.len(),
            },
            payload: encoded.bytes,
            tags: options.tags,
            description: options.description,
            screenshot: options.screenshot,
            play_time_seconds: options.play_time_seconds,
            level: options.level,
            progress_percent: options.progress_percent,
        };

        state.saves.insert(record.id, record.clone());
        if slot.sync_with_cloud {
            state.sync_queue.insert(record.id);
        }

        prune_lineage(
            &mut state,
            user_id,
            game_id,
            slot_name,
            slot.versions_to_keep,
        );
        drop(state);

        tracing::debug!(
            save_id = %record.id,
            slot = slot_name,
            version,
            size_bytes = record.metadata.size_bytes,
            "save created"
        );
        self.events.publish(EngineEvent::SaveCreated {
            save_id: record.id,
            user_id: user_id.to_string(),
            slot_name: slot_name.to_string(),
            version,
        });

        Ok(record)
    }

    /// Decode a stored save back into its domain value.
    pub async fn load_save<T: DeserializeOwned>(&self, save_id: &SaveId) -> Result<T> {
        let state = self.state.lock().await;
        let record = state
            .saves
            .get(save_id)
            .ok_or_else(|| Error::SaveNotFound(save_id.to_string()))?;
        self.codec.decode(&record.payload, &record.metadata)
    }

    /// Fetch a stored record by id.
    pub async fn get_save(&self, save_id: &SaveId) -> Result<SaveRecord> {
        let state = self.state.lock().await;
        state
            .saves
            .get(save_id)
            .cloned()
            .ok_or_else(|| Error::SaveNotFound(save_id.to_string()))
    }

    /// List a user's saves, optionally filtered by game, newest first.
    pub async fn list_saves(&self, user_id: &str, game_id: Option<&str>) -> Vec<SaveRecord> {
        let state = self.state.lock().await;
        let mut records: Vec<SaveRecord> = state
            .saves
            .values()
            .filter(|record| {
                record.user_id == user_id
                    && game_id.map_or(true, |game| record.game_id == game)
            })
            .cloned()
            .collect();
        records.sort_by(|a, b| b.metadata.timestamp.cmp(&a.metadata.timestamp));
        records
    }

    /// Delete a save and its queue/conflict entries. Idempotent: returns
    /// `false` when the save was already gone.
    pub async fn delete_save(&self, save_id: &SaveId) -> bool {
        let removed = {
            let mut state = self.state.lock().await;
            state.sync_queue.remove(save_id);
            state.conflicts.remove(save_id);
            state.saves.remove(save_id).is_some()
        };

        if removed {
            tracing::debug!(%save_id, "save deleted");
            self.events.publish(EngineEvent::SaveDeleted { save_id: *save_id });
        }
        removed
    }

    /// Reconcile a save against its cloud counterpart.
    ///
    /// Exclusive per save id: a second concurrent call (including the
    /// scheduler's) gets a transient [`Error::Sync`] and the id stays queued.
    pub async fn sync_with_cloud(
        &self,
        save_id: &SaveId,
        force_upload: bool,
    ) -> Result<SyncOutcome> {
        let _guard = self.begin_sync(*save_id)?;

        let local = {
            let state = self.state.lock().await;
            if state.conflicts.contains_key(save_id) {
                return Err(Error::ConflictUnresolved(save_id.to_string()));
            }
            state
                .saves
                .get(save_id)
                .cloned()
                .ok_or_else(|| Error::SaveNotFound(save_id.to_string()))?
        };

        let remote = self.remote_fetch(&local).await?;

        let outcome = match classify(&local, remote.as_ref(), force_upload) {
            SyncDecision::Upload => {
                self.remote_put(&local).await?;
                let mut state = self.state.lock().await;
                state.sync_queue.remove(save_id);
                SyncOutcome::Uploaded
            }
            SyncDecision::Download => {
                let mut incoming = remote.ok_or_else(|| {
                    Error::Sync("remote copy disappeared during sync".to_string())
                })?;
                incoming.id = *save_id;

                let mut state = self.state.lock().await;
                if state.saves.contains_key(save_id) {
                    state.saves.insert(*save_id, incoming);
                    state.sync_queue.remove(save_id);
                }
                SyncOutcome::Downloaded
            }
            SyncDecision::Conflict => {
                let cloud_copy = remote.ok_or_else(|| {
                    Error::Sync("remote copy disappeared during sync".to_string())
                })?;
                let conflict = ConflictRecord::timestamp_conflict(local, cloud_copy);

                let mut state = self.state.lock().await;
                if state.saves.contains_key(save_id) {
                    state.conflicts.insert(*save_id, conflict);
                }
                // The id stays queued until the conflict is resolved.
                SyncOutcome::Conflict
            }
            SyncDecision::NoChange => {
                let mut state = self.state.lock().await;
                state.sync_queue.remove(save_id);
                SyncOutcome::NoChange
            }
        };

        if outcome == SyncOutcome::Conflict {
            tracing::warn!(%save_id, "sync conflict detected, manual resolution required");
            self.events
                .publish(EngineEvent::ConflictDetected { save_id: *save_id });
        } else {
            tracing::debug!(%save_id, %outcome, "sync finished");
            self.events.publish(EngineEvent::SyncCompleted {
                save_id: *save_id,
                outcome,
            });
        }

        Ok(outcome)
    }

    /// Resolve a pending conflict and re-enqueue the record when its slot
    /// syncs. Returns the record that won.
    pub async fn resolve_conflict(
        &self,
        save_id: &SaveId,
        strategy: ResolutionStrategy,
    ) -> Result<SaveRecord> {
        let _guard = self.begin_sync(*save_id)?;

        let conflict = {
            let state = self.state.lock().await;
            state.conflicts.get(save_id).cloned()
        }
        .ok_or_else(|| Error::ConflictNotFound(save_id.to_string()))?;

        let resolved = match strategy {
            ResolutionStrategy::UseLocal => {
                let record = conflict.local.clone();
                self.remote_put(&record).await?;
                record
            }
            ResolutionStrategy::UseCloud => {
                let mut record = conflict.cloud.clone();
                record.id = *save_id;
                record
            }
            ResolutionStrategy::Merge => {
                let merged = merge_records(&conflict.local, &conflict.cloud, Utc::now());
                self.remote_put(&merged).await?;
                merged
            }
        };

        let slot_syncs = self
            .slots
            .get(&resolved.slot_name)
            .is_some_and(|slot| slot.sync_with_cloud);

        {
            let mut state = self.state.lock().await;
            state.conflicts.remove(save_id);
            state.saves.insert(*save_id, resolved.clone());
            if slot_syncs {
                state.sync_queue.insert(*save_id);
            }
        }

        tracing::info!(%save_id, %strategy, "conflict resolved");
        self.events.publish(EngineEvent::ConflictResolved {
            save_id: *save_id,
            strategy,
        });

        Ok(resolved)
    }

    /// Pending conflicts for a user.
    pub async fn pending_conflicts(&self, user_id: &str) -> Vec<ConflictRecord> {
        let state = self.state.lock().await;
        state
            .conflicts
            .values()
            .filter(|conflict| conflict.local.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Snapshot of the ids currently awaiting a sync attempt.
    pub async fn pending_sync(&self) -> Vec<SaveId> {
        let state = self.state.lock().await;
        state.sync_queue.iter().copied().collect()
    }

    /// Aggregate counters over the current state.
    pub async fn stats(&self) -> EngineStats {
        let state = self.state.lock().await;
        let mut saves_per_slot: BTreeMap<String, usize> = BTreeMap::new();
        let mut total_payload_bytes = 0;
        for record in state.saves.values() {
            *saves_per_slot.entry(record.slot_name.clone()).or_default() += 1;
            total_payload_bytes += record.payload.len();
        }

        EngineStats {
            total_saves: state.saves.len(),
            total_payload_bytes,
            pending_sync: state.sync_queue.len(),
            unresolved_conflicts: state.conflicts.len(),
            saves_per_slot,
        }
    }

    /// Export a user's saves, optionally filtered by game, as a portable
    /// document.
    pub async fn export_saves(&self, user_id: &str, game_id: Option<&str>) -> ExportDocument {
        let records = self.list_saves(user_id, game_id).await;
        ExportDocument {
            export_date: Utc::now(),
            user_id: user_id.to_string(),
            game_id: game_id.map(ToString::to_string),
            saves: records.iter().map(WireSave::from_record).collect(),
        }
    }

    /// Import saves from an export document. Each record gets a fresh id;
    /// carried versions and metadata are kept as-is. Records for unknown
    /// slots, and records whose (user, game, slot) lineage already holds the
    /// carried version, are skipped. Touched lineages are pruned to their
    /// slot's retention window afterwards. Returns how many records were
    /// inserted, counted before pruning.
    ///
    /// A malformed record or a per-user quota violation fails the whole
    /// import before anything is stored.
    pub async fn import_saves(&self, document: &ExportDocument) -> Result<usize> {
        let mut incoming = Vec::with_capacity(document.saves.len());
        for wire in &document.saves {
            if self.slots.get(&wire.slot_name).is_none() {
                tracing::warn!(slot = %wire.slot_name, "skipping import for unknown slot");
                continue;
            }
            incoming.push(wire.clone().into_record_with_fresh_id()?);
        }

        let mut state = self.state.lock().await;

        // Versions identify causal order within a lineage; a carried version
        // that is already live (in the store or earlier in this document)
        // must not be inserted a second time.
        let mut accepted: Vec<SaveRecord> = Vec::with_capacity(incoming.len());
        for record in incoming {
            let version_taken = state.saves.values().chain(accepted.iter()).any(|existing| {
                existing.in_lineage(&record.user_id, &record.game_id, &record.slot_name)
                    && existing.metadata.version == record.metadata.version
            });
            if version_taken {
                tracing::warn!(
                    slot = %record.slot_name,
                    version = record.metadata.version,
                    "skipping import, version already present in lineage"
                );
                continue;
            }
            accepted.push(record);
        }

        let mut additions_per_user: HashMap<&str, usize> = HashMap::new();
        for record in &accepted {
            *additions_per_user
                .entry(record.user_id.as_str())
                .or_default() += 1;
        }
        for (user_id, additions) in additions_per_user {
            let live = state
                .saves
                .values()
                .filter(|record| record.user_id == user_id)
                .count();
            if live + additions > self.config.max_saves_per_user {
                return Err(Error::QuotaExceeded {
                    user_id: user_id.to_string(),
                    count: live + additions,
                    limit: self.config.max_saves_per_user,
                });
            }
        }

        let imported = accepted.len();
        let mut lineages = HashSet::new();
        for record in accepted {
            lineages.insert((
                record.user_id.clone(),
                record.game_id.clone(),
                record.slot_name.clone(),
            ));
            state.saves.insert(record.id, record);
        }

        for (user_id, game_id, slot_name) in lineages {
            if let Some(slot) = self.slots.get(&slot_name) {
                prune_lineage(
                    &mut state,
                    &user_id,
                    &game_id,
                    &slot_name,
                    slot.versions_to_keep,
                );
            }
        }

        Ok(imported)
    }

    /// Snapshot the persistent state (saves and queue) for storage.
    pub async fn snapshot(&self) -> EngineSnapshot {
        let state = self.state.lock().await;
        let mut saves: Vec<SaveRecord> = state.saves.values().cloned().collect();
        saves.sort_by_key(|record| record.id.as_str());
        let mut sync_queue: Vec<SaveId> = state.sync_queue.iter().copied().collect();
        sync_queue.sort_by_key(SaveId::as_str);
        EngineSnapshot { saves, sync_queue }
    }

    /// Replace the persistent state from a snapshot, trusting its ids.
    /// Queue entries without a matching save are dropped.
    pub async fn restore(&self, snapshot: EngineSnapshot) {
        let saves: HashMap<SaveId, SaveRecord> = snapshot
            .saves
            .into_iter()
            .map(|record| (record.id, record))
            .collect();
        let sync_queue: HashSet<SaveId> = snapshot
            .sync_queue
            .into_iter()
            .filter(|id| saves.contains_key(id))
            .collect();

        let mut state = self.state.lock().await;
        state.saves = saves;
        state.sync_queue = sync_queue;
        state.conflicts.clear();
    }

    fn begin_sync(&self, save_id: SaveId) -> Result<InFlightGuard<'_>> {
        let mut in_flight = lock_in_flight(&self.in_flight);
        if !in_flight.insert(save_id) {
            return Err(Error::Sync(format!(
                "sync already in progress for {save_id}"
            )));
        }
        Ok(InFlightGuard {
            set: &self.in_flight,
            save_id,
        })
    }

    async fn remote_fetch(&self, record: &SaveRecord) -> Result<Option<SaveRecord>> {
        let deadline = Duration::from_secs(self.config.remote_timeout_secs);
        tokio::time::timeout(
            deadline,
            self.cloud
                .fetch(&record.user_id, &record.game_id, &record.slot_name),
        )
        .await
        .map_err(|_| {
            Error::Sync(format!(
                "remote fetch timed out after {}s",
                self.config.remote_timeout_secs
            ))
        })?
    }

    async fn remote_put(&self, record: &SaveRecord) -> Result<()> {
        let deadline = Duration::from_secs(self.config.remote_timeout_secs);
        tokio::time::timeout(deadline, self.cloud.put(record))
            .await
            .map_err(|_| {
                Error::Sync(format!(
                    "remote upload timed out after {}s",
                    self.config.remote_timeout_secs
                ))
            })?
    }
}

/// Keep only the `versions_to_keep` highest versions of a lineage; older
/// records are deleted, never renumbered.
fn prune_lineage(
    state: &mut EngineState,
    user_id: &str,
    game_id: &str,
    slot_name: &str,
    versions_to_keep: usize,
) {
    let mut lineage: Vec<(u64, SaveId)> = state
        .saves
        .values()
        .filter(|record| record.in_lineage(user_id, game_id, slot_name))
        .map(|record| (record.metadata.version, record.id))
        .collect();
    lineage.sort_by(|a, b| b.0.cmp(&a.0));

    for (version, save_id) in lineage.into_iter().skip(versions_to_keep) {
        state.saves.remove(&save_id);
        state.sync_queue.remove(&save_id);
        state.conflicts.remove(&save_id);
        tracing::debug!(%save_id, version, slot = slot_name, "pruned save beyond retention window");
    }
}

fn lock_in_flight(
    set: &StdMutex<HashSet<SaveId>>,
) -> MutexGuard<'_, HashSet<SaveId>> {
    match set.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct InFlightGuard<'a> {
    set: &'a StdMutex<HashSet<SaveId>>,
    save_id: SaveId,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        lock_in_flight(self.set).remove(&self.save_id);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};

    use super::*;
    use crate::cloud::{MemoryCloudStore, RemoteLimits};
    use crate::codec::checksum_hex;
    use crate::models::SlotDefinition;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Progress {
        level: u32,
        checkpoint: String,
    }

    fn progress(level: u32) -> Progress {
        Progress {
            level,
            checkpoint: format!("checkpoint-{level}"),
        }
    }

    fn engine_with(cloud: Arc<MemoryCloudStore>, config: EngineConfig) -> SaveEngine {
        SaveEngine::new(config, SlotRegistry::with_defaults(), cloud).unwrap()
    }

    fn engine() -> (SaveEngine, Arc<MemoryCloudStore>) {
        let cloud = Arc::new(MemoryCloudStore::default());
        let config = EngineConfig {
            encryption_key: Some("11".repeat(32)),
            ..Default::default()
        };
        (engine_with(cloud.clone(), config), cloud)
    }

    /// A cloud-side record that decodes cleanly after download.
    fn cloud_record(template: &SaveRecord, version: u64, value: &Progress) -> SaveRecord {
        let payload = serde_json::to_vec(value).unwrap();
        let mut record = template.clone();
        record.id = SaveId::new();
        record.payload = payload.clone();
        record.metadata.version = version;
        record.metadata.checksum = checksum_hex(&payload);
        record.metadata.compressed = false;
        record.metadata.encrypted = false;
        record.metadata.size_bytes = payload.len();
        record
    }

    #[tokio::test]
    async fn test_create_assigns_monotonic_versions() {
        let (engine, _) = engine();

        for expected in 1..=5u64 {
            let record = engine
                .create_save(
                    "user-1",
                    "game-1",
                    "quicksave",
                    &progress(expected as u32),
                    SaveOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(record.metadata.version, expected);
        }
    }

    #[tokio::test]
    async fn test_concurrent_creates_never_reuse_a_version() {
        let (engine, _) = engine();
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..8u32 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .create_save(
                        "user-1",
                        "game-1",
                        "manual",
                        &progress(i),
                        SaveOptions::default(),
                    )
                    .await
                    .unwrap()
                    .metadata
                    .version
            }));
        }

        let mut versions = BTreeSet::new();
        for handle in handles {
            versions.insert(handle.await.unwrap());
        }
        assert_eq!(versions, (1..=8).collect::<BTreeSet<u64>>());
    }

    #[tokio::test]
    async fn test_retention_keeps_highest_versions() {
        // quicksave keeps 3 versions
        let (engine, _) = engine();

        let mut ids = Vec::new();
        for i in 0..4u32 {
            let record = engine
                .create_save(
                    "user-1",
                    "game-1",
                    "quicksave",
                    &progress(i),
                    SaveOptions::default(),
                )
                .await
                .unwrap();
            ids.push(record.id);
        }

        let saves = engine.list_saves("user-1", Some("game-1")).await;
        assert_eq!(saves.len(), 3);
        let versions: BTreeSet<u64> = saves.iter().map(|r| r.metadata.version).collect();
        assert_eq!(versions, BTreeSet::from([2, 3, 4]));

        // The pruned save left the queue; the newest is still pending.
        let pending = engine.pending_sync().await;
        assert!(!pending.contains(&ids[0]));
        assert!(pending.contains(&ids[3]));
    }

    #[tokio::test]
    async fn test_unknown_slot_rejected() {
        let (engine, _) = engine();
        let result = engine
            .create_save(
                "user-1",
                "game-1",
                "nonexistent",
                &progress(1),
                SaveOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn test_size_exceeded_persists_nothing() {
        let cloud = Arc::new(MemoryCloudStore::default());
        let mut slots = SlotRegistry::with_defaults();
        slots.insert(SlotDefinition {
            name: "tiny".to_string(),
            max_size_bytes: 8,
            auto_save: false,
            versions_to_keep: 3,
            sync_with_cloud: true,
            encryption_enabled: false,
        });
        let engine = SaveEngine::new(EngineConfig::default(), slots, cloud).unwrap();

        let result = engine
            .create_save("user-1", "game-1", "tiny", &progress(1), SaveOptions::default())
            .await;
        assert!(matches!(result, Err(Error::SizeExceeded { .. })));

        assert!(engine.list_saves("user-1", None).await.is_empty());
        assert!(engine.pending_sync().await.is_empty());
    }

    #[tokio::test]
    async fn test_quota_enforced() {
        let cloud = Arc::new(MemoryCloudStore::default());
        let config = EngineConfig {
            max_saves_per_user: 2,
            ..Default::default()
        };
        let engine = engine_with(cloud, config);

        for i in 0..2u32 {
            engine
                .create_save(
                    "user-1",
                    "game-1",
                    "quicksave",
                    &progress(i),
                    SaveOptions::default(),
                )
                .await
                .unwrap();
        }

        let result = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(3),
                SaveOptions::default(),
            )
            .await;
        assert!(matches!(result, Err(Error::QuotaExceeded { .. })));

        // Other users are unaffected.
        engine
            .create_save(
                "user-2",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_load_round_trips_encrypted_slot() {
        let (engine, _) = engine();
        let value = progress(12);

        // checkpoint has encryption enabled
        let record = engine
            .create_save("user-1", "game-1", "checkpoint", &value, SaveOptions::default())
            .await
            .unwrap();
        assert!(record.metadata.encrypted);

        let loaded: Progress = engine.load_save(&record.id).await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn test_out_of_band_corruption_fails_load() {
        let (engine, _) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "checkpoint",
                &progress(9),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        // Corrupt one payload byte behind the engine's back.
        let mut snapshot = engine.snapshot().await;
        snapshot.saves[0].payload[0] ^= 0x01;
        engine.restore(snapshot).await;

        let result: Result<Progress> = engine.load_save(&record.id).await;
        assert!(matches!(result, Err(Error::Corruption(_))));
    }

    #[tokio::test]
    async fn test_load_missing_save() {
        let (engine, _) = engine();
        let result: Result<Progress> = engine.load_save(&SaveId::new()).await;
        assert!(matches!(result, Err(Error::SaveNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (engine, _) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        assert!(engine.delete_save(&record.id).await);
        assert!(!engine.delete_save(&record.id).await);
        assert!(engine.pending_sync().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_uploads_when_no_remote_copy() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let outcome = engine.sync_with_cloud(&record.id, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Uploaded);

        let stored = cloud.stored("user-1", "game-1", "quicksave").unwrap();
        assert_eq!(stored.metadata.version, 1);
        assert!(engine.pending_sync().await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_downloads_newer_remote() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let newer = progress(42);
        cloud.seed(cloud_record(&record, 5, &newer));

        let outcome = engine.sync_with_cloud(&record.id, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Downloaded);

        // Same handle, cloud content.
        let replaced = engine.get_save(&record.id).await.unwrap();
        assert_eq!(replaced.id, record.id);
        assert_eq!(replaced.metadata.version, 5);
        let loaded: Progress = engine.load_save(&record.id).await.unwrap();
        assert_eq!(loaded, newer);
    }

    #[tokio::test]
    async fn test_force_upload_overrides_newer_remote() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        cloud.seed(cloud_record(&record, 5, &progress(42)));

        let outcome = engine.sync_with_cloud(&record.id, true).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Uploaded);

        let stored = cloud.stored("user-1", "game-1", "quicksave").unwrap();
        assert_eq!(stored.metadata.version, 1);
    }

    #[tokio::test]
    async fn test_equal_versions_same_timestamp_no_change() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        cloud.seed(record.clone());

        let outcome = engine.sync_with_cloud(&record.id, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::NoChange);
        assert!(engine.pending_sync().await.is_empty());
    }

    #[tokio::test]
    async fn test_equal_versions_differing_timestamps_conflict() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let mut divergent = cloud_record(&record, record.metadata.version, &progress(2));
        divergent.metadata.timestamp = record.metadata.timestamp + ChronoDuration::seconds(30);
        cloud.seed(divergent);

        let outcome = engine.sync_with_cloud(&record.id, false).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Conflict);

        // Local record untouched, conflict parked, id still queued.
        let local = engine.get_save(&record.id).await.unwrap();
        assert_eq!(local, record);
        assert_eq!(engine.pending_conflicts("user-1").await.len(), 1);
        assert!(engine.pending_sync().await.contains(&record.id));

        // Further syncs are blocked until resolution.
        let blocked = engine.sync_with_cloud(&record.id, false).await;
        assert!(matches!(blocked, Err(Error::ConflictUnresolved(_))));
    }

    #[tokio::test]
    async fn test_resolve_use_local_reuploads() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        let mut divergent = cloud_record(&record, record.metadata.version, &progress(2));
        divergent.metadata.timestamp = record.metadata.timestamp + ChronoDuration::seconds(30);
        cloud.seed(divergent);
        engine.sync_with_cloud(&record.id, false).await.unwrap();

        let resolved = engine
            .resolve_conflict(&record.id, ResolutionStrategy::UseLocal)
            .await
            .unwrap();
        assert_eq!(resolved.payload, record.payload);

        let stored = cloud.stored("user-1", "game-1", "quicksave").unwrap();
        assert_eq!(stored.payload, record.payload);
        assert!(engine.pending_conflicts("user-1").await.is_empty());
        assert!(engine.pending_sync().await.contains(&record.id));
    }

    #[tokio::test]
    async fn test_resolve_use_cloud_replaces_local() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        let cloud_value = progress(77);
        let mut divergent = cloud_record(&record, record.metadata.version, &cloud_value);
        divergent.metadata.timestamp = record.metadata.timestamp + ChronoDuration::seconds(30);
        cloud.seed(divergent);
        engine.sync_with_cloud(&record.id, false).await.unwrap();

        engine
            .resolve_conflict(&record.id, ResolutionStrategy::UseCloud)
            .await
            .unwrap();

        let loaded: Progress = engine.load_save(&record.id).await.unwrap();
        assert_eq!(loaded, cloud_value);
        assert!(engine.pending_conflicts("user-1").await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_merge_takes_later_side_and_bumps_version() {
        let (engine, cloud) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        let cloud_value = progress(88);
        let mut divergent = cloud_record(&record, record.metadata.version, &cloud_value);
        divergent.metadata.timestamp = record.metadata.timestamp + ChronoDuration::seconds(30);
        cloud.seed(divergent.clone());
        engine.sync_with_cloud(&record.id, false).await.unwrap();

        let merged = engine
            .resolve_conflict(&record.id, ResolutionStrategy::Merge)
            .await
            .unwrap();

        // Cloud side was later, so its payload wins; version goes past both.
        assert_eq!(merged.payload, divergent.payload);
        assert_eq!(merged.metadata.version, record.metadata.version + 1);
        assert_eq!(merged.id, record.id);

        let stored = cloud.stored("user-1", "game-1", "quicksave").unwrap();
        assert_eq!(stored.metadata.version, merged.metadata.version);
    }

    #[tokio::test]
    async fn test_resolve_without_conflict_fails() {
        let (engine, _) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let result = engine
            .resolve_conflict(&record.id, ResolutionStrategy::Merge)
            .await;
        assert!(matches!(result, Err(Error::ConflictNotFound(_))));
    }

    #[tokio::test]
    async fn test_remote_size_ceiling_fails_upload_and_keeps_save_queued() {
        let cloud = Arc::new(MemoryCloudStore::new(RemoteLimits {
            max_payload_bytes: 4,
        }));
        let engine = engine_with(cloud, EngineConfig::default());

        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let result = engine.sync_with_cloud(&record.id, false).await;
        assert!(matches!(result, Err(Error::SizeExceeded { .. })));

        // Local state is untouched and the id stays queued for retry.
        assert!(engine.get_save(&record.id).await.is_ok());
        assert!(engine.pending_sync().await.contains(&record.id));
    }

    #[tokio::test]
    async fn test_export_import_round_trip_with_fresh_ids() {
        let (engine, _) = engine();
        let value = progress(3);
        let record = engine
            .create_save("user-1", "game-1", "manual", &value, SaveOptions::default())
            .await
            .unwrap();

        let document = engine.export_saves("user-1", Some("game-1")).await;
        assert_eq!(document.saves.len(), 1);

        let (other, _) = self::engine();
        let imported = other.import_saves(&document).await.unwrap();
        assert_eq!(imported, 1);

        let saves = other.list_saves("user-1", Some("game-1")).await;
        assert_eq!(saves.len(), 1);
        assert_ne!(saves[0].id, record.id);
        assert_eq!(saves[0].metadata.version, record.metadata.version);

        // Imported saves are not auto-enqueued.
        assert!(other.pending_sync().await.is_empty());

        // Payload survives the trip intact.
        let loaded: Progress = other.load_save(&saves[0].id).await.unwrap();
        assert_eq!(loaded, value);
    }

    #[tokio::test]
    async fn test_import_skips_unknown_slots() {
        let (engine, _) = engine();
        engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let mut document = engine.export_saves("user-1", None).await;
        document.saves[0].slot_name = "retired-slot".to_string();

        let (other, _) = self::engine();
        let imported = other.import_saves(&document).await.unwrap();
        assert_eq!(imported, 0);
    }

    #[tokio::test]
    async fn test_import_skips_versions_already_in_lineage() {
        let (engine, _) = engine();
        for i in 0..3u32 {
            engine
                .create_save(
                    "user-1",
                    "game-1",
                    "quicksave",
                    &progress(i),
                    SaveOptions::default(),
                )
                .await
                .unwrap();
        }

        // Importing a user's own export, even repeatedly, must not grow the
        // lineage or duplicate version numbers.
        let document = engine.export_saves("user-1", None).await;
        assert_eq!(engine.import_saves(&document).await.unwrap(), 0);
        assert_eq!(engine.import_saves(&document).await.unwrap(), 0);

        let saves = engine.list_saves("user-1", Some("game-1")).await;
        assert_eq!(saves.len(), 3);
        let versions: BTreeSet<u64> = saves.iter().map(|r| r.metadata.version).collect();
        assert_eq!(versions, BTreeSet::from([1, 2, 3]));
    }

    #[tokio::test]
    async fn test_import_prunes_lineage_beyond_retention() {
        // manual keeps 20 versions, so five creates all survive the export.
        let (engine, _) = engine();
        for i in 0..5u32 {
            engine
                .create_save("user-1", "game-1", "manual", &progress(i), SaveOptions::default())
                .await
                .unwrap();
        }
        let mut document = engine.export_saves("user-1", None).await;
        for wire in &mut document.saves {
            // quicksave keeps 3
            wire.slot_name = "quicksave".to_string();
        }

        let (other, _) = self::engine();
        assert_eq!(other.import_saves(&document).await.unwrap(), 5);

        let saves = other.list_saves("user-1", Some("game-1")).await;
        assert_eq!(saves.len(), 3);
        let versions: BTreeSet<u64> = saves.iter().map(|r| r.metadata.version).collect();
        assert_eq!(versions, BTreeSet::from([3, 4, 5]));
    }

    #[tokio::test]
    async fn test_import_rejects_over_quota_and_stores_nothing() {
        let (engine, _) = engine();
        for i in 0..3u32 {
            engine
                .create_save("user-1", "game-1", "manual", &progress(i), SaveOptions::default())
                .await
                .unwrap();
        }
        let document = engine.export_saves("user-1", None).await;

        let cloud = Arc::new(MemoryCloudStore::default());
        let other = engine_with(
            cloud,
            EngineConfig {
                max_saves_per_user: 2,
                ..Default::default()
            },
        );

        let result = other.import_saves(&document).await;
        assert!(matches!(result, Err(Error::QuotaExceeded { .. })));
        assert!(other.list_saves("user-1", None).await.is_empty());
    }

    #[tokio::test]
    async fn test_stats_counts() {
        let (engine, _) = engine();
        engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        engine
            .create_save(
                "user-1",
                "game-1",
                "checkpoint",
                &progress(2),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let stats = engine.stats().await;
        assert_eq!(stats.total_saves, 2);
        assert_eq!(stats.pending_sync, 2);
        assert_eq!(stats.unresolved_conflicts, 0);
        assert_eq!(stats.saves_per_slot["quicksave"], 1);
        assert_eq!(stats.saves_per_slot["checkpoint"], 1);
        assert!(stats.total_payload_bytes > 0);
    }

    #[tokio::test]
    async fn test_events_emitted_on_create_and_delete() {
        let (engine, _) = engine();
        let mut events = engine.subscribe();

        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();
        engine.delete_save(&record.id).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::SaveCreated { version: 1, .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            EngineEvent::SaveDeleted { .. }
        ));
    }

    #[tokio::test]
    async fn test_snapshot_restore_round_trip() {
        let (engine, _) = engine();
        let record = engine
            .create_save(
                "user-1",
                "game-1",
                "quicksave",
                &progress(1),
                SaveOptions::default(),
            )
            .await
            .unwrap();

        let snapshot = engine.snapshot().await;

        let (other, _) = self::engine();
        other.restore(snapshot).await;

        let restored = other.get_save(&record.id).await.unwrap();
        assert_eq!(restored, record);
        assert!(other.pending_sync().await.contains(&record.id));
    }
}
