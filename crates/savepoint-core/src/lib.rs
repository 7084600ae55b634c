//! savepoint-core - Core library for Savepoint
//!
//! Versioned, checksummed game-save records kept in a local store and
//! reconciled against a remote save store: codec pipeline (serialize,
//! compress, encrypt, checksum), retention, two-way sync with conflict
//! detection, background auto-sync, and portable import/export.

pub mod cloud;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod export;
pub mod models;
pub mod sync;

pub use cloud::{CloudSaveStore, HttpCloudStore, MemoryCloudStore, RemoteLimits};
pub use config::EngineConfig;
pub use engine::{EngineSnapshot, EngineStats, SaveEngine};
pub use error::{Error, Result};
pub use events::EngineEvent;
pub use export::ExportDocument;
pub use models::{
    ConflictRecord, ConflictType, ResolutionStrategy, SaveId, SaveOptions, SaveRecord,
    SlotDefinition, SlotRegistry,
};
pub use sync::scheduler::AutoSyncScheduler;
pub use sync::SyncOutcome;
