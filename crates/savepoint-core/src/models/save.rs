//! Save record model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A unique identifier for a save record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SaveId(Uuid);

impl SaveId {
    /// Create a new unique save ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for SaveId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SaveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SaveId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Integrity and versioning metadata attached to every save record.
///
/// `checksum` is a hex SHA-256 digest of the final payload bytes, computed
/// after compression and encryption. `size_bytes` always equals the payload
/// length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveMetadata {
    /// Monotonic version within a (user, game, slot) lineage, starting at 1
    pub version: u64,
    /// Creation instant
    pub timestamp: DateTime<Utc>,
    /// Game build that produced the save
    pub game_version: String,
    /// Platform that produced the save
    pub platform: String,
    /// Hex SHA-256 digest of the final payload bytes
    pub checksum: String,
    /// Whether the payload was gzip-compressed before encryption
    pub compressed: bool,
    /// Whether the payload is encrypted
    pub encrypted: bool,
    /// Length of the payload in bytes
    pub size_bytes: usize,
}

/// One versioned snapshot of game progress for a (user, game, slot) lineage.
///
/// The payload is an opaque encoded blob; the engine never interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveRecord {
    /// Unique identifier
    pub id: SaveId,
    /// Owning user
    pub user_id: String,
    /// Game the save belongs to
    pub game_id: String,
    /// Slot name, a key into the slot registry
    pub slot_name: String,
    /// Encoded payload bytes (post compression/encryption)
    pub payload: Vec<u8>,
    /// Integrity and versioning metadata
    pub metadata: SaveMetadata,
    /// Free-form labels
    pub tags: Vec<String>,
    /// Optional human-readable description
    pub description: Option<String>,
    /// Optional screenshot reference
    pub screenshot: Option<String>,
    /// Accumulated play time in seconds
    pub play_time_seconds: u64,
    /// Optional in-game level
    pub level: Option<u32>,
    /// Optional completion percentage
    pub progress_percent: Option<f32>,
}

impl SaveRecord {
    /// Whether this record belongs to the given (user, game, slot) lineage.
    #[must_use]
    pub fn in_lineage(&self, user_id: &str, game_id: &str, slot_name: &str) -> bool {
        self.user_id == user_id && self.game_id == game_id && self.slot_name == slot_name
    }
}

/// Descriptive fields supplied by the caller when creating a save.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SaveOptions {
    pub game_version: String,
    pub platform: String,
    pub tags: Vec<String>,
    pub description: Option<String>,
    pub screenshot: Option<String>,
    pub play_time_seconds: u64,
    pub level: Option<u32>,
    pub progress_percent: Option<f32>,
}
