//! Sync conflict model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::save::{SaveId, SaveRecord};

/// What kind of divergence was detected between local and cloud copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    Version,
    Timestamp,
    Content,
    Platform,
}

/// How a pending conflict should be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Keep the local record and re-upload it
    UseLocal,
    /// Overwrite the local record with the cloud copy
    UseCloud,
    /// Take the later-timestamped side, bump the version past both
    Merge,
}

impl std::fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UseLocal => write!(f, "use_local"),
            Self::UseCloud => write!(f, "use_cloud"),
            Self::Merge => write!(f, "merge"),
        }
    }
}

/// A resolution action together with a human-readable consequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionOption {
    pub strategy: ResolutionStrategy,
    pub consequence: String,
}

/// A detected divergence between the local and cloud copies of a save.
///
/// Created when both sides hold the same version with differing timestamps;
/// destroyed when resolved. The local record stays untouched while the
/// conflict is pending.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    /// Save the conflict belongs to
    pub save_id: SaveId,
    /// Local copy at detection time
    pub local: SaveRecord,
    /// Cloud copy at detection time
    pub cloud: SaveRecord,
    /// Kind of divergence
    pub conflict_type: ConflictType,
    /// Whether the engine may resolve it without user input
    pub auto_resolvable: bool,
    /// Available resolution actions with consequence descriptions
    pub options: Vec<ResolutionOption>,
    /// Detection instant
    pub detected_at: DateTime<Utc>,
}

impl ConflictRecord {
    /// Build a timestamp conflict: equal versions, differing timestamps.
    ///
    /// These only arise from out-of-band edits, so they are never
    /// auto-resolvable.
    #[must_use]
    pub fn timestamp_conflict(local: SaveRecord, cloud: SaveRecord) -> Self {
        let options = vec![
            ResolutionOption {
                strategy: ResolutionStrategy::UseLocal,
                consequence: format!(
                    "Keep this device's save from {} and overwrite the cloud copy",
                    local.metadata.timestamp.to_rfc3339()
                ),
            },
            ResolutionOption {
                strategy: ResolutionStrategy::UseCloud,
                consequence: format!(
                    "Discard this device's save and take the cloud copy from {}",
                    cloud.metadata.timestamp.to_rfc3339()
                ),
            },
            ResolutionOption {
                strategy: ResolutionStrategy::Merge,
                consequence: "Keep whichever side is newer as a new version on both sides"
                    .to_string(),
            },
        ];

        Self {
            save_id: local.id,
            local,
            cloud,
            conflict_type: ConflictType::Timestamp,
            auto_resolvable: false,
            options,
            detected_at: Utc::now(),
        }
    }
}
