//! Local/remote reconciliation rules.
//!
//! Version is the authoritative causal marker; timestamps only break ties
//! when both sides hold the same version, and that case is routed to manual
//! resolution instead of being picked silently.

pub mod scheduler;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SaveRecord;

/// Result of comparing a local record against its cloud counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Local copy was uploaded
    Uploaded,
    /// Local copy was replaced by the cloud copy
    Downloaded,
    /// Divergence detected; parked for manual resolution
    Conflict,
    /// Both sides already agree
    NoChange,
}

impl std::fmt::Display for SyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Uploaded => write!(f, "uploaded"),
            Self::Downloaded => write!(f, "downloaded"),
            Self::Conflict => write!(f, "conflict"),
            Self::NoChange => write!(f, "no_change"),
        }
    }
}

/// What the engine should do for a (local, remote) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncDecision {
    Upload,
    Download,
    Conflict,
    NoChange,
}

/// Classify a sync attempt. No remote copy or a strictly newer local version
/// means upload; a strictly newer remote version means download; equal
/// versions conflict only when the timestamps differ.
pub(crate) fn classify(
    local: &SaveRecord,
    remote: Option<&SaveRecord>,
    force_upload: bool,
) -> SyncDecision {
    let Some(remote) = remote else {
        return SyncDecision::Upload;
    };

    if force_upload || local.metadata.version > remote.metadata.version {
        return SyncDecision::Upload;
    }
    if local.metadata.version < remote.metadata.version {
        return SyncDecision::Download;
    }
    if local.metadata.timestamp == remote.metadata.timestamp {
        SyncDecision::NoChange
    } else {
        SyncDecision::Conflict
    }
}

/// Merge two conflicting copies: take whichever side is newer, bump the
/// version past both, and stamp the merge instant. The merged record keeps
/// the local id so existing handles stay valid.
pub(crate) fn merge_records(
    local: &SaveRecord,
    cloud: &SaveRecord,
    now: DateTime<Utc>,
) -> SaveRecord {
    let winner = if cloud.metadata.timestamp > local.metadata.timestamp {
        cloud
    } else {
        local
    };

    let mut merged = winner.clone();
    merged.id = local.id;
    merged.metadata.version = local.metadata.version.max(cloud.metadata.version) + 1;
    merged.metadata.timestamp = now;
    merged
}
