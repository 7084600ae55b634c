//! Portable save record shape and bulk import/export documents.
//!
//! The wire shape is the stable field set used both for talking to a remote
//! save store and for export files: camelCase names, base64 payload bytes,
//! RFC 3339 timestamps, hex checksum.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{SaveId, SaveMetadata, SaveRecord};

/// Wire form of [`SaveMetadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireMetadata {
    pub version: u64,
    pub timestamp: DateTime<Utc>,
    pub game_version: String,
    pub platform: String,
    pub checksum: String,
    pub compressed: bool,
    pub encrypted: bool,
    pub size: usize,
}

/// Wire form of [`SaveRecord`] with a text-safe payload encoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSave {
    pub id: String,
    pub user_id: String,
    pub game_id: String,
    pub slot_name: String,
    /// Base64-encoded payload bytes
    pub payload: String,
    pub metadata: WireMetadata,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    pub play_time: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

impl WireSave {
    /// Convert a record into its wire form.
    #[must_use]
    pub fn from_record(record: &SaveRecord) -> Self {
        Self {
            id: record.id.to_string(),
            user_id: record.user_id.clone(),
            game_id: record.game_id.clone(),
            slot_name: record.slot_name.clone(),
            payload: BASE64_STANDARD.encode(&record.payload),
            metadata: WireMetadata {
                version: record.metadata.version,
                timestamp: record.metadata.timestamp,
                game_version: record.metadata.game_version.clone(),
                platform: record.metadata.platform.clone(),
                checksum: record.metadata.checksum.clone(),
                compressed: record.metadata.compressed,
                encrypted: record.metadata.encrypted,
                size: record.metadata.size_bytes,
            },
            tags: record.tags.clone(),
            description: record.description.clone(),
            screenshot: record.screenshot.clone(),
            play_time: record.play_time_seconds,
            level: record.level,
            progress: record.progress_percent,
        }
    }

    /// Convert back into a record, keeping the carried id.
    pub fn into_record(self) -> Result<SaveRecord> {
        let id: SaveId = self
            .id
            .parse()
            .map_err(|error| Error::InvalidInput(format!("invalid save id '{}': {error}", self.id)))?;
        self.into_record_with_id(id)
    }

    /// Convert back into a record under a freshly derived id.
    ///
    /// Import never trusts an id carried in from outside.
    pub fn into_record_with_fresh_id(self) -> Result<SaveRecord> {
        self.into_record_with_id(SaveId::new())
    }

    fn into_record_with_id(self, id: SaveId) -> Result<SaveRecord> {
        let payload = BASE64_STANDARD
            .decode(&self.payload)
            .map_err(|error| Error::InvalidInput(format!("invalid base64 payload: {error}")))?;

        Ok(SaveRecord {
            id,
            user_id: self.user_id,
            game_id: self.game_id,
            slot_name: self.slot_name,
            payload,
            metadata: SaveMetadata {
                version: self.metadata.version,
                timestamp: self.metadata.timestamp,
                game_version: self.metadata.game_version,
                platform: self.metadata.platform,
                checksum: self.metadata.checksum,
                compressed: self.metadata.compressed,
                encrypted: self.metadata.encrypted,
                size_bytes: self.metadata.size,
            },
            tags: self.tags,
            description: self.description,
            screenshot: self.screenshot,
            play_time_seconds: self.play_time,
            level: self.level,
            progress_percent: self.progress,
        })
    }
}

/// Bulk export of a user's saves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDocument {
    pub export_date: DateTime<Utc>,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
    pub saves: Vec<WireSave>,
}

impl ExportDocument {
    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON.
    pub fn from_json(payload: &str) -> Result<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}
