//! Error types for savepoint-core

use thiserror::Error;

/// Result type alias using savepoint-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in savepoint-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Unknown save slot
    #[error("Unknown save slot: {0}")]
    SlotNotFound(String),

    /// Save record not found
    #[error("Save not found: {0}")]
    SaveNotFound(String),

    /// No pending conflict for the given save
    #[error("No pending conflict for save: {0}")]
    ConflictNotFound(String),

    /// Per-user save count limit reached
    #[error("Save quota exceeded: user {user_id} holds {count} of {limit} saves")]
    QuotaExceeded {
        user_id: String,
        count: usize,
        limit: usize,
    },

    /// Encoded payload is larger than the applicable ceiling
    #[error("Payload is {size_bytes} bytes, limit is {limit_bytes}")]
    SizeExceeded {
        size_bytes: usize,
        limit_bytes: usize,
    },

    /// Stored payload failed its checksum; the data cannot be trusted
    #[error("Save data corrupted: {0}")]
    Corruption(String),

    /// Transient remote failure; the save stays queued for retry
    #[error("Sync failed: {0}")]
    Sync(String),

    /// Operation blocked until the save's conflict is resolved
    #[error("Save {0} has an unresolved sync conflict")]
    ConflictUnresolved(String),

    /// Encryption or decryption failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
