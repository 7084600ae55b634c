//! Reversible payload codec: serialize, compress, encrypt, checksum.
//!
//! `encode` and `decode` are strict inverses for every combination of the
//! compressed/encrypted flags. The checksum is computed over the final bytes
//! and verified before any decrypt or decompress attempt, so a corrupted
//! payload always surfaces as [`Error::Corruption`] rather than a garbled
//! decode.

use std::io::{Read, Write};

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::models::SaveMetadata;

/// Payloads at or below this serialized size skip compression; the CPU cost
/// outweighs the savings on small saves.
pub const COMPRESSION_THRESHOLD_BYTES: usize = 1024;

const NONCE_LEN: usize = 12;

/// Result of running a value through the encode pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedPayload {
    /// Final payload bytes
    pub bytes: Vec<u8>,
    /// Whether the serialized form was gzip-compressed
    pub compressed: bool,
    /// Whether the bytes are encrypted
    pub encrypted: bool,
    /// Hex SHA-256 digest of `bytes`
    pub checksum: String,
}

/// Serializes, compresses, encrypts, and checksums payload bytes, and
/// reverses the chain on decode.
#[derive(Clone)]
pub struct Codec {
    key: Option<[u8; 32]>,
}

impl Codec {
    /// Create a codec with an optional AES-256-GCM key.
    #[must_use]
    pub const fn new(key: Option<[u8; 32]>) -> Self {
        Self { key }
    }

    /// Encode a value: serialize, compress above the threshold, encrypt when
    /// asked, and checksum the final bytes.
    pub fn encode<T: Serialize>(&self, value: &T, encrypt: bool) -> Result<EncodedPayload> {
        let serialized = serde_json::to_vec(value)?;

        let (mut bytes, compressed) = if serialized.len() > COMPRESSION_THRESHOLD_BYTES {
            (gzip(&serialized)?, true)
        } else {
            (serialized, false)
        };

        if encrypt {
            bytes = self.encrypt(&bytes)?;
        }

        let checksum = checksum_hex(&bytes);
        Ok(EncodedPayload {
            bytes,
            compressed,
            encrypted: encrypt,
            checksum,
        })
    }

    /// Decode a payload back into a value, verifying the checksum first.
    pub fn decode<T: DeserializeOwned>(
        &self,
        payload: &[u8],
        metadata: &SaveMetadata,
    ) -> Result<T> {
        let computed = checksum_hex(payload);
        if computed != metadata.checksum {
            return Err(Error::Corruption(format!(
                "checksum mismatch: stored {}, computed {computed}",
                metadata.checksum
            )));
        }

        let bytes = if metadata.encrypted {
            self.decrypt(payload)?
        } else {
            payload.to_vec()
        };

        let bytes = if metadata.compressed {
            gunzip(&bytes)?
        } else {
            bytes
        };

        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Encrypt with a random 96-bit nonce prefixed to the ciphertext.
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or_else(|| {
            Error::InvalidInput("slot requires encryption but no encryption key is configured".to_string())
        })?;

        let cipher = Aes256Gcm::new(key.into());
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|error| Error::Crypto(format!("encryption failed: {error}")))?;

        let mut out = nonce.to_vec();
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let key = self.key.as_ref().ok_or_else(|| {
            Error::InvalidInput("payload is encrypted but no encryption key is configured".to_string())
        })?;

        if data.len() <= NONCE_LEN {
            return Err(Error::Crypto(
                "encrypted payload is shorter than its nonce".to_string(),
            ));
        }

        let (nonce, ciphertext) = data.split_at(NONCE_LEN);
        let cipher = Aes256Gcm::new(key.into());
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::Crypto("decryption failed: wrong key or damaged payload".to_string()))
    }
}

/// Hex SHA-256 digest of the given bytes.
#[must_use]
pub fn checksum_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn gzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    Ok(encoder.finish()?)
}

fn gunzip(bytes: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|error| Error::Corruption(format!("decompression failed: {error}")))?;
    Ok(out)
}
