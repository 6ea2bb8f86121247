use thiserror::Error;

use crate::blob_id::BlobId;

pub type Result<T> = std::result::Result<T, StowError>;

#[derive(Debug, Error)]
pub enum StowError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid repository format: {0}")]
    InvalidFormat(String),

    #[error("unknown object type tag: {0}")]
    UnknownObjectType(u8),

    #[error("serialization error: {0}")]
    Serialization(#[from] rmp_serde::encode::Error),

    #[error("deserialization error: {0}")]
    Deserialization(#[from] rmp_serde::decode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed id '{id}': {reason}")]
    MalformedId { id: String, reason: String },

    #[error("decryption failed: wrong key or corrupted data")]
    DecryptionFailed,

    #[error("blob {expected}: content hashes to {actual}")]
    BlobIdMismatch { expected: BlobId, actual: BlobId },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid data subset: {0}")]
    InvalidSubset(String),

    #[error("operation interrupted")]
    Interrupted,

    #[error("{0}")]
    Other(String),
}

/// Decode a 64-character hex string into 32 raw bytes.
pub(crate) fn decode_id_hex(hex_str: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(hex_str).map_err(|e| StowError::MalformedId {
        id: hex_str.to_string(),
        reason: format!("invalid hex: {e}"),
    })?;
    if bytes.len() != 32 {
        return Err(StowError::MalformedId {
            id: hex_str.to_string(),
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
