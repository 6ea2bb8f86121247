use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{decode_id_hex, Result, StowError};

/// Directory under which snapshot records live in storage.
pub const SNAPSHOTS_DIR: &str = "snapshots";

/// A 32-byte snapshot identifier (random).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SnapshotId(pub [u8; 32]);

impl SnapshotId {
    /// Generate a random snapshot ID.
    pub fn generate() -> Self {
        let mut buf = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut buf);
        SnapshotId(buf)
    }

    /// Hex-encode the full snapshot ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Storage key path: `snapshots/<hex>`.
    pub fn storage_key(&self) -> String {
        format!("{SNAPSHOTS_DIR}/{}", self.to_hex())
    }

    /// Parse a SnapshotId from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_id_hex(hex_str).map(SnapshotId)
    }

    pub fn from_storage_key(key: &str) -> Result<Self> {
        let name = key
            .strip_prefix(SNAPSHOTS_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StowError::MalformedId {
                id: key.to_string(),
                reason: "not a snapshot key".into(),
            })?;
        Self::from_hex(name)
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
