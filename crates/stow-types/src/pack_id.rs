use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{decode_id_hex, Result, StowError};

/// Directory under which pack files live in storage.
pub const PACKS_DIR: &str = "packs";

/// A 32-byte pack file identifier computed as unkeyed BLAKE2b-256.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PackId(pub [u8; 32]);

impl PackId {
    /// Compute a pack ID as unkeyed BLAKE2b-256 of the entire pack contents.
    pub fn compute(data: &[u8]) -> Self {
        PackId(blake2b_256(data))
    }

    /// Hex-encode the full pack ID.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse a PackId from a 64-character hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_id_hex(hex_str).map(PackId)
    }

    /// First byte of the identity. Drives both sharding and data-read buckets.
    pub fn first_byte(&self) -> u8 {
        self.0[0]
    }

    /// First byte as a two-char hex string, used for shard directory.
    pub fn shard_prefix(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Storage key path: `packs/<shard>/<full_hex>`.
    pub fn storage_key(&self) -> String {
        format!("{PACKS_DIR}/{}/{}", self.shard_prefix(), self.to_hex())
    }

    /// Inverse of [`storage_key`](Self::storage_key). Rejects keys whose
    /// shard directory disagrees with the pack name.
    pub fn from_storage_key(key: &str) -> Result<Self> {
        let malformed = |reason: &str| StowError::MalformedId {
            id: key.to_string(),
            reason: reason.to_string(),
        };
        let mut parts = key.split('/');
        let (Some(dir), Some(shard), Some(name), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(malformed("expected packs/<shard>/<id>"));
        };
        if dir != PACKS_DIR {
            return Err(malformed("not a pack key"));
        }
        let id = Self::from_hex(name)?;
        if id.shard_prefix() != shard {
            return Err(malformed("shard directory does not match pack id"));
        }
        Ok(id)
    }
}

/// Unkeyed BLAKE2b with a 32-byte digest.
pub(crate) fn blake2b_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Blake2bVar::new(32).expect("valid output size");
    hasher.update(data);
    let mut out = [0u8; 32];
    hasher.finalize_variable(&mut out).expect("correct length");
    out
}

impl FromStr for PackId {
    type Err = StowError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl fmt::Debug for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PackId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
