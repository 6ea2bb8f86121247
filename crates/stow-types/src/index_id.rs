use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{decode_id_hex, Result, StowError};
use crate::pack_id::blake2b_256;

/// Directory under which index files live in storage.
pub const INDEX_DIR: &str = "index";

/// A 32-byte index file identifier: unkeyed BLAKE2b-256 of the stored file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexId(pub [u8; 32]);

impl IndexId {
    pub fn compute(data: &[u8]) -> Self {
        IndexId(blake2b_256(data))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex_str: &str) -> Result<Self> {
        decode_id_hex(hex_str).map(IndexId)
    }

    /// Storage key path: `index/<hex>`.
    pub fn storage_key(&self) -> String {
        format!("{INDEX_DIR}/{}", self.to_hex())
    }

    pub fn from_storage_key(key: &str) -> Result<Self> {
        let name = key
            .strip_prefix(INDEX_DIR)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| StowError::MalformedId {
                id: key.to_string(),
                reason: "not an index key".into(),
            })?;
        Self::from_hex(name)
    }
}

impl fmt::Debug for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexId({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for IndexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", &self.to_hex()[..16])
    }
}
