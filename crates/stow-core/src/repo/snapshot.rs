use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stow_types::error::Result;
use stow_types::BlobId;

use crate::crypto::CryptoEngine;

use super::format::{pack_object, unpack_object_expect, ObjectType};

/// A snapshot record, stored at `snapshots/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub hostname: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub paths: Vec<String>,
    /// Root tree of the snapshot. `None` only in damaged repositories.
    pub tree: Option<BlobId>,
}

impl Snapshot {
    pub fn new(hostname: &str, tree: BlobId) -> Self {
        Self {
            hostname: hostname.to_string(),
            time: Utc::now(),
            paths: Vec::new(),
            tree: Some(tree),
        }
    }

    pub fn encode(&self, crypto: &dyn CryptoEngine) -> Result<Vec<u8>> {
        let bytes = rmp_serde::to_vec(self)?;
        pack_object(ObjectType::Snapshot, &bytes, crypto)
    }

    pub fn decode(data: &[u8], crypto: &dyn CryptoEngine) -> Result<Self> {
        let bytes = unpack_object_expect(data, ObjectType::Snapshot, crypto)?;
        Ok(rmp_serde::from_slice(&bytes)?)
    }
}
