use serde::{Deserialize, Serialize};

use stow_types::error::Result;
use stow_types::{BlobType, PackId};

use crate::crypto::CryptoEngine;

use super::format::{pack_object, unpack_object_expect, ObjectType};
use super::pack::PackHeaderEntry;

/// One index file as stored under `index/<id>`.
///
/// IDs are kept as hex strings so that a single malformed record can be
/// reported without rejecting the whole file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFile {
    pub packs: Vec<IndexFilePack>,
}

/// Blobs of one pack, as recorded by an index file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFilePack {
    pub id: String,
    pub blobs: Vec<IndexFileBlob>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexFileBlob {
    pub id: String,
    #[serde(rename = "type")]
    pub blob_type: BlobType,
    pub offset: u64,
    pub length: u32,
}

impl IndexFile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every blob of a sealed pack.
    pub fn add_pack(&mut self, pack_id: &PackId, entries: &[PackHeaderEntry]) {
        self.packs.push(IndexFilePack {
            id: pack_id.to_hex(),
            blobs: entries
                .iter()
                .map(|e| IndexFileBlob {
                    id: e.blob_id.to_hex(),
                    blob_type: e.blob_type,
                    offset: e.offset,
                    length: e.length,
                })
                .collect(),
        });
    }

    /// Serialize to JSON and wrap in the object envelope.
    pub fn encode(&self, crypto: &dyn CryptoEngine) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        pack_object(ObjectType::Index, &json, crypto)
    }

    pub fn decode(data: &[u8], crypto: &dyn CryptoEngine) -> Result<Self> {
        let json = unpack_object_expect(data, ObjectType::Index, crypto)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
