use std::collections::HashMap;

use stow_types::{BlobId, BlobType, PackId};

use crate::repo::BlobLocation;

/// One blob as listed for a pack in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexedBlob {
    pub id: BlobId,
    pub blob_type: BlobType,
    pub offset: u64,
    pub length: u32,
}

/// In-memory index of every blob the repository's index files describe.
///
/// Built once by the index loader and read-only afterwards. A blob may have
/// several locations when it is stored in more than one pack.
#[derive(Debug, Default)]
pub struct IndexMap {
    blobs: HashMap<BlobId, Vec<BlobLocation>>,
    packs: HashMap<PackId, Vec<IndexedBlob>>,
}

impl IndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the blobs of one pack. A pack recorded again has the new
    /// record's blobs merged in, skipping entries already listed. Returns
    /// `false` when the pack was already recorded.
    pub fn insert_pack(&mut self, pack_id: PackId, blobs: Vec<IndexedBlob>) -> bool {
        let first_record = !self.packs.contains_key(&pack_id);
        let listed = self.packs.entry(pack_id).or_default();
        for blob in blobs {
            if listed.contains(&blob) {
                continue;
            }
            self.blobs.entry(blob.id).or_default().push(BlobLocation {
                pack_id,
                blob_type: blob.blob_type,
                offset: blob.offset,
                length: blob.length,
            });
            listed.push(blob);
        }
        first_record
    }

    /// Returns `true` if the blob is indexed with any type.
    pub fn contains(&self, id: &BlobId) -> bool {
        self.blobs.contains_key(id)
    }

    /// Returns `true` if the blob is indexed with the given type.
    pub fn has(&self, id: &BlobId, blob_type: BlobType) -> bool {
        self.lookup(id, blob_type).is_some()
    }

    /// First known location of a blob of the given type.
    pub fn lookup(&self, id: &BlobId, blob_type: BlobType) -> Option<&BlobLocation> {
        self.blobs
            .get(id)?
            .iter()
            .find(|loc| loc.blob_type == blob_type)
    }

    pub fn locations(&self, id: &BlobId) -> &[BlobLocation] {
        self.blobs.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains_pack(&self, id: &PackId) -> bool {
        self.packs.contains_key(id)
    }

    /// Blobs the index lists for a pack; empty for unknown packs.
    pub fn blobs_in_pack(&self, id: &PackId) -> &[IndexedBlob] {
        self.packs.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn blob_ids(&self) -> impl Iterator<Item = &BlobId> {
        self.blobs.keys()
    }

    pub fn pack_ids(&self) -> impl Iterator<Item = &PackId> {
        self.packs.keys()
    }

    pub fn pack_count(&self) -> usize {
        self.packs.len()
    }

    /// Number of distinct blob IDs.
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}
