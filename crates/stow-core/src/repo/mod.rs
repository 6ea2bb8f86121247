pub mod format;
pub mod index_file;
pub mod pack;
pub mod snapshot;
pub mod tree;

use tracing::{debug, warn};

use stow_types::error::{Result, StowError};
use stow_types::index_id::INDEX_DIR;
use stow_types::pack_id::PACKS_DIR;
use stow_types::snapshot_id::SNAPSHOTS_DIR;
use stow_types::{BlobId, BlobType, IndexId, PackId, SnapshotId};

use crate::crypto::CryptoEngine;
use crate::storage::StorageBackend;

use self::format::{unpack_object_expect_with_context, ObjectType};
use self::index_file::IndexFile;
use self::pack::PackHeaderEntry;
use self::snapshot::Snapshot;

/// Where a blob lives: which pack, at which byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobLocation {
    pub pack_id: PackId,
    pub blob_type: BlobType,
    pub offset: u64,
    pub length: u32,
}

/// Read-only view of a repository, as consumed by the checker.
///
/// Implementations own storage access, decryption and the on-disk formats.
/// Every method may be called concurrently from worker threads.
pub trait RepositoryAccess: Send + Sync {
    /// Pack IDs present in storage.
    fn list_packs(&self) -> Result<Vec<PackId>>;

    /// Full contents of a pack file.
    fn load_pack(&self, id: &PackId) -> Result<Vec<u8>>;

    /// Read and parse a pack's header with range reads only.
    fn pack_header(&self, id: &PackId) -> Result<Vec<PackHeaderEntry>>;

    fn list_index_files(&self) -> Result<Vec<IndexId>>;

    fn load_index_file(&self, id: &IndexId) -> Result<IndexFile>;

    /// Read, decrypt and hash-check one blob.
    fn load_blob(&self, id: &BlobId, location: &BlobLocation) -> Result<Vec<u8>>;

    fn list_snapshots(&self) -> Result<Vec<SnapshotId>>;

    fn load_snapshot(&self, id: &SnapshotId) -> Result<Snapshot>;

    fn crypto(&self) -> &dyn CryptoEngine;
}

/// Decode an enveloped blob and verify it hashes to `expected`.
pub fn decode_blob(
    stored: &[u8],
    blob_type: BlobType,
    expected: &BlobId,
    crypto: &dyn CryptoEngine,
) -> Result<Vec<u8>> {
    let plaintext = unpack_object_expect_with_context(
        stored,
        ObjectType::for_blob(blob_type),
        &expected.0,
        crypto,
    )?;
    let actual = BlobId::compute(crypto.blob_id_key(), &plaintext);
    if &actual != expected {
        return Err(StowError::BlobIdMismatch {
            expected: *expected,
            actual,
        });
    }
    Ok(plaintext)
}

/// A repository stored in a [`StorageBackend`].
pub struct Repository {
    pub storage: Box<dyn StorageBackend>,
    crypto: Box<dyn CryptoEngine>,
}

impl Repository {
    pub fn open(storage: Box<dyn StorageBackend>, crypto: Box<dyn CryptoEngine>) -> Self {
        debug!(encrypted = crypto.is_encrypting(), "opened repository");
        Self { storage, crypto }
    }

    /// Parse every key under `dir`, skipping (with a warning) keys that do not
    /// name a repository object.
    fn list_ids<T>(&self, dir: &str, parse: impl Fn(&str) -> Result<T>) -> Result<Vec<T>> {
        let keys = self.storage.list(dir)?;
        let mut ids = Vec::with_capacity(keys.len());
        for key in keys {
            match parse(&key) {
                Ok(id) => ids.push(id),
                Err(e) => warn!(key = %key, error = %e, "ignoring unexpected storage key"),
            }
        }
        Ok(ids)
    }
}

impl RepositoryAccess for Repository {
    fn list_packs(&self) -> Result<Vec<PackId>> {
        self.list_ids(PACKS_DIR, PackId::from_storage_key)
    }

    fn load_pack(&self, id: &PackId) -> Result<Vec<u8>> {
        pack::read_pack(self.storage.as_ref(), id)
    }

    fn pack_header(&self, id: &PackId) -> Result<Vec<PackHeaderEntry>> {
        pack::read_pack_header(self.storage.as_ref(), id, self.crypto.as_ref())
    }

    fn list_index_files(&self) -> Result<Vec<IndexId>> {
        self.list_ids(INDEX_DIR, IndexId::from_storage_key)
    }

    fn load_index_file(&self, id: &IndexId) -> Result<IndexFile> {
        let data = self
            .storage
            .get(&id.storage_key())?
            .ok_or_else(|| StowError::NotFound(format!("index {id}")))?;
        IndexFile::decode(&data, self.crypto.as_ref())
    }

    fn load_blob(&self, id: &BlobId, location: &BlobLocation) -> Result<Vec<u8>> {
        let stored = pack::read_blob_from_pack(
            self.storage.as_ref(),
            &location.pack_id,
            location.offset,
            location.length,
        )?;
        decode_blob(&stored, location.blob_type, id, self.crypto.as_ref())
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        self.list_ids(SNAPSHOTS_DIR, SnapshotId::from_storage_key)
    }

    fn load_snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        let data = self
            .storage
            .get(&id.storage_key())?
            .ok_or_else(|| StowError::NotFound(format!("snapshot {id}")))?;
        Snapshot::decode(&data, self.crypto.as_ref())
    }

    fn crypto(&self) -> &dyn CryptoEngine {
        self.crypto.as_ref()
    }
}
