use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use stow_types::error::{Result, StowError};
use stow_types::{BlobId, BlobType, IndexId, PackId, SnapshotId};

use crate::crypto::{CryptoEngine, PlaintextEngine};
use crate::repo::format::{pack_object_with_context, unpack_object_expect_with_context, ObjectType};
use crate::repo::index_file::IndexFile;
use crate::repo::pack::{read_blob_from_pack, PackHeaderEntry, PackWriter};
use crate::repo::snapshot::Snapshot;
use crate::repo::tree::Tree;
use crate::repo::{BlobLocation, Repository, RepositoryAccess};
use crate::storage::StorageBackend;

/// In-memory storage backend for testing. Thread-safe via Mutex.
#[derive(Default)]
pub struct MemoryBackend {
    data: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        let mut map = self.data.lock().unwrap();
        map.remove(key);
        Ok(())
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let map = self.data.lock().unwrap();
        let keys: Vec<String> = map
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        Ok(keys)
    }

    fn size(&self, key: &str) -> Result<Option<u64>> {
        let map = self.data.lock().unwrap();
        Ok(map.get(key).map(|data| data.len() as u64))
    }

    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>> {
        let map = self.data.lock().unwrap();
        match map.get(key) {
            Some(data) => {
                let start = offset as usize;
                let end = start.checked_add(length as usize).ok_or_else(|| {
                    StowError::Other(format!(
                        "short read on {key} at offset {offset}: offset + length overflows usize"
                    ))
                })?;
                if end > data.len() {
                    return Err(StowError::Other(format!(
                        "short read on {key} at offset {offset}: expected {length} bytes, got {}",
                        data.len().saturating_sub(start)
                    )));
                }
                Ok(Some(data[start..end].to_vec()))
            }
            None => Ok(None),
        }
    }
}

/// Fixed blob ID key for deterministic tests.
pub fn test_blob_id_key() -> [u8; 32] {
    [0xAA; 32]
}

/// Repository fixture built blob by blob in memory.
///
/// Blobs accumulate in an open pack until [`flush_pack`](Self::flush_pack);
/// flushed packs accumulate in a pending index file until
/// [`write_index`](Self::write_index). Implements [`RepositoryAccess`] by
/// delegating to a real [`Repository`], with two test hooks: trees stored
/// under a forged ID (the only way to build reference cycles) load without
/// the hash check, and every blob load is counted.
pub struct TestRepo {
    repo: Repository,
    writer: PackWriter,
    pending_index: IndexFile,
    packs: HashMap<PackId, Vec<PackHeaderEntry>>,
    forged: HashSet<BlobId>,
    blob_loads: Mutex<HashMap<BlobId, usize>>,
    /// Set the flag after this many blob loads.
    interrupt_after: Mutex<Option<(usize, &'static AtomicBool)>>,
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRepo {
    pub fn new() -> Self {
        Self::with_storage(Box::new(MemoryBackend::new()))
    }

    pub fn with_storage(storage: Box<dyn StorageBackend>) -> Self {
        Self {
            repo: Repository::open(storage, Box::new(PlaintextEngine::new(&test_blob_id_key()))),
            writer: PackWriter::new(),
            pending_index: IndexFile::new(),
            packs: HashMap::new(),
            forged: HashSet::new(),
            blob_loads: Mutex::new(HashMap::new()),
            interrupt_after: Mutex::new(None),
        }
    }

    pub fn storage(&self) -> &dyn StorageBackend {
        self.repo.storage.as_ref()
    }

    /// Add a data blob to the open pack.
    pub fn data_blob(&mut self, content: &[u8]) -> BlobId {
        let id = BlobId::compute(&test_blob_id_key(), content);
        self.add_blob(BlobType::Data, id, content);
        id
    }

    /// Add a tree blob to the open pack.
    pub fn tree_blob(&mut self, tree: &Tree) -> BlobId {
        let plaintext = tree.encode().unwrap();
        let id = BlobId::compute(&test_blob_id_key(), &plaintext);
        self.add_blob(BlobType::Tree, id, &plaintext);
        id
    }

    /// Add a tree blob under an arbitrary ID.
    pub fn forged_tree(&mut self, id: BlobId, tree: &Tree) {
        let plaintext = tree.encode().unwrap();
        self.forged.insert(id);
        self.add_blob(BlobType::Tree, id, &plaintext);
    }

    /// Add raw plaintext as a blob of `blob_type` under its real ID.
    pub fn raw_blob(&mut self, blob_type: BlobType, plaintext: &[u8]) -> BlobId {
        let id = BlobId::compute(&test_blob_id_key(), plaintext);
        self.add_blob(blob_type, id, plaintext);
        id
    }

    fn add_blob(&mut self, blob_type: BlobType, id: BlobId, plaintext: &[u8]) {
        let stored = pack_object_with_context(
            ObjectType::for_blob(blob_type),
            &id.0,
            plaintext,
            self.repo.crypto(),
        )
        .unwrap();
        self.writer.add_blob(blob_type, id, &stored);
    }

    /// Seal the open pack, upload it and record it in the pending index.
    pub fn flush_pack(&mut self) -> PackId {
        let (pack_id, entries) = self
            .writer
            .flush(self.repo.storage.as_ref(), self.repo.crypto())
            .unwrap();
        self.pending_index.add_pack(&pack_id, &entries);
        self.packs.insert(pack_id, entries);
        pack_id
    }

    /// Seal the open pack and upload it without indexing it.
    pub fn flush_unindexed_pack(&mut self) -> PackId {
        let (pack_id, entries) = self
            .writer
            .flush(self.repo.storage.as_ref(), self.repo.crypto())
            .unwrap();
        self.packs.insert(pack_id, entries);
        pack_id
    }

    /// Record an already flushed pack in the pending index again.
    pub fn index_pack_again(&mut self, pack_id: &PackId) {
        let entries = self.packs[pack_id].clone();
        self.pending_index.add_pack(pack_id, &entries);
    }

    /// Upload the pending index file and start a new one.
    pub fn write_index(&mut self) -> IndexId {
        let file = std::mem::take(&mut self.pending_index);
        self.put_index_file(&file)
    }

    pub fn put_index_file(&self, file: &IndexFile) -> IndexId {
        let bytes = file.encode(self.repo.crypto()).unwrap();
        let id = IndexId::compute(&bytes);
        self.storage().put(&id.storage_key(), &bytes).unwrap();
        id
    }

    /// Flush pending blobs and index them in a fresh index file.
    pub fn commit(&mut self) -> PackId {
        let pack_id = self.flush_pack();
        self.write_index();
        pack_id
    }

    pub fn snapshot(&self, tree: BlobId) -> SnapshotId {
        self.put_snapshot(&Snapshot::new("test-host", tree))
    }

    pub fn put_snapshot(&self, snapshot: &Snapshot) -> SnapshotId {
        let id = SnapshotId::generate();
        let bytes = snapshot.encode(self.repo.crypto()).unwrap();
        self.storage().put(&id.storage_key(), &bytes).unwrap();
        id
    }

    pub fn delete_pack(&self, pack_id: &PackId) {
        self.storage().delete(&pack_id.storage_key()).unwrap();
    }

    /// Flip one byte of the stored object at `key`.
    pub fn corrupt(&self, key: &str, offset: usize) {
        let mut data = self.storage().get(key).unwrap().unwrap();
        data[offset] ^= 0xFF;
        self.storage().put(key, &data).unwrap();
    }

    /// Header entries of a flushed pack.
    pub fn pack_entries(&self, pack_id: &PackId) -> &[PackHeaderEntry] {
        &self.packs[pack_id]
    }

    pub fn blob_loads(&self, id: &BlobId) -> usize {
        self.blob_loads.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn interrupt_after_loads(&self, loads: usize, flag: &'static AtomicBool) {
        *self.interrupt_after.lock().unwrap() = Some((loads, flag));
    }

    fn count_load(&self, id: &BlobId) {
        let mut loads = self.blob_loads.lock().unwrap();
        *loads.entry(*id).or_default() += 1;
        let total: usize = loads.values().sum();
        if let Some((limit, flag)) = *self.interrupt_after.lock().unwrap() {
            if total >= limit {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }
}

impl RepositoryAccess for TestRepo {
    fn list_packs(&self) -> Result<Vec<PackId>> {
        self.repo.list_packs()
    }

    fn load_pack(&self, id: &PackId) -> Result<Vec<u8>> {
        self.repo.load_pack(id)
    }

    fn pack_header(&self, id: &PackId) -> Result<Vec<PackHeaderEntry>> {
        self.repo.pack_header(id)
    }

    fn list_index_files(&self) -> Result<Vec<IndexId>> {
        self.repo.list_index_files()
    }

    fn load_index_file(&self, id: &IndexId) -> Result<IndexFile> {
        self.repo.load_index_file(id)
    }

    fn load_blob(&self, id: &BlobId, location: &BlobLocation) -> Result<Vec<u8>> {
        self.count_load(id);
        if !self.forged.contains(id) {
            return self.repo.load_blob(id, location);
        }
        let stored = read_blob_from_pack(
            self.storage(),
            &location.pack_id,
            location.offset,
            location.length,
        )?;
        unpack_object_expect_with_context(
            &stored,
            ObjectType::for_blob(location.blob_type),
            &id.0,
            self.repo.crypto(),
        )
    }

    fn list_snapshots(&self) -> Result<Vec<SnapshotId>> {
        self.repo.list_snapshots()
    }

    fn load_snapshot(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.repo.load_snapshot(id)
    }

    fn crypto(&self) -> &dyn CryptoEngine {
        self.repo.crypto()
    }
}
