//! Repository consistency checker.
//!
//! A run is a fixed sequence of phases: [`Checker::load_index`], then
//! [`Checker::check_packs`], [`Checker::check_structure`] and optionally
//! [`Checker::read_packs`]. Every phase after index loading streams its
//! findings into a [`crossbeam_channel::Sender`]; the phase closes the stream
//! by dropping the sender when it returns. Callers drain the receiver on
//! another thread (see `commands::check`).

mod load_index;
mod packs;
mod read_data;
mod structure;
pub mod subset;

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;

use stow_types::error::{Result, StowError};
use stow_types::{BlobId, BlobType, IndexId, PackId, SnapshotId};

use crate::index::IndexMap;
use crate::repo::RepositoryAccess;

pub use subset::{bucket_of, DataSubset, MAX_BUCKETS};

/// Producer side of a phase's result stream.
pub type ErrorSender = crossbeam_channel::Sender<CheckError>;

/// Progress callback shared with worker threads.
pub type ProgressFn<'p> = &'p (dyn Fn(CheckProgressEvent) + Sync);

/// Default size of the worker pool used by each phase.
pub const DEFAULT_WORKERS: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckProgressEvent {
    PacksCheckStarted { packs: usize },
    StructureStarted { snapshots: usize },
    /// `packs` of the `total` indexed packs were selected by `subset`.
    ReadDataStarted {
        subset: DataSubset,
        packs: usize,
        total: usize,
    },
    PackRead { done: usize, total: usize },
}

/// Advisory finding: the repository is intact but carries redundancy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hint {
    /// The same pack is described by more than one index record.
    DuplicatePack { pack_id: PackId, indexes: Vec<IndexId> },
}

impl fmt::Display for Hint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Hint::DuplicatePack { pack_id, indexes } => {
                let names: Vec<String> = indexes.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "pack {pack_id} contained in several indexes: {{{}}}",
                    names.join(", ")
                )
            }
        }
    }
}

/// A problem found in a single tree blob.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeIssue {
    #[error("failed to load tree: {0}")]
    Load(String),

    #[error("failed to decode tree: {0}")]
    Decode(String),

    #[error("node '{node}': {blob_type} blob {blob_id} not found in index")]
    MissingBlob {
        node: String,
        blob_id: BlobId,
        blob_type: BlobType,
    },

    #[error("node '{node}': directory has no subtree")]
    DirWithoutSubtree { node: String },

    #[error("node '{node}': subtree {subtree} leads back to an ancestor")]
    Cycle { node: String, subtree: BlobId },
}

/// Every problem found in one tree, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("tree {id}: {}", join_issues(.errors))]
pub struct TreeError {
    pub id: BlobId,
    pub errors: Vec<TreeIssue>,
}

/// A problem found while re-reading a pack's raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataIssue {
    #[error("failed to load pack: {0}")]
    Load(String),

    #[error("pack contents hash to {actual}")]
    PackIdMismatch { actual: PackId },

    #[error("invalid pack header: {0}")]
    Header(String),

    #[error("blob {blob_id}: content hashes to {actual}")]
    BlobIdMismatch { blob_id: BlobId, actual: BlobId },

    #[error("blob {blob_id}: {reason}")]
    Blob { blob_id: BlobId, reason: String },

    #[error("indexed blob {blob_id} (offset {offset}, length {length}) is missing from the pack header")]
    NotInPack {
        blob_id: BlobId,
        offset: u64,
        length: u32,
    },
}

/// A finding streamed by a checker phase.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("failed to list {what}: {source}")]
    ListFailed {
        what: &'static str,
        source: StowError,
    },

    #[error("failed to load index {index_id}: {source}")]
    IndexLoad { index_id: IndexId, source: StowError },

    #[error("index {index_id}: {source}")]
    MalformedIndexId { index_id: IndexId, source: StowError },

    #[error("pack {0} not referenced in any index")]
    OrphanedPack(PackId),

    #[error("pack {0} is referenced by the index but missing from storage")]
    MissingPack(PackId),

    #[error("pack {pack_id}: {source}")]
    PackLoad { pack_id: PackId, source: StowError },

    #[error("failed to load snapshot {snapshot_id}: {source}")]
    SnapshotLoad {
        snapshot_id: SnapshotId,
        source: StowError,
    },

    #[error("snapshot {0} has no tree")]
    SnapshotWithoutTree(SnapshotId),

    #[error(transparent)]
    Tree(TreeError),

    #[error("pack {pack_id}: {}", join_issues(.errors))]
    DataRead {
        pack_id: PackId,
        errors: Vec<DataIssue>,
    },
}

impl CheckError {
    /// Orphaned packs are reclaimable rather than broken; callers decide
    /// whether they count as errors.
    pub fn is_orphaned_pack(&self) -> bool {
        matches!(self, CheckError::OrphanedPack(_))
    }
}

fn join_issues<T: fmt::Display>(issues: &[T]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    /// A traversal branch is verifying this tree right now.
    Active,
    Done,
}

/// Outcome of trying to take ownership of a tree's verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Owned,
    Active,
    Done,
}

pub struct Checker<'a> {
    repo: &'a dyn RepositoryAccess,
    index: IndexMap,
    workers: usize,
    shutdown: Option<&'a AtomicBool>,
    progress: Option<ProgressFn<'a>>,
    /// Visited-blob set shared by structure workers.
    visited: Mutex<HashMap<BlobId, VisitState>>,
}

impl<'a> Checker<'a> {
    pub fn new(repo: &'a dyn RepositoryAccess) -> Self {
        Self {
            repo,
            index: IndexMap::new(),
            workers: DEFAULT_WORKERS,
            shutdown: None,
            progress: None,
            visited: Mutex::new(HashMap::new()),
        }
    }

    /// Size of the worker pool (at least 1).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Stop issuing reads once `flag` is set.
    pub fn with_shutdown(mut self, flag: &'a AtomicBool) -> Self {
        self.shutdown = Some(flag);
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn<'a>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn index(&self) -> &IndexMap {
        &self.index
    }

    /// Pack IDs known to the index.
    pub fn packs(&self) -> HashSet<PackId> {
        self.index.pack_ids().copied().collect()
    }

    /// Number of packs known to the index.
    pub fn count_packs(&self) -> usize {
        self.index.pack_count()
    }

    /// Indexed blobs never reached from any snapshot, sorted.
    ///
    /// Only meaningful once [`check_structure`](Self::check_structure) has
    /// completed; before that every indexed blob is reported.
    pub fn unused_blobs(&self) -> Vec<BlobId> {
        let visited = self.visited();
        let mut unused: Vec<BlobId> = self
            .index
            .blob_ids()
            .filter(|id| !visited.contains_key(id))
            .copied()
            .collect();
        unused.sort();
        unused
    }

    fn interrupted(&self) -> bool {
        self.shutdown.is_some_and(|f| f.load(Ordering::Relaxed))
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.interrupted() {
            return Err(StowError::Interrupted);
        }
        Ok(())
    }

    fn emit(&self, event: CheckProgressEvent) {
        if let Some(callback) = self.progress {
            callback(event);
        }
    }

    fn thread_pool(&self) -> Result<rayon::ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| StowError::Other(format!("failed to build thread pool: {e}")))
    }

    fn visited(&self) -> MutexGuard<'_, HashMap<BlobId, VisitState>> {
        self.visited.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert-if-absent on the visited set.
    fn claim(&self, id: BlobId) -> Claim {
        match self.visited().entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(VisitState::Active);
                Claim::Owned
            }
            Entry::Occupied(slot) => match slot.get() {
                VisitState::Active => Claim::Active,
                VisitState::Done => Claim::Done,
            },
        }
    }

    fn is_done(&self, id: &BlobId) -> bool {
        self.visited().get(id) == Some(&VisitState::Done)
    }

    fn mark_done(&self, id: BlobId) {
        self.visited().insert(id, VisitState::Done);
    }

    fn mark_used(&self, id: BlobId) {
        self.visited().entry(id).or_insert(VisitState::Done);
    }
}
