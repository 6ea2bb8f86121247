use stow_types::error::Result;
use stow_types::{BlobId, PackId, SnapshotId};

use crate::check::{CheckError, Checker, ErrorSender, TreeError};
use crate::repo::tree::{Node, Tree};
use crate::testutil::TestRepo;

/// Run one phase to completion and collect everything it streamed.
pub fn drain<F>(phase: F) -> (Result<()>, Vec<CheckError>)
where
    F: FnOnce(ErrorSender) -> Result<()>,
{
    let (tx, rx) = crossbeam_channel::unbounded();
    let outcome = phase(tx);
    (outcome, rx.iter().collect())
}

/// A checker whose index loaded without hints or errors.
pub fn loaded_checker(repo: &TestRepo) -> Checker<'_> {
    let mut checker = Checker::new(repo).with_workers(2);
    let (hints, errors) = checker.load_index();
    assert!(hints.is_empty(), "unexpected hints: {hints:?}");
    assert!(errors.is_empty(), "unexpected index errors: {errors:?}");
    checker
}

pub fn tree_errors(findings: &[CheckError]) -> Vec<&TreeError> {
    findings
        .iter()
        .filter_map(|f| match f {
            CheckError::Tree(err) => Some(err),
            _ => None,
        })
        .collect()
}

/// IDs of a small committed backup: `/a.txt` and `/docs/b.txt`.
pub struct Backup {
    pub file_a: BlobId,
    pub file_b: BlobId,
    pub docs: BlobId,
    pub root: BlobId,
    pub pack: PackId,
    pub snapshot: SnapshotId,
}

pub fn backup(repo: &mut TestRepo) -> Backup {
    let file_a = repo.data_blob(b"alpha contents");
    let file_b = repo.data_blob(b"beta contents");
    let docs = repo.tree_blob(&Tree::new(vec![Node::file("b.txt", vec![file_b])]));
    let root = repo.tree_blob(&Tree::new(vec![
        Node::file("a.txt", vec![file_a]),
        Node::dir("docs", docs),
    ]));
    let pack = repo.commit();
    let snapshot = repo.snapshot(root);
    Backup {
        file_a,
        file_b,
        docs,
        root,
        pack,
        snapshot,
    }
}
