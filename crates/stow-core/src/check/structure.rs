//! Snapshot → tree → blob reachability walk.
//!
//! Each distinct snapshot root is walked by one branch on the worker pool.
//! Branches share the checker's visited set: the branch that first claims a
//! tree verifies it, branches meeting an `Active` tree walk it in shadow
//! mode (descending for cycle detection only), and `Done` trees are pruned.
//! Cycles are found against the branch's own active path, never against the
//! visited set, so diamonds are not reported.
//!
//! Issues for a tree are collected in a shared ledger and sent as one
//! [`TreeError`] once the owner and every shadow walker have left it.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use stow_types::error::Result;
use stow_types::{BlobId, BlobType};

use crate::repo::tree::{NodeType, Tree};

use super::{CheckError, CheckProgressEvent, Checker, Claim, ErrorSender, TreeError, TreeIssue};

/// Shown as the node name when a snapshot's root tree is missing.
const ROOT_NODE: &str = "/";

impl Checker<'_> {
    /// Walk every snapshot and verify the trees and blobs it references.
    ///
    /// Streams snapshot load failures and one [`CheckError::Tree`] per
    /// damaged tree. Records every reached blob for
    /// [`unused_blobs`](Self::unused_blobs). The stream closes when this
    /// returns.
    pub fn check_structure(&self, tx: ErrorSender) -> Result<()> {
        let mut snapshot_ids = match self.repo.list_snapshots() {
            Ok(ids) => ids,
            Err(source) => {
                let _ = tx.send(CheckError::ListFailed {
                    what: "snapshots",
                    source,
                });
                return Ok(());
            }
        };
        snapshot_ids.sort();
        info!(snapshots = snapshot_ids.len(), "checking snapshots, trees and blobs");
        self.emit(CheckProgressEvent::StructureStarted {
            snapshots: snapshot_ids.len(),
        });

        let mut roots = Vec::with_capacity(snapshot_ids.len());
        for snapshot_id in snapshot_ids {
            self.check_interrupted()?;
            match self.repo.load_snapshot(&snapshot_id) {
                Ok(snapshot) => match snapshot.tree {
                    Some(tree) => roots.push(tree),
                    None => {
                        let _ = tx.send(CheckError::SnapshotWithoutTree(snapshot_id));
                    }
                },
                Err(source) => {
                    let _ = tx.send(CheckError::SnapshotLoad {
                        snapshot_id,
                        source,
                    });
                }
            }
        }
        roots.sort();
        roots.dedup();
        debug!(roots = roots.len(), "distinct root trees");

        let ledger = WalkLedger::default();
        let pool = self.thread_pool()?;
        pool.in_place_scope(|s| {
            for root in roots {
                let tx = tx.clone();
                let ledger = &ledger;
                s.spawn(move |_| TreeWalk::new(self, &tx, ledger).run(root));
            }
        });

        // Only walks cut short by cancellation leave entries behind.
        for (id, errors) in ledger.into_unsettled() {
            report_tree(&tx, id, errors);
        }
        self.check_interrupted()
    }
}

/// Per-tree issues gathered while the owner or shadow walkers are inside it.
#[derive(Default)]
struct PendingTree {
    issues: Vec<TreeIssue>,
    shadows: usize,
    owner_left: bool,
}

/// State shared by every branch of one structure walk.
#[derive(Default)]
struct WalkLedger {
    /// Parent/child edges already reported as cycles.
    cycle_edges: Mutex<HashSet<(BlobId, BlobId)>>,
    /// Lock order: `pending`, then the checker's visited set.
    pending: Mutex<HashMap<BlobId, PendingTree>>,
}

impl WalkLedger {
    fn pending(&self) -> MutexGuard<'_, HashMap<BlobId, PendingTree>> {
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the first sighting of a cycle edge.
    fn first_cycle_report(&self, parent: BlobId, child: BlobId) -> bool {
        self.cycle_edges
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert((parent, child))
    }

    /// Join a tree another branch is verifying. Fails once the owner has left.
    fn attach_shadow(&self, checker: &Checker<'_>, id: BlobId) -> bool {
        let mut pending = self.pending();
        if checker.is_done(&id) {
            return false;
        }
        pending.entry(id).or_default().shadows += 1;
        true
    }

    /// Leave a tree. Returns its merged issues when nobody is inside it any
    /// more.
    fn settle(
        &self,
        checker: &Checker<'_>,
        id: BlobId,
        owned: bool,
        issues: Vec<TreeIssue>,
    ) -> Option<Vec<TreeIssue>> {
        let mut pending = self.pending();
        let entry = pending.entry(id).or_default();
        entry.issues.extend(issues);
        if owned {
            checker.mark_done(id);
            entry.owner_left = true;
        } else {
            entry.shadows = entry.shadows.saturating_sub(1);
        }
        let settled = entry.owner_left && entry.shadows == 0;
        if settled {
            pending.remove(&id).map(|tree| tree.issues)
        } else {
            None
        }
    }

    /// Keep the issues of a frame abandoned on cancellation.
    fn deposit(&self, id: BlobId, issues: Vec<TreeIssue>) {
        if issues.is_empty() {
            return;
        }
        self.pending().entry(id).or_default().issues.extend(issues);
    }

    fn into_unsettled(self) -> BTreeMap<BlobId, Vec<TreeIssue>> {
        self.pending
            .into_inner()
            .unwrap_or_else(|e| e.into_inner())
            .into_iter()
            .map(|(id, tree)| (id, tree.issues))
            .collect()
    }
}

fn report_tree(tx: &ErrorSender, id: BlobId, errors: Vec<TreeIssue>) {
    if errors.is_empty() {
        return;
    }
    debug!(tree = %id, issues = errors.len(), "damaged tree");
    let _ = tx.send(CheckError::Tree(TreeError { id, errors }));
}

struct Frame {
    id: BlobId,
    /// Whether this branch verifies the tree, or only walks it in shadow.
    owned: bool,
    subtrees: std::vec::IntoIter<(String, BlobId)>,
    issues: Vec<TreeIssue>,
}

/// Iterative depth-first walk of one snapshot root.
struct TreeWalk<'w, 'a> {
    checker: &'w Checker<'a>,
    tx: &'w ErrorSender,
    ledger: &'w WalkLedger,
    path: Vec<Frame>,
    on_path: HashSet<BlobId>,
    /// Trees this branch has fully walked.
    finished: HashSet<BlobId>,
}

impl<'w, 'a> TreeWalk<'w, 'a> {
    fn new(checker: &'w Checker<'a>, tx: &'w ErrorSender, ledger: &'w WalkLedger) -> Self {
        Self {
            checker,
            tx,
            ledger,
            path: Vec::new(),
            on_path: HashSet::new(),
            finished: HashSet::new(),
        }
    }

    fn run(mut self, root: BlobId) {
        if self.checker.interrupted() {
            return;
        }
        if !self.checker.index.has(&root, BlobType::Tree) {
            if self.checker.claim(root) == Claim::Owned {
                self.checker.mark_done(root);
                report_tree(
                    self.tx,
                    root,
                    vec![TreeIssue::MissingBlob {
                        node: ROOT_NODE.to_string(),
                        blob_id: root,
                        blob_type: BlobType::Tree,
                    }],
                );
            }
            return;
        }
        self.enter(root);
        self.drive();
    }

    fn drive(&mut self) {
        while let Some(top) = self.path.last_mut() {
            if self.checker.interrupted() {
                self.abandon();
                return;
            }
            let Some((node, child)) = top.subtrees.next() else {
                self.leave();
                continue;
            };
            if self.on_path.contains(&child) {
                if self.ledger.first_cycle_report(top.id, child) {
                    top.issues.push(TreeIssue::Cycle {
                        node,
                        subtree: child,
                    });
                }
                continue;
            }
            self.enter(child);
        }
    }

    /// Push a frame for `id`, which is indexed as a tree and not on the path.
    fn enter(&mut self, id: BlobId) {
        if self.finished.contains(&id) {
            return;
        }
        let owned = match self.checker.claim(id) {
            Claim::Owned => true,
            Claim::Active if self.ledger.attach_shadow(self.checker, id) => false,
            Claim::Active | Claim::Done => {
                self.finished.insert(id);
                return;
            }
        };
        let frame = self.load_frame(id, owned);
        self.on_path.insert(id);
        self.path.push(frame);
    }

    fn load_frame(&self, id: BlobId, owned: bool) -> Frame {
        let checker = self.checker;
        let mut issues = Vec::new();
        let mut subtrees = Vec::new();

        let tree = match checker.index.lookup(&id, BlobType::Tree) {
            None => None,
            Some(location) => match checker.repo.load_blob(&id, location) {
                Err(e) => {
                    issues.push(TreeIssue::Load(e.to_string()));
                    None
                }
                Ok(bytes) => match Tree::decode(&bytes) {
                    Err(e) => {
                        issues.push(TreeIssue::Decode(e.to_string()));
                        None
                    }
                    Ok(tree) => Some(tree),
                },
            },
        };

        for node in tree.map(|t| t.nodes).unwrap_or_default() {
            match node.node_type {
                NodeType::File => {
                    for blob in &node.content {
                        checker.mark_used(*blob);
                        if !checker.index.has(blob, BlobType::Data) {
                            issues.push(TreeIssue::MissingBlob {
                                node: node.name.clone(),
                                blob_id: *blob,
                                blob_type: BlobType::Data,
                            });
                        }
                    }
                }
                NodeType::Dir => match node.subtree {
                    None => issues.push(TreeIssue::DirWithoutSubtree { node: node.name }),
                    Some(subtree) if checker.index.has(&subtree, BlobType::Tree) => {
                        subtrees.push((node.name, subtree));
                    }
                    Some(subtree) => issues.push(TreeIssue::MissingBlob {
                        node: node.name,
                        blob_id: subtree,
                        blob_type: BlobType::Tree,
                    }),
                },
                NodeType::Symlink => {}
            }
        }

        if !owned {
            // The owning branch reports these.
            issues.clear();
        }
        Frame {
            id,
            owned,
            subtrees: subtrees.into_iter(),
            issues,
        }
    }

    fn leave(&mut self) {
        let Some(frame) = self.path.pop() else {
            return;
        };
        self.on_path.remove(&frame.id);
        self.finished.insert(frame.id);
        let settled = self
            .ledger
            .settle(self.checker, frame.id, frame.owned, frame.issues);
        if let Some(errors) = settled {
            report_tree(self.tx, frame.id, errors);
        }
    }

    /// Keep findings of every open frame after cancellation.
    fn abandon(&mut self) {
        while let Some(frame) = self.path.pop() {
            self.ledger.deposit(frame.id, frame.issues);
        }
    }
}
