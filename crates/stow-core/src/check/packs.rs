use std::collections::HashSet;

use tracing::{debug, info};

use stow_types::error::Result;
use stow_types::PackId;

use super::{CheckError, CheckProgressEvent, Checker, ErrorSender};

impl Checker<'_> {
    /// Reconcile the packs in storage against the index.
    ///
    /// Streams [`CheckError::MissingPack`] for indexed packs absent from
    /// storage, then at most one finding per stored pack: orphaned (not
    /// indexed) or a failure to open its header. The stream closes when this
    /// returns.
    pub fn check_packs(&self, tx: ErrorSender) -> Result<()> {
        let stored: HashSet<PackId> = match self.repo.list_packs() {
            Ok(ids) => ids.into_iter().collect(),
            Err(source) => {
                let _ = tx.send(CheckError::ListFailed {
                    what: "packs",
                    source,
                });
                return Ok(());
            }
        };
        info!(stored = stored.len(), indexed = self.count_packs(), "checking packs");
        self.emit(CheckProgressEvent::PacksCheckStarted {
            packs: stored.len(),
        });

        let mut missing: Vec<PackId> = self
            .index
            .pack_ids()
            .filter(|id| !stored.contains(id))
            .copied()
            .collect();
        missing.sort();
        for pack_id in missing {
            let _ = tx.send(CheckError::MissingPack(pack_id));
        }

        let mut ordered: Vec<&PackId> = stored.iter().collect();
        ordered.sort();

        let pool = self.thread_pool()?;
        pool.in_place_scope(|s| {
            for pack_id in ordered {
                let tx = tx.clone();
                s.spawn(move |_| {
                    if self.interrupted() {
                        return;
                    }
                    if let Some(err) = self.check_pack(pack_id) {
                        let _ = tx.send(err);
                    }
                });
            }
        });

        self.check_interrupted()
    }

    fn check_pack(&self, pack_id: &PackId) -> Option<CheckError> {
        if !self.index.contains_pack(pack_id) {
            debug!(pack = %pack_id, "pack not referenced by the index");
            return Some(CheckError::OrphanedPack(*pack_id));
        }
        match self.repo.pack_header(pack_id) {
            Ok(_) => None,
            Err(source) => Some(CheckError::PackLoad {
                pack_id: *pack_id,
                source,
            }),
        }
    }
}
