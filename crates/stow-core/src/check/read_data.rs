use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::{debug, info};

use stow_types::error::{Result, StowError};
use stow_types::{BlobId, PackId};

use crate::repo::decode_blob;
use crate::repo::pack::parse_pack_header;

use super::{CheckError, CheckProgressEvent, Checker, DataIssue, ErrorSender, ProgressFn};

impl Checker<'_> {
    /// Re-read every pack in `packs` and verify its bytes end to end.
    ///
    /// Each pack yields at most one [`CheckError::DataRead`] listing all of
    /// its problems. `progress` receives a [`CheckProgressEvent::PackRead`]
    /// after each pack. The stream closes when this returns.
    pub fn read_packs(
        &self,
        packs: &HashSet<PackId>,
        progress: Option<ProgressFn<'_>>,
        tx: ErrorSender,
    ) -> Result<()> {
        let total = packs.len();
        info!(packs = total, "reading pack data");

        let mut ordered: Vec<&PackId> = packs.iter().collect();
        ordered.sort();
        let done = AtomicUsize::new(0);

        let pool = self.thread_pool()?;
        pool.in_place_scope(|s| {
            for pack_id in ordered {
                let tx = tx.clone();
                let done = &done;
                s.spawn(move |_| {
                    if self.interrupted() {
                        return;
                    }
                    let errors = self.verify_pack_data(pack_id);
                    if !errors.is_empty() {
                        debug!(pack = %pack_id, issues = errors.len(), "pack data damaged");
                        let _ = tx.send(CheckError::DataRead {
                            pack_id: *pack_id,
                            errors,
                        });
                    }
                    let n = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if let Some(callback) = progress {
                        callback(CheckProgressEvent::PackRead { done: n, total });
                    }
                });
            }
        });

        self.check_interrupted()
    }

    fn verify_pack_data(&self, pack_id: &PackId) -> Vec<DataIssue> {
        let data = match self.repo.load_pack(pack_id) {
            Ok(data) => data,
            Err(e) => return vec![DataIssue::Load(e.to_string())],
        };

        let mut issues = Vec::new();
        let actual = PackId::compute(&data);
        if actual != *pack_id {
            issues.push(DataIssue::PackIdMismatch { actual });
        }

        let crypto = self.repo.crypto();
        let header = match parse_pack_header(&data, crypto) {
            Ok(header) => header,
            Err(e) => {
                issues.push(DataIssue::Header(e.to_string()));
                return issues;
            }
        };

        for entry in &header {
            // Entry bounds are validated by the header parser.
            let start = entry.offset as usize;
            let stored = &data[start..start + entry.length as usize];
            match decode_blob(stored, entry.blob_type, &entry.blob_id, crypto) {
                Ok(_) => {}
                Err(StowError::BlobIdMismatch { actual, .. }) => {
                    issues.push(DataIssue::BlobIdMismatch {
                        blob_id: entry.blob_id,
                        actual,
                    });
                }
                Err(e) => issues.push(DataIssue::Blob {
                    blob_id: entry.blob_id,
                    reason: e.to_string(),
                }),
            }
        }

        let in_header: HashSet<(BlobId, u64, u32)> = header
            .iter()
            .map(|e| (e.blob_id, e.offset, e.length))
            .collect();
        for blob in self.index.blobs_in_pack(pack_id) {
            if !in_header.contains(&(blob.id, blob.offset, blob.length)) {
                issues.push(DataIssue::NotInPack {
                    blob_id: blob.id,
                    offset: blob.offset,
                    length: blob.length,
                });
            }
        }

        issues
    }
}
