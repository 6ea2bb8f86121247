use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use stow_types::error::Result;
use stow_types::{BlobId, IndexId, PackId};

use crate::index::{IndexMap, IndexedBlob};
use crate::repo::index_file::IndexFilePack;

use super::{CheckError, Checker, Hint};

impl Checker<'_> {
    /// Load every index file into the in-memory index.
    ///
    /// Returns advisory hints and per-file errors. Files that fail to load
    /// contribute nothing; a malformed record drops only that pack record.
    /// A pack described more than once keeps its first record.
    pub fn load_index(&mut self) -> (Vec<Hint>, Vec<CheckError>) {
        let mut hints = Vec::new();
        let mut errors = Vec::new();

        let mut index_ids = match self.repo.list_index_files() {
            Ok(ids) => ids,
            Err(source) => {
                errors.push(CheckError::ListFailed {
                    what: "index files",
                    source,
                });
                return (hints, errors);
            }
        };
        index_ids.sort();
        info!(files = index_ids.len(), "loading index");

        let mut index = IndexMap::new();
        let mut sources: BTreeMap<PackId, Vec<IndexId>> = BTreeMap::new();

        for index_id in index_ids {
            let file = match self.repo.load_index_file(&index_id) {
                Ok(file) => file,
                Err(source) => {
                    warn!(index = %index_id, error = %source, "failed to load index file");
                    errors.push(CheckError::IndexLoad { index_id, source });
                    continue;
                }
            };
            debug!(index = %index_id, packs = file.packs.len(), "loaded index file");

            for record in &file.packs {
                match parse_pack_record(record) {
                    Ok((pack_id, blobs)) => {
                        sources.entry(pack_id).or_default().push(index_id);
                        index.insert_pack(pack_id, blobs);
                    }
                    Err(source) => {
                        errors.push(CheckError::MalformedIndexId { index_id, source });
                    }
                }
            }
        }

        for (pack_id, mut indexes) in sources {
            if indexes.len() > 1 {
                indexes.dedup();
                hints.push(Hint::DuplicatePack { pack_id, indexes });
            }
        }

        info!(
            packs = index.pack_count(),
            blobs = index.len(),
            hints = hints.len(),
            errors = errors.len(),
            "index loaded"
        );
        self.index = index;
        (hints, errors)
    }
}

fn parse_pack_record(record: &IndexFilePack) -> Result<(PackId, Vec<IndexedBlob>)> {
    let pack_id = PackId::from_hex(&record.id)?;
    let blobs = record
        .blobs
        .iter()
        .map(|b| {
            Ok(IndexedBlob {
                id: BlobId::from_hex(&b.id)?,
                blob_type: b.blob_type,
                offset: b.offset,
                length: b.length,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((pack_id, blobs))
}
