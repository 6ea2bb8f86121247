use serde::{Deserialize, Serialize};

use stow_types::error::{Result, StowError};
use stow_types::{BlobId, BlobType, PackId};

use crate::crypto::CryptoEngine;
use crate::storage::StorageBackend;

use super::format::{pack_object, unpack_object_expect, ObjectType};

/// Magic bytes at the start of every pack file.
pub const PACK_MAGIC: &[u8; 8] = b"STOWPACK";
/// Pack format version.
pub const PACK_VERSION: u8 = 1;
/// Size of the pack header (magic + version byte).
pub const PACK_HEADER_SIZE: usize = 9;

/// One entry in the pack's trailing header. Describes a single blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackHeaderEntry {
    pub blob_type: BlobType,
    pub blob_id: BlobId,
    /// Offset of the blob's stored bytes (past its 4-byte length prefix).
    pub offset: u64,
    pub length: u32,
}

/// Accumulates enveloped blobs and seals them into a pack file.
///
/// Layout: `[magic][version]([u32 LE len][blob])*[enveloped header][u32 LE header len]`.
pub struct PackWriter {
    pack_bytes: Vec<u8>,
    entries: Vec<PackHeaderEntry>,
}

impl Default for PackWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl PackWriter {
    pub fn new() -> Self {
        Self {
            pack_bytes: Vec::new(),
            entries: Vec::new(),
        }
    }

    /// Append an enveloped blob. Returns the offset where its bytes start.
    pub fn add_blob(&mut self, blob_type: BlobType, blob_id: BlobId, stored: &[u8]) -> u64 {
        if self.entries.is_empty() {
            self.pack_bytes.extend_from_slice(PACK_MAGIC);
            self.pack_bytes.push(PACK_VERSION);
        }
        let length = stored.len() as u32;
        self.pack_bytes.extend_from_slice(&length.to_le_bytes());
        let offset = self.pack_bytes.len() as u64;
        self.pack_bytes.extend_from_slice(stored);

        self.entries.push(PackHeaderEntry {
            blob_type,
            blob_id,
            offset,
            length,
        });
        offset
    }

    /// Append the header trailer, compute the PackId, and reset the writer.
    /// Returns `(pack_id, pack_bytes, header entries)`.
    pub fn seal(
        &mut self,
        crypto: &dyn CryptoEngine,
    ) -> Result<(PackId, Vec<u8>, Vec<PackHeaderEntry>)> {
        if self.entries.is_empty() {
            return Err(StowError::Other("cannot seal empty pack writer".into()));
        }

        let header_bytes = rmp_serde::to_vec(&self.entries)?;
        let encrypted_header = pack_object(ObjectType::PackHeader, &header_bytes, crypto)?;
        let header_len = encrypted_header.len() as u32;

        let mut pack_bytes = std::mem::take(&mut self.pack_bytes);
        pack_bytes.extend_from_slice(&encrypted_header);
        pack_bytes.extend_from_slice(&header_len.to_le_bytes());
        let entries = std::mem::take(&mut self.entries);

        Ok((PackId::compute(&pack_bytes), pack_bytes, entries))
    }

    /// Seal and upload. Returns the pack ID and its header entries.
    pub fn flush(
        &mut self,
        storage: &dyn StorageBackend,
        crypto: &dyn CryptoEngine,
    ) -> Result<(PackId, Vec<PackHeaderEntry>)> {
        let (pack_id, pack_bytes, entries) = self.seal(crypto)?;
        storage.put(&pack_id.storage_key(), &pack_bytes)?;
        Ok((pack_id, entries))
    }
}

/// Parse and decrypt the trailing header of an in-memory pack file.
///
/// Validates magic, version, header length and that every entry lies within
/// the blob region.
pub fn parse_pack_header(
    pack_data: &[u8],
    crypto: &dyn CryptoEngine,
) -> Result<Vec<PackHeaderEntry>> {
    let size = pack_data.len() as u64;
    check_pack_size(size)?;
    check_pack_prefix(&pack_data[..PACK_HEADER_SIZE])?;

    let len_offset = pack_data.len() - 4;
    let (header_start, header_len) = header_region(size, &pack_data[len_offset..])?;
    let header_start = header_start as usize;
    decode_header(
        &pack_data[header_start..header_start + header_len],
        header_start as u64,
        crypto,
    )
}

/// Read and validate a stored pack's header without fetching its blobs.
///
/// Issues range reads for the prefix, the length trailer and the header.
pub fn read_pack_header(
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    crypto: &dyn CryptoEngine,
) -> Result<Vec<PackHeaderEntry>> {
    let key = pack_id.storage_key();
    let missing = || StowError::NotFound(format!("pack {pack_id}"));
    let size = storage.size(&key)?.ok_or_else(missing)?;
    check_pack_size(size)?;

    let prefix = storage
        .get_range(&key, 0, PACK_HEADER_SIZE as u64)?
        .ok_or_else(missing)?;
    check_pack_prefix(&prefix)?;

    let len_field = storage.get_range(&key, size - 4, 4)?.ok_or_else(missing)?;
    let (header_start, header_len) = header_region(size, &len_field)?;
    let header = storage
        .get_range(&key, header_start, header_len as u64)?
        .ok_or_else(missing)?;
    decode_header(&header, header_start, crypto)
}

fn check_pack_size(size: u64) -> Result<()> {
    if size < (PACK_HEADER_SIZE + 4) as u64 {
        return Err(StowError::InvalidFormat("pack too small".into()));
    }
    Ok(())
}

fn check_pack_prefix(prefix: &[u8]) -> Result<()> {
    if prefix.len() < PACK_HEADER_SIZE || &prefix[..8] != PACK_MAGIC {
        return Err(StowError::InvalidFormat("invalid pack magic".into()));
    }
    if prefix[8] != PACK_VERSION {
        return Err(StowError::InvalidFormat(format!(
            "unsupported pack version {}",
            prefix[8]
        )));
    }
    Ok(())
}

/// Locate the enveloped header from the trailing length field.
/// Returns `(start offset, length)`.
fn header_region(size: u64, len_field: &[u8]) -> Result<(u64, usize)> {
    let header_len = u32::from_le_bytes(
        len_field
            .try_into()
            .map_err(|_| StowError::InvalidFormat("invalid pack header length field".into()))?,
    ) as u64;
    let len_offset = size - 4;
    if header_len > len_offset - PACK_HEADER_SIZE as u64 {
        return Err(StowError::InvalidFormat("invalid pack header length".into()));
    }
    Ok((len_offset - header_len, header_len as usize))
}

/// Decrypt header entries and check each lies before `blobs_end`.
fn decode_header(
    header: &[u8],
    blobs_end: u64,
    crypto: &dyn CryptoEngine,
) -> Result<Vec<PackHeaderEntry>> {
    let header_bytes = unpack_object_expect(header, ObjectType::PackHeader, crypto)?;
    let entries: Vec<PackHeaderEntry> = rmp_serde::from_slice(&header_bytes)?;

    for entry in &entries {
        let in_bounds = match entry.offset.checked_add(entry.length as u64) {
            Some(end) => entry.offset >= (PACK_HEADER_SIZE + 4) as u64 && end <= blobs_end,
            None => false,
        };
        if !in_bounds {
            return Err(StowError::InvalidFormat(format!(
                "blob {} at offset {} (length {}) lies outside the pack data region",
                entry.blob_id, entry.offset, entry.length
            )));
        }
    }
    Ok(entries)
}

/// Load a pack file in full. Missing packs are an error.
pub fn read_pack(storage: &dyn StorageBackend, pack_id: &PackId) -> Result<Vec<u8>> {
    storage
        .get(&pack_id.storage_key())?
        .ok_or_else(|| StowError::NotFound(format!("pack {pack_id}")))
}

/// Read a single stored blob from a pack file using a range read.
pub fn read_blob_from_pack(
    storage: &dyn StorageBackend,
    pack_id: &PackId,
    offset: u64,
    length: u32,
) -> Result<Vec<u8>> {
    storage
        .get_range(&pack_id.storage_key(), offset, length as u64)?
        .ok_or_else(|| StowError::NotFound(format!("pack {pack_id}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PlaintextEngine;
    use crate::testutil::MemoryBackend;

    fn engine() -> PlaintextEngine {
        PlaintextEngine::new(&[0u8; 32])
    }

    fn sealed_pack(blobs: &[(BlobId, Vec<u8>)]) -> (PackId, Vec<u8>, Vec<PackHeaderEntry>) {
        let mut w = PackWriter::new();
        for (id, data) in blobs {
            w.add_blob(BlobType::Data, *id, data);
        }
        w.seal(&engine()).unwrap()
    }

    #[test]
    fn seal_then_parse_returns_same_entries() {
        let blobs = vec![
            (BlobId([1; 32]), vec![10u8; 50]),
            (BlobId([2; 32]), vec![20u8; 80]),
        ];
        let (pack_id, bytes, entries) = sealed_pack(&blobs);

        assert_eq!(pack_id, PackId::compute(&bytes));
        let parsed = parse_pack_header(&bytes, &engine()).unwrap();
        assert_eq!(parsed, entries);
        assert_eq!(parsed[0].offset, (PACK_HEADER_SIZE + 4) as u64);
        assert_eq!(parsed[1].offset, (PACK_HEADER_SIZE + 4 + 50 + 4) as u64);
        let start = parsed[1].offset as usize;
        assert_eq!(&bytes[start..start + 80], &blobs[1].1[..]);
    }

    #[test]
    fn seal_empty_writer_fails() {
        let mut w = PackWriter::new();
        assert!(w.seal(&engine()).is_err());
    }

    #[test]
    fn parse_rejects_truncated_and_foreign_files() {
        let (_, bytes, _) = sealed_pack(&[(BlobId([3; 32]), vec![1, 2, 3])]);

        assert!(parse_pack_header(&bytes[..6], &engine()).is_err());
        assert!(parse_pack_header(&bytes[..bytes.len() - 2], &engine()).is_err());

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(parse_pack_header(&bad_magic, &engine()).is_err());
    }

    #[test]
    fn parse_rejects_oversized_header_length() {
        let (_, mut bytes, _) = sealed_pack(&[(BlobId([4; 32]), vec![9; 16])]);
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            parse_pack_header(&bytes, &engine()),
            Err(StowError::InvalidFormat(_))
        ));
    }

    #[test]
    fn flush_uploads_under_pack_key() {
        let storage = MemoryBackend::new();
        let mut w = PackWriter::new();
        w.add_blob(BlobType::Tree, BlobId([5; 32]), b"tree");
        let (pack_id, entries) = w.flush(&storage, &engine()).unwrap();

        let bytes = read_pack(&storage, &pack_id).unwrap();
        assert_eq!(PackId::compute(&bytes), pack_id);
        let e = &entries[0];
        assert_eq!(
            read_blob_from_pack(&storage, &pack_id, e.offset, e.length).unwrap(),
            b"tree"
        );
    }

    #[test]
    fn read_pack_header_matches_in_memory_parse() {
        let storage = MemoryBackend::new();
        let mut w = PackWriter::new();
        w.add_blob(BlobType::Data, BlobId([6; 32]), &[1; 64]);
        w.add_blob(BlobType::Tree, BlobId([7; 32]), b"tree");
        let (pack_id, entries) = w.flush(&storage, &engine()).unwrap();

        assert_eq!(read_pack_header(&storage, &pack_id, &engine()).unwrap(), entries);
        let bytes = read_pack(&storage, &pack_id).unwrap();
        assert_eq!(parse_pack_header(&bytes, &engine()).unwrap(), entries);
    }

    #[test]
    fn read_pack_header_rejects_bad_trailer() {
        let storage = MemoryBackend::new();
        let (pack_id, mut bytes, _) = sealed_pack(&[(BlobId([8; 32]), vec![2; 32])]);
        let n = bytes.len();
        bytes[n - 4..].copy_from_slice(&u32::MAX.to_le_bytes());
        storage.put(&pack_id.storage_key(), &bytes).unwrap();

        assert!(matches!(
            read_pack_header(&storage, &pack_id, &engine()),
            Err(StowError::InvalidFormat(_))
        ));
        assert!(matches!(
            read_pack_header(&storage, &PackId([9; 32]), &engine()),
            Err(StowError::NotFound(_))
        ));
    }

    #[test]
    fn read_pack_reports_missing_pack() {
        let storage = MemoryBackend::new();
        assert!(matches!(
            read_pack(&storage, &PackId([7; 32])),
            Err(StowError::NotFound(_))
        ));
    }
}
