pub mod blob_id;
pub mod error;
pub mod index_id;
pub mod pack_id;
pub mod snapshot_id;

pub use blob_id::{BlobId, BlobType};
pub use index_id::IndexId;
pub use pack_id::PackId;
pub use snapshot_id::SnapshotId;
