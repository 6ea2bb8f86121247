pub mod local_backend;

use stow_types::error::Result;

/// Key/value object storage holding a repository.
///
/// Keys are `/`-separated relative paths (`packs/ab/<id>`, `index/<id>`, ...).
/// The checker only reads; `put` and `delete` exist for tooling that builds
/// or damages repositories.
pub trait StorageBackend: Send + Sync {
    /// Read an object. `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Delete an object. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> Result<()>;

    /// List all object keys under `prefix`, recursively.
    fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Size of an object in bytes. `Ok(None)` when the key does not exist.
    fn size(&self, key: &str) -> Result<Option<u64>>;

    /// Read `length` bytes starting at `offset`. `Ok(None)` when the key
    /// does not exist.
    fn get_range(&self, key: &str, offset: u64, length: u64) -> Result<Option<Vec<u8>>>;
}
