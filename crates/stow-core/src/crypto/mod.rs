use stow_types::error::Result;

/// Trait for encrypting and decrypting repository objects.
pub trait CryptoEngine: Send + Sync {
    /// Encrypt plaintext.
    /// `aad` is authenticated but not encrypted (e.g., the type tag byte).
    fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt data produced by `encrypt`.
    /// `aad` must match what was passed during encryption.
    fn decrypt(&self, data: &[u8], aad: &[u8]) -> Result<Vec<u8>>;

    /// Whether this engine actually encrypts data.
    fn is_encrypting(&self) -> bool;

    /// The key used for computing blob IDs (keyed BLAKE2b-256).
    fn blob_id_key(&self) -> &[u8; 32];
}

/// No-encryption engine. Still computes deterministic blob IDs.
pub struct PlaintextEngine {
    blob_id_key: [u8; 32],
}

impl PlaintextEngine {
    pub fn new(blob_id_key: &[u8; 32]) -> Self {
        Self {
            blob_id_key: *blob_id_key,
        }
    }
}

impl CryptoEngine for PlaintextEngine {
    fn encrypt(&self, plaintext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, data: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn is_encrypting(&self) -> bool {
        false
    }

    fn blob_id_key(&self) -> &[u8; 32] {
        &self.blob_id_key
    }
}
