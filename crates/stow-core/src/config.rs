use std::path::Path;

use serde::{Deserialize, Serialize};

use stow_types::error::{Result, StowError};

use crate::check::{DataSubset, DEFAULT_WORKERS};
use crate::commands::check::CheckOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StowConfig {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub check: CheckConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub path: String,
    /// Hex-encoded 32-byte key for blob IDs. All zeroes when unset.
    pub blob_id_key: Option<String>,
}

impl RepositoryConfig {
    pub fn blob_id_key(&self) -> Result<[u8; 32]> {
        let Some(hex_key) = &self.blob_id_key else {
            return Ok([0u8; 32]);
        };
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| StowError::Config(format!("blob_id_key: invalid hex: {e}")))?;
        bytes.try_into().map_err(|b: Vec<u8>| {
            StowError::Config(format!("blob_id_key: expected 32 bytes, got {}", b.len()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckConfig {
    #[serde(default)]
    pub read_data: bool,
    /// `n/t` bucket selector, exclusive with `read_data`.
    pub read_data_subset: Option<String>,
    #[serde(default)]
    pub check_unused: bool,
    #[serde(default)]
    pub orphaned_packs_are_errors: bool,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            read_data: false,
            read_data_subset: None,
            check_unused: false,
            orphaned_packs_are_errors: false,
            workers: default_workers(),
        }
    }
}

impl CheckConfig {
    /// Validate and convert into run options.
    pub fn to_options(&self) -> Result<CheckOptions> {
        let read_data = match (self.read_data, self.read_data_subset.as_deref()) {
            (true, Some(_)) => {
                return Err(StowError::Config(
                    "read_data and read_data_subset are mutually exclusive".into(),
                ))
            }
            (true, None) => Some(DataSubset::ALL),
            (false, Some(subset)) => Some(subset.parse::<DataSubset>()?),
            (false, None) => None,
        };
        if self.workers == 0 {
            return Err(StowError::Config("workers must be at least 1".into()));
        }
        Ok(CheckOptions {
            read_data,
            check_unused: self.check_unused,
            orphaned_packs_are_errors: self.orphaned_packs_are_errors,
            workers: self.workers,
        })
    }
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

pub fn load_config(path: &Path) -> Result<StowConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| StowError::Config(format!("cannot read '{}': {e}", path.display())))?;
    let config: StowConfig = serde_yaml::from_str(&contents)
        .map_err(|e| StowError::Config(format!("invalid config '{}': {e}", path.display())))?;
    Ok(config)
}
