//! Bucketed selection of packs for partial data verification.
//!
//! Packs are split into `total` buckets by the first byte of their ID, so
//! running buckets `1/t` through `t/t` reads every pack exactly once.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use stow_types::error::{Result, StowError};
use stow_types::PackId;

/// Largest bucket count: one bucket per possible first byte.
pub const MAX_BUCKETS: u32 = 256;

/// Bucket (1-based) of `pack` when packs are split into `total` buckets.
///
/// `total` is clamped to `1..=MAX_BUCKETS`.
pub fn bucket_of(pack: &PackId, total: u32) -> u32 {
    let total = total.clamp(1, MAX_BUCKETS);
    u32::from(pack.first_byte()) % total + 1
}

/// Selector `n/t`: read the packs falling into bucket `n` of `t`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataSubset {
    bucket: u32,
    total: u32,
}

impl DataSubset {
    /// Every pack.
    pub const ALL: DataSubset = DataSubset { bucket: 1, total: 1 };

    pub fn new(bucket: u32, total: u32) -> Result<Self> {
        if bucket == 0 || total == 0 {
            return Err(StowError::InvalidSubset(format!(
                "{bucket}/{total}: values must be positive"
            )));
        }
        if bucket > total {
            return Err(StowError::InvalidSubset(format!(
                "{bucket}/{total}: bucket must not exceed the number of buckets"
            )));
        }
        if total > MAX_BUCKETS {
            return Err(StowError::InvalidSubset(format!(
                "{bucket}/{total}: at most {MAX_BUCKETS} buckets are supported"
            )));
        }
        Ok(Self { bucket, total })
    }

    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn is_all(&self) -> bool {
        self.total == 1
    }

    pub fn contains(&self, pack: &PackId) -> bool {
        bucket_of(pack, self.total) == self.bucket
    }

    /// Packs of `packs` that fall into this bucket.
    pub fn select<'p>(&self, packs: impl IntoIterator<Item = &'p PackId>) -> HashSet<PackId> {
        packs
            .into_iter()
            .filter(|p| self.contains(p))
            .copied()
            .collect()
    }
}

impl FromStr for DataSubset {
    type Err = StowError;

    fn from_str(s: &str) -> Result<Self> {
        let (bucket, total) = s
            .split_once('/')
            .ok_or_else(|| StowError::InvalidSubset(format!("'{s}': expected n/t")))?;
        let parse = |part: &str| {
            part.trim().parse::<u32>().map_err(|e| {
                StowError::InvalidSubset(format!("'{s}': '{part}' is not a positive number: {e}"))
            })
        };
        Self::new(parse(bucket)?, parse(total)?)
    }
}

impl fmt::Display for DataSubset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bucket, self.total)
    }
}
