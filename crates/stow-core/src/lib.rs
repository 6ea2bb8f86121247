pub mod check;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod index;
pub mod repo;
pub mod storage;

pub use stow_types::error;

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
