//! Command implementations
//!
//! This module contains all command implementations, organized into two categories
//! following Git's architecture:
//!
//! - `plumbing`: Low-level commands working on the index and objects directly
//!   (hash-object, ls-files, update-index, read-tree, write-tree)
//! - `porcelain`: User-facing staging commands (init, add, rm)
//!
//! Every command is an `impl Repository` block. Commands that change the index
//! run inside [`crate::areas::index::Index::transaction`], so they fail at once
//! when another writer holds the lock and never leave a partial index behind.

pub mod plumbing;
pub mod porcelain;
