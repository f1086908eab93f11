//! Plumbing commands (low-level Git operations)
//!
//! Plumbing commands provide direct access to the index and the object
//! database. They're primarily used for scripting and as building blocks
//! for porcelain commands.
//!
//! ## Commands
//!
//! - `hash-object`: Compute object ID and optionally store in database
//! - `ls-files`: List staged entries
//! - `read-tree`: Load a tree into the index
//! - `update-index`: Edit index entries directly
//! - `write-tree`: Store the index as tree objects

pub mod hash_object;
pub mod ls_files;
pub mod read_tree;
pub mod update_index;
pub mod write_tree;
