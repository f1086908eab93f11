//! Git index file format and editing sessions
//!
//! The index (also called staging area or directory cache) is a sorted table
//! of staged paths. It is changed only through single-use sessions:
//!
//! - [`builder::IndexBuilder`] rebuilds the whole table from scratch or from
//!   kept ranges of the previous one
//! - [`editor::IndexEditor`] merges a batch of path edits into the table in
//!   one linear pass
//!
//! ## File Format (Versions 2 and 3)
//!
//! ```text
//! Header (12 bytes):
//!   - Signature: "DIRC" (4 bytes)
//!   - Version: 2 or 3 (4 bytes)
//!   - Entry count (4 bytes)
//!
//! Entries (variable length):
//!   - Each entry padded to 8-byte alignment
//!   - Contains metadata and path
//!
//! Extensions (optional, skipped on read)
//!
//! Checksum (20 bytes):
//!   - SHA-1 hash of all preceding bytes
//! ```

pub mod builder;
pub mod checksum;
pub mod editor;
pub mod entry_mode;
pub mod error;
pub mod index_entry;
pub mod index_header;
pub mod lock_file;
pub mod path_cmp;
pub mod table;

/// Size of SHA-1 checksum in bytes
pub const CHECKSUM_SIZE: usize = 20;

/// Size of index header in bytes
pub const HEADER_SIZE: usize = 12;

/// Magic signature identifying index files
pub const SIGNATURE: &[u8; 4] = b"DIRC";

/// Version written when no entry needs extended flags
pub const VERSION: u32 = 2;

/// Version written when some entry carries extended flags
pub const EXTENDED_VERSION: u32 = 3;

/// Index file format versions this crate reads
pub const SUPPORTED_VERSIONS: [u32; 2] = [VERSION, EXTENDED_VERSION];

/// Suffix of the lock file sitting next to the index
pub const LOCK_SUFFIX: &str = ".lock";
