//! Errors raised by the directory cache
//!
//! Everything below the command layer reports failures through [`IndexError`]
//! so callers can tell a held lock apart from a corrupt file or a malformed
//! edit batch. Commands wrap these into `anyhow` errors.

use std::path::PathBuf;

/// Failures of the index table, its sessions and its on-disk format.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Another writer already holds the lock file.
    #[error(
        "Unable to create '{}': File exists. Another process may be running",
        .0.display()
    )]
    Locked(PathBuf),

    /// A write or commit was requested without holding the lock.
    #[error("index is not locked for writing")]
    NotLocked,

    /// Two entries cannot be ordered or deduplicated deterministically.
    #[error("invalid path ordering at '{path}': {reason}")]
    InvalidPathOrdering { path: String, reason: &'static str },

    /// A path is staged both as a file and as a directory of another entry.
    #[error("'{file}' appears as both a file and as a directory of '{nested}'")]
    PathPrefixCollision { file: String, nested: String },

    /// A resolved (stage 0) entry coexists with conflict stages for one path.
    #[error("'{0}' has both resolved and unmerged entries")]
    StageCollision(String),

    /// A content edit or builder entry never received a file mode.
    #[error("file mode not set for path '{0}'")]
    UnsetFileMode(String),

    /// The entry carries a mode the index cannot store.
    #[error("mode {mode:o} is not valid in the index for path '{path}'")]
    UnsupportedMode { path: String, mode: u32 },

    /// A deletion edit was asked to apply content.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    /// A stage number outside 0 to 3.
    #[error("invalid stage {0}")]
    InvalidStage(u8),

    /// The path cannot be staged.
    #[error("invalid path '{0}'")]
    InvalidPath(String),

    /// The index file is malformed.
    #[error("corrupt index file: {0}")]
    Corrupt(String),

    /// The index file uses a format version this crate does not handle.
    #[error("unsupported index file version: {0}")]
    UnsupportedVersion(u32),

    /// Reading or writing the backing store failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
