//! Porcelain commands (user-facing Git operations)
//!
//! Porcelain commands provide the high-level user interface for staging.
//! They compose the workspace, the object database and index editing
//! sessions into workflows that match typical Git usage patterns.
//!
//! ## Commands
//!
//! - `init`: Initialize a new repository
//! - `add`: Stage files
//! - `rm --cached`: Unstage files

pub mod add;
pub mod init;
pub mod rm;
