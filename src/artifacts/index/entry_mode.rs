//! File modes of index and tree entries
//!
//! Git stores the mode as a 32-bit value whose upper bits select the object
//! kind (regular file, symlink, gitlink, tree) and whose lower bits carry the
//! permissions. Only the handful of canonical values below are ever written.

use std::fs::Metadata;
use std::path::Path;

use is_executable::IsExecutable;

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum FileMode {
    #[default]
    Regular,
    Executable,
}

#[derive(Debug, Clone, Copy, Eq, Ord, Default, PartialEq, PartialOrd, Hash)]
pub enum EntryMode {
    /// Mode of a freshly synthesised entry that no edit has filled in yet
    #[default]
    Missing,
    File(FileMode),
    Symlink,
    Gitlink,
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &str {
        match self {
            EntryMode::Missing => "0",
            EntryMode::File(FileMode::Regular) => "100644",
            EntryMode::File(FileMode::Executable) => "100755",
            EntryMode::Symlink => "120000",
            EntryMode::Gitlink => "160000",
            EntryMode::Directory => "40000",
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            EntryMode::Missing => 0,
            EntryMode::File(FileMode::Regular) => 0o100644,
            EntryMode::File(FileMode::Executable) => 0o100755,
            EntryMode::Symlink => 0o120000,
            EntryMode::Gitlink => 0o160000,
            EntryMode::Directory => 0o40000,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, EntryMode::Missing)
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }

    /// Whether the mode may appear in a persisted index entry
    pub fn is_stageable(&self) -> bool {
        matches!(
            self,
            EntryMode::File(_) | EntryMode::Symlink | EntryMode::Gitlink
        )
    }

    /// Parse the octal form used in tree objects and on the command line
    pub fn from_octal_str(value: &str) -> anyhow::Result<Self> {
        let raw = u32::from_str_radix(value, 8)
            .map_err(|_| anyhow::anyhow!("Invalid entry mode: {}", value))?;

        EntryMode::try_from(raw)
    }

    /// Derive the mode of a working tree file from its (symlink) metadata
    pub fn from_metadata(file_path: &Path, metadata: &Metadata) -> Self {
        if metadata.file_type().is_symlink() {
            EntryMode::Symlink
        } else if metadata.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        }
    }
}

impl TryFrom<u32> for EntryMode {
    type Error = anyhow::Error;

    fn try_from(mode: u32) -> anyhow::Result<Self> {
        match mode {
            0 => Ok(EntryMode::Missing),
            0o100644 => Ok(EntryMode::File(FileMode::Regular)),
            0o100755 => Ok(EntryMode::File(FileMode::Executable)),
            // older trees may carry group-writable files
            0o100664 => Ok(EntryMode::File(FileMode::Regular)),
            0o120000 => Ok(EntryMode::Symlink),
            0o160000 => Ok(EntryMode::Gitlink),
            0o40000 => Ok(EntryMode::Directory),
            _ => Err(anyhow::anyhow!("Invalid entry mode: {:o}", mode)),
        }
    }
}

impl From<EntryMode> for u32 {
    fn from(mode: EntryMode) -> Self {
        mode.as_u32()
    }
}

impl From<FileMode> for EntryMode {
    fn from(mode: FileMode) -> Self {
        EntryMode::File(mode)
    }
}

impl TryFrom<EntryMode> for FileMode {
    type Error = anyhow::Error;

    fn try_from(value: EntryMode) -> anyhow::Result<Self> {
        match value {
            EntryMode::File(mode) => Ok(mode),
            _ => Err(anyhow::anyhow!("Invalid file mode: {}", value.as_str())),
        }
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:06o}", self.as_u32())
    }
}
