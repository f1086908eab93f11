//! Index entry representation
//!
//! Each entry in the index represents one staged path at one stage with:
//! - Path bytes (immutable once the entry exists)
//! - Stage (0 when resolved, 1/2/3 for base/ours/theirs during a conflict)
//! - Content hash (object ID) and file mode
//! - Stat metadata used for change detection
//!
//! ## Entry Format
//!
//! Entries are stored in a binary format padded with NUL bytes to 8-byte
//! alignment. The 16-bit flags word packs the assume-valid bit, the extended
//! bit, the stage and the path length; version 3 adds a second flags word.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::path_cmp;
use crate::artifacts::objects::object_id::ObjectId;
use bitflags::bitflags;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fs::Metadata;
use std::io::{Read, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::prelude::MetadataExt;
use std::path::Path;

/// Longest path length representable in the flags word
const MAX_PATH_SIZE: usize = 0xFFF;

/// Block size for entry alignment (8 bytes)
pub const ENTRY_BLOCK: usize = 8;

/// Size of an entry before its path, without the extended flags word
pub const ENTRY_FIXED_SIZE: usize = 62;

const FLAG_ASSUME_VALID: u16 = 0x8000;
const FLAG_EXTENDED: u16 = 0x4000;
const FLAG_STAGE_SHIFT: u16 = 12;
const FLAG_NAME_MASK: u16 = 0x0FFF;
const EXT_FLAG_SKIP_WORKTREE: u16 = 0x4000;
const EXT_FLAG_INTENT_TO_ADD: u16 = 0x2000;

/// Merge stage of an entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// Normal, resolved entry
    #[default]
    Merged = 0,
    /// Common ancestor version
    Base = 1,
    /// Current branch version
    Ours = 2,
    /// Version being merged in
    Theirs = 3,
}

impl Stage {
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn is_conflict(&self) -> bool {
        *self != Stage::Merged
    }
}

impl TryFrom<u8> for Stage {
    type Error = IndexError;

    fn try_from(value: u8) -> IndexResult<Self> {
        match value {
            0 => Ok(Stage::Merged),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(IndexError::InvalidStage(value)),
        }
    }
}

bitflags! {
    /// Per-entry switches persisted in the flags words
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct EntryFlags: u8 {
        const ASSUME_VALID = 1;
        const SKIP_WORKTREE = 1 << 1;
        const INTENT_TO_ADD = 1 << 2;
    }
}

impl EntryFlags {
    /// Whether the entry needs the version 3 extended flags word
    pub fn is_extended(&self) -> bool {
        self.intersects(EntryFlags::SKIP_WORKTREE | EntryFlags::INTENT_TO_ADD)
    }
}

/// File metadata stored in index entries
///
/// Stat information lets Git detect changes without rehashing content. None
/// of it takes part in the ordering of entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    /// Change time (seconds since Unix epoch)
    pub ctime: i64,
    /// Change time nanoseconds
    pub ctime_nsec: i64,
    /// Modification time (seconds since Unix epoch)
    pub mtime: i64,
    /// Modification time nanoseconds
    pub mtime_nsec: i64,
    /// Device ID
    pub dev: u64,
    /// Inode number
    pub ino: u64,
    /// User ID of owner
    pub uid: u32,
    /// Group ID of owner
    pub gid: u32,
    /// File size in bytes
    pub size: u64,
}

impl From<&Metadata> for EntryMetadata {
    fn from(metadata: &Metadata) -> Self {
        Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
        }
    }
}

/// One staged path at one stage
///
/// The path and stage are fixed at construction: renaming a path or moving it
/// between stages means building a new entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    path: Bytes,
    stage: Stage,
    /// How `oid` is interpreted
    pub mode: EntryMode,
    /// Content this path points at
    pub oid: ObjectId,
    /// Stat data copied from the working tree
    pub metadata: EntryMetadata,
    pub flags: EntryFlags,
}

impl IndexEntry {
    /// Create a zero-valued entry with an unset mode
    pub fn new(path: impl AsRef<[u8]>, stage: Stage) -> IndexResult<Self> {
        let path = path.as_ref();
        validate_path(path)?;

        Ok(Self::with_checked_path(Bytes::copy_from_slice(path), stage))
    }

    /// Create a fully populated stage 0 entry from a working tree path
    pub fn from_path(
        path: &Path,
        oid: ObjectId,
        mode: EntryMode,
        metadata: EntryMetadata,
    ) -> IndexResult<Self> {
        let mut entry = Self::new(path.as_os_str().as_bytes(), Stage::Merged)?;
        entry.oid = oid;
        entry.mode = mode;
        entry.metadata = metadata;

        Ok(entry)
    }

    pub(crate) fn with_checked_path(path: Bytes, stage: Stage) -> Self {
        IndexEntry {
            path,
            stage,
            mode: EntryMode::Missing,
            oid: ObjectId::default(),
            metadata: EntryMetadata::default(),
            flags: EntryFlags::empty(),
        }
    }

    pub fn path(&self) -> &[u8] {
        &self.path
    }

    pub fn path_bytes(&self) -> &Bytes {
        &self.path
    }

    /// Path for display; invalid UTF-8 is replaced
    pub fn path_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_merged(&self) -> bool {
        !self.stage.is_conflict()
    }

    pub fn basename(&self) -> &[u8] {
        match self.path.iter().rposition(|byte| *byte == path_cmp::SEPARATOR) {
            Some(position) => &self.path[position + 1..],
            None => &self.path,
        }
    }

    pub fn parent_dirs(&self) -> impl Iterator<Item = &[u8]> {
        path_cmp::parent_dirs(&self.path)
    }

    /// Order by `(path, stage)`, the index table order
    pub fn compare_position(&self, other: &IndexEntry) -> Ordering {
        path_cmp::compare_staged(
            &self.path,
            self.stage.as_u8(),
            &other.path,
            other.stage.as_u8(),
        )
    }

    pub fn stat_match(&self, mode: EntryMode, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size) && self.mode == mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }

    /// Encode the entry for an index file of the given version
    pub fn serialize(&self, version: u32) -> IndexResult<Bytes> {
        let extended = version >= 3 && self.flags.is_extended();
        let fixed_size = if extended {
            ENTRY_FIXED_SIZE + 2
        } else {
            ENTRY_FIXED_SIZE
        };

        let mut entry_bytes = Vec::with_capacity(fixed_size + self.path.len() + ENTRY_BLOCK);
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.ctime as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.ctime_nsec as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.mtime as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.mtime_nsec as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.dev as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.ino as u32)?;
        entry_bytes.write_u32::<NetworkEndian>(self.mode.as_u32())?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.uid)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.gid)?;
        entry_bytes.write_u32::<NetworkEndian>(self.metadata.size as u32)?;
        self.oid.write_h40_to(&mut entry_bytes)?;

        let mut flags = self.path.len().min(MAX_PATH_SIZE) as u16;
        flags |= (self.stage.as_u8() as u16) << FLAG_STAGE_SHIFT;
        if self.flags.contains(EntryFlags::ASSUME_VALID) {
            flags |= FLAG_ASSUME_VALID;
        }
        if extended {
            flags |= FLAG_EXTENDED;
        }
        entry_bytes.write_u16::<NetworkEndian>(flags)?;

        if extended {
            let mut extended_flags = 0u16;
            if self.flags.contains(EntryFlags::SKIP_WORKTREE) {
                extended_flags |= EXT_FLAG_SKIP_WORKTREE;
            }
            if self.flags.contains(EntryFlags::INTENT_TO_ADD) {
                extended_flags |= EXT_FLAG_INTENT_TO_ADD;
            }
            entry_bytes.write_u16::<NetworkEndian>(extended_flags)?;
        }

        entry_bytes.write_all(&self.path)?;

        // at least one NUL terminates the path, the rest pads to ENTRY_BLOCK
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }

    /// Decode one entry, consuming its padding
    pub fn deserialize(reader: &mut impl Read, version: u32) -> IndexResult<Self> {
        let ctime = reader.read_u32::<NetworkEndian>()? as i64;
        let ctime_nsec = reader.read_u32::<NetworkEndian>()? as i64;
        let mtime = reader.read_u32::<NetworkEndian>()? as i64;
        let mtime_nsec = reader.read_u32::<NetworkEndian>()? as i64;
        let dev = reader.read_u32::<NetworkEndian>()? as u64;
        let ino = reader.read_u32::<NetworkEndian>()? as u64;
        let raw_mode = reader.read_u32::<NetworkEndian>()?;
        let uid = reader.read_u32::<NetworkEndian>()?;
        let gid = reader.read_u32::<NetworkEndian>()?;
        let size = reader.read_u32::<NetworkEndian>()? as u64;
        let oid = ObjectId::read_h40_from(reader)?;
        let raw_flags = reader.read_u16::<NetworkEndian>()?;

        let mode = EntryMode::try_from(raw_mode)
            .ok()
            .filter(EntryMode::is_stageable)
            .ok_or_else(|| IndexError::Corrupt(format!("invalid entry mode {:o}", raw_mode)))?;

        let stage = Stage::try_from(((raw_flags >> FLAG_STAGE_SHIFT) & 0x3) as u8)?;

        let mut flags = EntryFlags::empty();
        if raw_flags & FLAG_ASSUME_VALID != 0 {
            flags |= EntryFlags::ASSUME_VALID;
        }

        let mut fixed_size = ENTRY_FIXED_SIZE;
        if raw_flags & FLAG_EXTENDED != 0 {
            if version < 3 {
                return Err(IndexError::Corrupt(
                    "extended entry flags in a version 2 index".to_string(),
                ));
            }
            let extended_flags = reader.read_u16::<NetworkEndian>()?;
            if extended_flags & EXT_FLAG_SKIP_WORKTREE != 0 {
                flags |= EntryFlags::SKIP_WORKTREE;
            }
            if extended_flags & EXT_FLAG_INTENT_TO_ADD != 0 {
                flags |= EntryFlags::INTENT_TO_ADD;
            }
            fixed_size += 2;
        }

        let name_length = (raw_flags & FLAG_NAME_MASK) as usize;
        let (path, consumed) = if name_length < MAX_PATH_SIZE {
            let mut path = vec![0u8; name_length];
            reader.read_exact(&mut path)?;
            (path, name_length)
        } else {
            // the flags word saturated, the NUL terminator marks the end
            let mut path = Vec::with_capacity(MAX_PATH_SIZE * 2);
            loop {
                let byte = reader.read_u8()?;
                if byte == 0 {
                    break;
                }
                path.push(byte);
            }
            let consumed = path.len() + 1;
            (path, consumed)
        };

        let record_size = (fixed_size + path.len() + ENTRY_BLOCK) & !(ENTRY_BLOCK - 1);
        let mut padding = vec![0u8; record_size - fixed_size - consumed];
        reader.read_exact(&mut padding)?;
        if name_length < MAX_PATH_SIZE && padding.first() != Some(&0) {
            return Err(IndexError::Corrupt(format!(
                "path of entry '{}' is not NUL terminated",
                String::from_utf8_lossy(&path)
            )));
        }

        let mut entry = IndexEntry::new(&path, stage)
            .map_err(|e| IndexError::Corrupt(e.to_string()))?;
        entry.mode = mode;
        entry.oid = oid;
        entry.flags = flags;
        entry.metadata = EntryMetadata {
            ctime,
            ctime_nsec,
            mtime,
            mtime_nsec,
            dev,
            ino,
            uid,
            gid,
            size,
        };

        Ok(entry)
    }
}

/// Reject paths Git refuses to stage
pub fn validate_path(path: &[u8]) -> IndexResult<()> {
    let invalid = || IndexError::InvalidPath(String::from_utf8_lossy(path).into_owned());

    if path.is_empty() || path.contains(&0) {
        return Err(invalid());
    }

    for component in path.split(|byte| *byte == path_cmp::SEPARATOR) {
        if component.is_empty()
            || component == b"."
            || component == b".."
            || component.eq_ignore_ascii_case(b".git")
        {
            return Err(invalid());
        }
    }

    Ok(())
}
