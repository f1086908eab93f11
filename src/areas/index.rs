//! Git index (staging area)
//!
//! The index is a table of staged entries sorted by `(path, stage)`. It sits
//! between the working tree and the object database: commands read it to find
//! what is staged and change it through a builder or an editor session.
//!
//! ## Index File Format
//!
//! The index file contains:
//! - Header: Signature, version, and entry count
//! - Entries: Sorted list of tracked files with metadata
//! - Extensions: Optional cached data, skipped when reading
//! - Checksum: SHA-1 hash of the entire index for integrity verification
//!
//! ## Table replacement
//!
//! The entries live in a shared immutable array. Sessions never edit it in
//! place: they build a new array and swap it in when they finish, so a reader
//! holding a [`Index::snapshot`] keeps a consistent view.
//!
//! ## Locking
//!
//! Writers first take the lock file (`index.lock`), then read, edit and
//! commit. Readers take a shared advisory lock on the index file while
//! reading it.

use crate::artifacts::index::builder::IndexBuilder;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::editor::IndexEditor;
use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::lock_file::LockFile;
use crate::artifacts::index::{
    CHECKSUM_SIZE, EXTENDED_VERSION, HEADER_SIZE, SIGNATURE, VERSION, path_cmp, table,
};
use byteorder::{NetworkEndian, ReadBytesExt};
use std::io::{Cursor, ErrorKind, Read, Write};
use std::ops::DerefMut;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Size of an extension header (signature and length)
const EXTENSION_HEADER_SIZE: usize = 8;

/// Identity of the index file as last read or written
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileSnapshot {
    modified: Option<SystemTime>,
    len: u64,
    ino: u64,
}

impl FileSnapshot {
    fn of(path: &Path) -> IndexResult<Option<Self>> {
        match std::fs::metadata(path) {
            Ok(metadata) => Ok(Some(FileSnapshot {
                modified: metadata.modified().ok(),
                len: metadata.len(),
                ino: metadata.ino(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Git index (staging area)
///
/// Owns the sorted entry table and, while a write session is open, the lock
/// on the backing file.
#[derive(Debug)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    /// Staged entries sorted by path, then stage
    entries: Arc<[IndexEntry]>,
    /// Format version of the file last read or written
    version: u32,
    /// Held between `lock` and `commit`/`unlock`
    lock: Option<LockFile>,
    /// File identity at the last read or commit
    snapshot: Option<FileSnapshot>,
}

impl Index {
    /// Create a new empty index
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the index file (typically `.git/index`)
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: Arc::from(Vec::new()),
            version: VERSION,
            lock: None,
            snapshot: None,
        }
    }

    /// Get the path to the index file
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn is_locked(&self) -> bool {
        self.lock.is_some()
    }

    /// Load the index from disk
    ///
    /// A missing or empty file yields an empty table. The header, every
    /// entry and the checksum are verified, and the table invariants are
    /// checked before the loaded entries replace the current ones.
    ///
    /// # Locking
    ///
    /// Acquires a shared lock on the index file during reading.
    pub fn rehydrate(&mut self) -> IndexResult<()> {
        let snapshot = FileSnapshot::of(&self.path)?;

        let Some(current) = snapshot.as_ref() else {
            self.entries = Arc::from(Vec::new());
            self.version = VERSION;
            self.snapshot = None;
            return Ok(());
        };

        let mut content = Vec::with_capacity(current.len as usize);
        {
            let mut index_file = std::fs::OpenOptions::new().read(true).open(&self.path)?;
            let mut lock = file_guard::lock(&mut index_file, file_guard::Lock::Shared, 0, 1)?;
            lock.deref_mut().read_to_end(&mut content)?;
        }

        let (version, entries) = if content.is_empty() {
            (VERSION, Vec::new())
        } else {
            Self::parse(&content)?
        };

        debug!(
            path = %self.path.display(),
            entries = entries.len(),
            version,
            "read index"
        );

        self.entries = entries.into();
        self.version = version;
        self.snapshot = snapshot;

        Ok(())
    }

    fn parse(content: &[u8]) -> IndexResult<(u32, Vec<IndexEntry>)> {
        if content.len() < HEADER_SIZE + CHECKSUM_SIZE {
            return Err(IndexError::Corrupt("index file is truncated".to_string()));
        }

        let (body, trailer) = content.split_at(content.len() - CHECKSUM_SIZE);
        let mut reader = Checksum::new(Cursor::new(body));

        let header = IndexHeader::deserialize(&mut reader).map_err(Self::truncated)?;
        let mut entries = Vec::with_capacity(header.entries_count as usize);
        for _ in 0..header.entries_count {
            let entry =
                IndexEntry::deserialize(&mut reader, header.version).map_err(Self::truncated)?;
            entries.push(entry);
        }

        Self::skip_extensions(&mut reader, body.len())?;
        reader.verify(trailer)?;

        table::check_table(&entries).map_err(|e| IndexError::Corrupt(e.to_string()))?;

        Ok((header.version, entries))
    }

    /// Skip the extension blocks between the last entry and the checksum
    fn skip_extensions(reader: &mut Checksum<Cursor<&[u8]>>, end: usize) -> IndexResult<()> {
        loop {
            let position = reader.inner().position() as usize;
            if position >= end {
                return Ok(());
            }
            if end - position < EXTENSION_HEADER_SIZE {
                return Err(IndexError::Corrupt(
                    "trailing bytes after index entries".to_string(),
                ));
            }

            let mut signature = [0u8; 4];
            reader.read_exact(&mut signature)?;
            let size = reader.read_u32::<NetworkEndian>()? as u64;

            // optional extensions start with an upper-case letter
            if !signature[0].is_ascii_uppercase() {
                return Err(IndexError::Corrupt(format!(
                    "unsupported required extension '{}'",
                    String::from_utf8_lossy(&signature)
                )));
            }

            let skipped = std::io::copy(&mut reader.by_ref().take(size), &mut std::io::sink())?;
            if skipped != size {
                return Err(IndexError::Corrupt(format!(
                    "extension '{}' is truncated",
                    String::from_utf8_lossy(&signature)
                )));
            }
            trace!(
                extension = %String::from_utf8_lossy(&signature),
                size,
                "skipped index extension"
            );
        }
    }

    fn truncated(error: IndexError) -> IndexError {
        match error {
            IndexError::Io(e) if e.kind() == ErrorKind::UnexpectedEof => IndexError::Corrupt(
                "unexpected end-of-file while reading index".to_string(),
            ),
            other => other,
        }
    }

    /// Take the index lock and load the current on-disk state
    ///
    /// # Errors
    ///
    /// [`IndexError::Locked`] if any session, in this process or another,
    /// already holds the lock. Never waits.
    pub fn lock(&mut self) -> IndexResult<()> {
        if self.lock.is_some() {
            return Err(IndexError::Locked(LockFile::lock_path_for(&self.path)));
        }

        self.lock = Some(LockFile::acquire(&self.path)?);
        if let Err(e) = self.rehydrate() {
            self.unlock();
            return Err(e);
        }

        Ok(())
    }

    /// Run a write session under the lock
    ///
    /// Takes the lock, then runs `session`. If the session fails, the lock is
    /// released, the index file is left untouched and the table is reloaded
    /// from it.
    pub fn transaction<T, E>(
        &mut self,
        session: impl FnOnce(&mut Index) -> Result<T, E>,
    ) -> Result<T, E>
    where
        E: From<IndexError>,
    {
        self.lock()?;

        let outcome = session(self);
        if outcome.is_err() {
            debug!(path = %self.path.display(), "write session failed, releasing lock");
            self.unlock();
            if let Err(e) = self.rehydrate() {
                warn!(path = %self.path.display(), error = %e, "failed to reload index");
            }
        }

        outcome
    }

    /// Release the lock without touching the index file
    pub fn unlock(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.unlock();
        }
    }

    /// Write the table through the lock file and swap it into place
    ///
    /// The lock is released whether or not the commit succeeds; on failure
    /// the index file is left as it was.
    pub fn commit(&mut self) -> IndexResult<()> {
        let mut lock = self.lock.take().ok_or(IndexError::NotLocked)?;

        let version = self.write_to(&mut lock)?;
        lock.commit()?;

        self.version = version;
        self.snapshot = FileSnapshot::of(&self.path)?;
        debug!(
            path = %self.path.display(),
            entries = self.entries.len(),
            version,
            "wrote index"
        );

        Ok(())
    }

    fn write_to(&self, writer: impl Write) -> IndexResult<u32> {
        let version = if self.entries.iter().any(|entry| entry.flags.is_extended()) {
            EXTENDED_VERSION
        } else {
            VERSION
        };
        let entries_count = u32::try_from(self.entries.len())
            .map_err(|_| IndexError::Corrupt("too many index entries".to_string()))?;

        let mut writer = Checksum::new(writer);
        let header = IndexHeader::new(*SIGNATURE, version, entries_count);
        writer.write_all(&header.serialize()?)?;

        for entry in self.entries.iter() {
            writer.write_all(&entry.serialize(version)?)?;
        }

        writer.write_checksum()?;

        Ok(version)
    }

    /// Whether the index file changed since it was last read or written here
    pub fn is_outdated(&self) -> IndexResult<bool> {
        Ok(FileSnapshot::of(&self.path)? != self.snapshot)
    }

    /// Start a full-rebuild session
    pub fn builder(&mut self) -> IndexBuilder<'_> {
        IndexBuilder::new(self)
    }

    /// Start an incremental edit session
    pub fn editor<'a>(&'a mut self) -> IndexEditor<'a> {
        IndexEditor::new(self)
    }

    /// Install a new table, dropping this index's reference to the old one
    pub(crate) fn replace(&mut self, entries: Vec<IndexEntry>) {
        self.entries = entries.into();
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, position: usize) -> Option<&IndexEntry> {
        self.entries.get(position)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter()
    }

    /// The current table; unaffected by later sessions
    pub fn snapshot(&self) -> Arc<[IndexEntry]> {
        Arc::clone(&self.entries)
    }

    /// Position of the lowest stage entry for `path`
    ///
    /// # Returns
    ///
    /// `Ok(position)` when the path is staged, otherwise
    /// `Err(insertion_point)`.
    pub fn find_entry(&self, path: &[u8]) -> Result<usize, usize> {
        table::find_from(&self.entries, 0, path)
    }

    /// Position of the first entry after `position` with a different path
    pub fn next_entry(&self, position: usize) -> usize {
        table::next_path(&self.entries, position)
    }

    /// Position of the first entry at or after `position` not under `prefix`
    pub fn next_entry_with_prefix(&self, prefix: &[u8], position: usize) -> usize {
        table::next_outside_prefix(&self.entries, prefix, position)
    }

    /// Look up an entry by its path
    ///
    /// # Returns
    ///
    /// The lowest stage entry if found, None otherwise
    pub fn entry_by_path(&self, path: &[u8]) -> Option<&IndexEntry> {
        self.find_entry(path).ok().map(|position| &self.entries[position])
    }

    /// Every stage staged for `path`
    pub fn entries_for_path(&self, path: &[u8]) -> &[IndexEntry] {
        match self.find_entry(path) {
            Ok(position) => &self.entries[position..self.next_entry(position)],
            Err(_) => &[],
        }
    }

    /// Every entry inside directory `dir`; the whole table for an empty `dir`
    pub fn entries_with_prefix(&self, dir: &[u8]) -> &[IndexEntry] {
        let prefix = path_cmp::as_dir_prefix(dir);
        let (Ok(start) | Err(start)) = self.find_entry(&prefix);
        &self.entries[start..self.next_entry_with_prefix(&prefix, start)]
    }

    /// Check if a path is tracked directly in the index
    ///
    /// Returns true if the path is either a file entry or has children
    /// (is a directory with tracked files).
    pub fn is_directly_tracked(&self, path: &[u8]) -> bool {
        self.find_entry(path).is_ok() || !self.entries_with_prefix(path).is_empty()
    }

    pub fn has_unmerged_entries(&self) -> bool {
        self.entries.iter().any(|entry| !entry.is_merged())
    }
}
