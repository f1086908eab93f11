//! Git tree object
//!
//! Trees represent directory snapshots in Git. They contain entries for files (blobs),
//! symlinks, submodules and subdirectories (other trees), along with their names and modes.
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`
//! Each entry: `<mode> <name>\0<20-byte-sha1>`
//!
//! Entries are ordered by name, with directory names compared as if they
//! ended in `/`. Keying the entries by that suffixed name gives the order for
//! free.
//!
//! ## Tree Building
//!
//! Trees can be built from:
//! - Index entries (staging area)
//! - Existing tree objects (for reading)

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::index::path_cmp::SEPARATOR;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};

/// Internal tree entry representation
#[derive(Debug, Clone)]
enum TreeEntry {
    /// Blob, symlink or submodule reference
    Leaf(DatabaseEntry),
    /// Nested tree
    Directory(Tree),
}

impl TreeEntry {
    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::Leaf(entry) => entry.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn oid(&self) -> anyhow::Result<ObjectId> {
        match self {
            TreeEntry::Leaf(entry) => Ok(entry.oid),
            TreeEntry::Directory(tree) => tree.object_id(),
        }
    }
}

/// Git tree object representing a directory snapshot
///
/// Trees maintain two sets of entries:
/// - `readable_entries`: For trees loaded from the database
/// - `writeable_entries`: For trees being built from the index
#[derive(Debug, Clone, Default)]
pub struct Tree {
    /// Entries loaded from database (read mode)
    readable_entries: BTreeMap<Bytes, DatabaseEntry>,
    /// Entries being built (write mode), directories keyed with a trailing '/'
    writeable_entries: BTreeMap<Bytes, TreeEntry>,
}

impl Tree {
    /// Build a tree from index entries
    ///
    /// Creates a hierarchical tree structure from a flat list of index entries.
    /// Files are organized into directories matching their path structure.
    ///
    /// # Arguments
    ///
    /// * `entries` - Stage 0 index entries to include in the tree
    ///
    /// # Returns
    ///
    /// The root tree object containing all entries
    pub fn build<'e>(entries: impl IntoIterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for entry in entries {
            if !entry.is_merged() {
                anyhow::bail!("{}: unmerged entry cannot be written to a tree", entry.path_str());
            }

            let mut components: Vec<&[u8]> = entry.path().split(|b| *b == SEPARATOR).collect();
            let name = components.pop().context("Empty index path")?;
            root.add_entry(&components, name, DatabaseEntry::new(entry.oid, entry.mode))?;
        }

        Ok(root)
    }

    /// Traverse the tree depth-first, calling a function on each node
    ///
    /// Visits children before parents (post-order traversal), which is
    /// necessary for storing trees since child OIDs must be known before
    /// storing the parent.
    pub fn traverse<F>(&self, func: &F) -> anyhow::Result<()>
    where
        F: Fn(&Tree) -> anyhow::Result<()>,
    {
        for entry in self.writeable_entries.values() {
            if let TreeEntry::Directory(tree) = entry {
                tree.traverse(func)?;
            }
        }
        func(self)?;

        Ok(())
    }

    /// Add an entry to the tree at the appropriate location
    ///
    /// Creates intermediate directory entries as needed.
    fn add_entry(
        &mut self,
        parents: &[&[u8]],
        name: &[u8],
        entry: DatabaseEntry,
    ) -> anyhow::Result<()> {
        let Some((parent, rest)) = parents.split_first() else {
            self.writeable_entries
                .insert(Bytes::copy_from_slice(name), TreeEntry::Leaf(entry));
            return Ok(());
        };

        let mut key = parent.to_vec();
        key.push(SEPARATOR);

        match self
            .writeable_entries
            .entry(Bytes::from(key))
            .or_insert_with(|| TreeEntry::Directory(Tree::default()))
        {
            TreeEntry::Directory(tree) => tree.add_entry(rest, name, entry),
            TreeEntry::Leaf(_) => anyhow::bail!(
                "{}: directory is also staged as a file",
                String::from_utf8_lossy(parent)
            ),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&Bytes, &DatabaseEntry)> {
        self.readable_entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (Bytes, DatabaseEntry)> {
        self.readable_entries.into_iter()
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();
        for (name, tree_entry) in &self.writeable_entries {
            // directories are keyed with a trailing '/'
            let name = name.strip_suffix(&[SEPARATOR]).unwrap_or(name);

            write!(content_bytes, "{:o} ", tree_entry.mode().as_u32())?;
            content_bytes.write_all(name)?;
            content_bytes.push(0);
            tree_entry.oid()?.write_h40_to(&mut content_bytes)?;
        }

        let mut tree_bytes = Vec::with_capacity(content_bytes.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();
        let mut reader = reader;

        // Reuse scratch buffers to reduce allocs
        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            // Read "mode " (space-delimited)
            let n = reader.read_until(b' ', &mut mode_bytes)?;
            if n == 0 {
                break; // clean EOF: no more entries
            }
            if mode_bytes.pop() != Some(b' ') {
                anyhow::bail!("unexpected EOF in mode");
            }

            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            // Read "name\0"
            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                anyhow::bail!("unexpected EOF in name");
            }

            let oid =
                ObjectId::read_h40_from(&mut reader).context("unexpected EOF in object id")?;

            entries.insert(
                Bytes::copy_from_slice(&name_bytes),
                DatabaseEntry::new(oid, mode),
            );
        }

        Ok(Tree {
            readable_entries: entries,
            writeable_entries: Default::default(),
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}
