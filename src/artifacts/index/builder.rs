//! Full-rebuild session
//!
//! A builder collects entries in any order, keeping ranges of the current
//! table or adding new entries, and installs the result only when it is
//! finished. Finishing sorts the collected entries, collapses duplicates of the
//! same `(path, stage)` to the one added last, and rejects the result if it
//! breaks any table invariant, leaving the index untouched.

use crate::areas::index::Index;
use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::index::table;
use std::cmp::Ordering;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug)]
pub struct IndexBuilder<'i> {
    index: &'i mut Index,
    entries: Vec<IndexEntry>,
}

impl<'i> IndexBuilder<'i> {
    pub(crate) fn new(index: &'i mut Index) -> Self {
        let capacity = index.entry_count();

        IndexBuilder {
            index,
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Append an entry
    ///
    /// # Errors
    ///
    /// [`IndexError::UnsetFileMode`] if the entry has no mode yet.
    pub fn add(&mut self, entry: IndexEntry) -> IndexResult<()> {
        if entry.mode.is_missing() {
            return Err(IndexError::UnsetFileMode(entry.path_str().into_owned()));
        }

        self.entries.push(entry);
        Ok(())
    }

    /// Append `count` entries of the current table starting at `position`
    ///
    /// Ranges reaching past the end of the table are clamped.
    pub fn keep(&mut self, position: usize, count: usize) {
        let table = self.index.snapshot();
        let end = position.saturating_add(count).min(table.len());
        let start = position.min(end);

        self.entries.extend_from_slice(&table[start..end]);
    }

    /// Append every entry of the current table whose path is not in `paths`
    pub fn add_existing_entries_not_in<P: AsRef<[u8]>>(&mut self, paths: &[P]) {
        let excluded: HashSet<&[u8]> = paths.iter().map(|path| path.as_ref()).collect();
        let table = self.index.snapshot();

        let mut run_start = 0;
        for (position, entry) in table.iter().enumerate() {
            if excluded.contains(entry.path()) {
                self.entries.extend_from_slice(&table[run_start..position]);
                run_start = position + 1;
            }
        }
        self.entries.extend_from_slice(&table[run_start..]);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sort, dedupe and validate the entries, then install them
    pub fn finish(self) -> IndexResult<()> {
        let IndexBuilder { index, entries } = self;
        Self::install(index, entries)
    }

    /// Finish, then write the table and release the lock
    ///
    /// The lock is released on failure as well.
    pub fn commit(self) -> IndexResult<()> {
        let IndexBuilder { index, entries } = self;
        if let Err(e) = Self::install(index, entries) {
            index.unlock();
            return Err(e);
        }
        index.commit()
    }

    fn install(index: &mut Index, entries: Vec<IndexEntry>) -> IndexResult<()> {
        let added = entries.len();
        let resolved = Self::resolve(entries)?;

        debug!(
            added,
            entries = resolved.len(),
            "finished index builder"
        );
        index.replace(resolved);

        Ok(())
    }

    fn resolve(mut entries: Vec<IndexEntry>) -> IndexResult<Vec<IndexEntry>> {
        // stable, so later additions stay after earlier ones
        entries.sort_by(IndexEntry::compare_position);

        let mut resolved: Vec<IndexEntry> = Vec::with_capacity(entries.len());
        for entry in entries {
            match resolved.last_mut() {
                Some(last) if last.compare_position(&entry) == Ordering::Equal => *last = entry,
                _ => resolved.push(entry),
            }
        }

        table::check_table(&resolved)?;

        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::Stage;
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn staged(path: &str, stage: Stage, fill: u8) -> IndexEntry {
        let mut entry = IndexEntry::new(path, stage).unwrap();
        entry.mode = EntryMode::File(FileMode::Regular);
        entry.oid = ObjectId::from_bytes([fill; 20]);
        entry
    }

    fn paths(index: &Index) -> Vec<(String, u8)> {
        index
            .entries()
            .map(|entry| (entry.path_str().into_owned(), entry.stage().as_u8()))
            .collect()
    }

    #[fixture]
    fn index() -> Index {
        let mut index = Index::new(std::path::Path::new("unused-index").into());
        let mut builder = index.builder();
        for path in ["a", "b/c", "b/d", "e"] {
            builder.add(staged(path, Stage::Merged, 1)).unwrap();
        }
        builder.finish().unwrap();
        index
    }

    #[test]
    fn sorts_entries_added_in_any_order() {
        let mut index = Index::new(std::path::Path::new("unused-index").into());
        let mut builder = index.builder();
        builder.add(staged("z", Stage::Merged, 1)).unwrap();
        builder.add(staged("m", Stage::Theirs, 1)).unwrap();
        builder.add(staged("a.b", Stage::Merged, 1)).unwrap();
        builder.add(staged("m", Stage::Base, 1)).unwrap();
        builder.add(staged("a/b", Stage::Merged, 1)).unwrap();
        builder.finish().unwrap();

        assert_eq!(
            paths(&index),
            vec![
                ("a.b".to_string(), 0),
                ("a/b".to_string(), 0),
                ("m".to_string(), 1),
                ("m".to_string(), 3),
                ("z".to_string(), 0),
            ]
        );
    }

    #[test]
    fn duplicates_keep_the_last_added() {
        let mut index = Index::new(std::path::Path::new("unused-index").into());
        let mut builder = index.builder();
        builder.add(staged("f", Stage::Merged, 1)).unwrap();
        builder.add(staged("g", Stage::Merged, 1)).unwrap();
        builder.add(staged("f", Stage::Merged, 2)).unwrap();
        builder.finish().unwrap();

        assert_eq!(index.entry_count(), 2);
        assert_eq!(
            index.entry_by_path(b"f").map(|entry| entry.oid),
            Some(ObjectId::from_bytes([2; 20]))
        );
    }

    #[test]
    fn entries_without_mode_are_refused() {
        let mut index = Index::new(std::path::Path::new("unused-index").into());
        let mut builder = index.builder();

        let result = builder.add(IndexEntry::new("f", Stage::Merged).unwrap());

        assert!(matches!(result, Err(IndexError::UnsetFileMode(_))));
        assert!(builder.is_empty());
    }

    #[rstest]
    fn keeps_ranges_of_the_current_table(mut index: Index) {
        let mut builder = index.builder();
        builder.keep(1, 2);
        builder.keep(3, 10);
        builder.add(staged("0", Stage::Merged, 1)).unwrap();
        builder.finish().unwrap();

        assert_eq!(
            paths(&index),
            vec![
                ("0".to_string(), 0),
                ("b/c".to_string(), 0),
                ("b/d".to_string(), 0),
                ("e".to_string(), 0),
            ]
        );
    }

    #[rstest]
    fn copies_entries_not_listed(mut index: Index) {
        let mut builder = index.builder();
        builder.add_existing_entries_not_in(&["b/c", "e"]);
        builder.finish().unwrap();

        assert_eq!(
            paths(&index),
            vec![("a".to_string(), 0), ("b/d".to_string(), 0)]
        );
    }

    #[rstest]
    fn invalid_result_leaves_table_untouched(mut index: Index) {
        let before = index.snapshot();

        let mut builder = index.builder();
        builder.keep(0, 4);
        builder.add(staged("b", Stage::Merged, 1)).unwrap();
        let result = builder.finish();

        assert!(matches!(
            result,
            Err(IndexError::PathPrefixCollision { .. })
        ));
        assert_eq!(index.snapshot(), before);
    }

    #[rstest]
    fn mixing_merged_and_conflict_stages_fails(mut index: Index) {
        let mut builder = index.builder();
        builder.keep(0, 4);
        builder.add(staged("a", Stage::Ours, 1)).unwrap();

        assert!(matches!(
            builder.finish(),
            Err(IndexError::StageCollision(_))
        ));
    }

    #[test]
    fn commit_writes_and_unlocks() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new(path.clone().into_boxed_path());

        index.lock().unwrap();
        let mut builder = index.builder();
        builder.add(staged("f", Stage::Merged, 1)).unwrap();
        builder.commit().unwrap();

        assert!(!index.is_locked());
        let mut reread = Index::new(path.into_boxed_path());
        reread.rehydrate().unwrap();
        assert_eq!(reread.entry_count(), 1);
    }

    #[test]
    fn failed_commit_releases_the_lock() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new(path.clone().into_boxed_path());

        index.lock().unwrap();
        let mut builder = index.builder();
        builder.add(staged("f", Stage::Merged, 1)).unwrap();
        builder.add(staged("f", Stage::Base, 1)).unwrap();

        assert!(matches!(
            builder.commit(),
            Err(IndexError::StageCollision(_))
        ));
        assert!(!index.is_locked());
        assert!(!dir.path().join("index.lock").exists());
        assert!(!path.exists());

        let mut other = Index::new(path.into_boxed_path());
        other.lock().unwrap();
        other.unlock();
    }
}
