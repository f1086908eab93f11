//! Searches and invariant checks over a sorted entry slice
//!
//! Both the index table and the editing sessions work on plain
//! `&[IndexEntry]` slices sorted by `(path, stage)`. Searches never return
//! sentinel values: a miss is `Err(insertion_point)`, as with
//! [`slice::binary_search`].

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::index::path_cmp;
use std::cmp::Ordering;

/// Locate the lowest stage entry for `path` within `entries[start..]`
///
/// Returns `Ok(index)` on a hit, otherwise `Err(insertion_point)`.
pub fn find_from(entries: &[IndexEntry], start: usize, path: &[u8]) -> Result<usize, usize> {
    let start = start.min(entries.len());
    let position = start
        + entries[start..]
            .partition_point(|entry| path_cmp::compare(entry.path(), path) == Ordering::Less);

    match entries.get(position) {
        Some(entry) if entry.path() == path => Ok(position),
        _ => Err(position),
    }
}

/// Index of the first entry after `index` with a different path
pub fn next_path(entries: &[IndexEntry], index: usize) -> usize {
    let Some(current) = entries.get(index) else {
        return entries.len();
    };

    index
        + 1
        + entries[index + 1..]
            .iter()
            .take_while(|entry| entry.path() == current.path())
            .count()
}

/// Index of the first entry at or after `index` that does not start with `prefix`
///
/// Entries sharing a prefix are contiguous, so the whole run is skipped with a
/// single binary search.
pub fn next_outside_prefix(entries: &[IndexEntry], prefix: &[u8], index: usize) -> usize {
    let start = index.min(entries.len());

    start
        + entries[start..].partition_point(|entry| {
            path_cmp::is_under(entry.path(), prefix)
                || path_cmp::compare(entry.path(), prefix) == Ordering::Less
        })
}

fn check_mode(entry: &IndexEntry) -> IndexResult<()> {
    match entry.mode {
        EntryMode::Missing => Err(IndexError::UnsetFileMode(entry.path_str().into_owned())),
        mode if !mode.is_stageable() => Err(IndexError::UnsupportedMode {
            path: entry.path_str().into_owned(),
            mode: mode.as_u32(),
        }),
        _ => Ok(()),
    }
}

fn check_pair(previous: &IndexEntry, next: &IndexEntry) -> IndexResult<()> {
    match previous.compare_position(next) {
        Ordering::Less => {}
        Ordering::Equal => {
            return Err(IndexError::InvalidPathOrdering {
                path: next.path_str().into_owned(),
                reason: "duplicate entry for the same stage",
            });
        }
        Ordering::Greater => {
            return Err(IndexError::InvalidPathOrdering {
                path: next.path_str().into_owned(),
                reason: "entries are not sorted",
            });
        }
    }

    if previous.path() == next.path()
        && (previous.stage() == Stage::Merged || next.stage() == Stage::Merged)
    {
        return Err(IndexError::StageCollision(next.path_str().into_owned()));
    }

    Ok(())
}

fn check_parents(entries: &[IndexEntry], entry: &IndexEntry) -> IndexResult<()> {
    for dir in entry.parent_dirs() {
        if find_from(entries, 0, dir).is_ok() {
            return Err(IndexError::PathPrefixCollision {
                file: String::from_utf8_lossy(dir).into_owned(),
                nested: entry.path_str().into_owned(),
            });
        }
    }

    Ok(())
}

/// Verify every table invariant over the whole slice
pub fn check_table(entries: &[IndexEntry]) -> IndexResult<()> {
    for pair in entries.windows(2) {
        check_pair(&pair[0], &pair[1])?;
    }

    for entry in entries {
        check_mode(entry)?;
        check_parents(entries, entry)?;
    }

    Ok(())
}

/// Verify the invariants around a single entry placed into a valid table
pub fn check_placement(entries: &[IndexEntry], index: usize) -> IndexResult<()> {
    let entry = &entries[index];
    check_mode(entry)?;

    if index > 0 {
        check_pair(&entries[index - 1], entry)?;
    }
    if let Some(next) = entries.get(index + 1) {
        check_pair(entry, next)?;
    }

    check_parents(entries, entry)?;

    let prefix = path_cmp::as_dir_prefix(entry.path());
    let (Ok(position) | Err(position)) = find_from(entries, index, &prefix);
    if let Some(nested) = entries
        .get(position)
        .filter(|candidate| path_cmp::is_under(candidate.path(), &prefix))
    {
        return Err(IndexError::PathPrefixCollision {
            file: entry.path_str().into_owned(),
            nested: nested.path_str().into_owned(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn staged(path: &str, stage: Stage) -> IndexEntry {
        let mut entry = IndexEntry::new(path, stage).unwrap();
        entry.mode = EntryMode::File(FileMode::Regular);
        entry
    }

    #[fixture]
    fn table() -> Vec<IndexEntry> {
        vec![
            staged("a", Stage::Merged),
            staged("b", Stage::Base),
            staged("b", Stage::Ours),
            staged("b", Stage::Theirs),
            staged("c/x", Stage::Merged),
            staged("c/y", Stage::Merged),
            staged("d", Stage::Merged),
        ]
    }

    #[rstest]
    fn finds_lowest_stage(table: Vec<IndexEntry>) {
        assert_eq!(find_from(&table, 0, b"b"), Ok(1));
        assert_eq!(find_from(&table, 0, b"c/y"), Ok(5));
        assert_eq!(find_from(&table, 0, b"bb"), Err(4));
        assert_eq!(find_from(&table, 0, b"z"), Err(7));
    }

    #[rstest]
    fn search_honours_start(table: Vec<IndexEntry>) {
        assert_eq!(find_from(&table, 4, b"a"), Err(4));
        assert_eq!(find_from(&table, 100, b"a"), Err(7));
    }

    #[rstest]
    fn skips_stages_and_prefixes(table: Vec<IndexEntry>) {
        assert_eq!(next_path(&table, 1), 4);
        assert_eq!(next_path(&table, 0), 1);
        assert_eq!(next_path(&table, 7), 7);
        assert_eq!(next_outside_prefix(&table, b"c/", 4), 6);
        assert_eq!(next_outside_prefix(&table, b"", 0), 7);
        assert_eq!(next_outside_prefix(&table, b"q/", 6), 7);
    }

    #[rstest]
    fn valid_table_passes(table: Vec<IndexEntry>) {
        assert!(check_table(&table).is_ok());
        for index in 0..table.len() {
            assert!(check_placement(&table, index).is_ok());
        }
    }

    #[test]
    fn detects_file_directory_collisions() {
        let table = vec![
            staged("a", Stage::Merged),
            staged("a-b", Stage::Merged),
            staged("a/b", Stage::Merged),
        ];

        assert!(matches!(
            check_table(&table),
            Err(IndexError::PathPrefixCollision { .. })
        ));
        assert!(matches!(
            check_placement(&table, 0),
            Err(IndexError::PathPrefixCollision { .. })
        ));
        assert!(matches!(
            check_placement(&table, 2),
            Err(IndexError::PathPrefixCollision { .. })
        ));
    }

    #[test]
    fn detects_mixed_stages() {
        let table = vec![staged("f", Stage::Merged), staged("f", Stage::Ours)];

        assert!(matches!(
            check_table(&table),
            Err(IndexError::StageCollision(_))
        ));
    }

    #[test]
    fn detects_duplicates_and_disorder() {
        let duplicate = vec![staged("f", Stage::Merged), staged("f", Stage::Merged)];
        let unsorted = vec![staged("g", Stage::Merged), staged("f", Stage::Merged)];

        assert!(matches!(
            check_table(&duplicate),
            Err(IndexError::InvalidPathOrdering { .. })
        ));
        assert!(matches!(
            check_table(&unsorted),
            Err(IndexError::InvalidPathOrdering { .. })
        ));
    }

    #[test]
    fn detects_unset_and_tree_modes() {
        let unset = vec![IndexEntry::new("f", Stage::Merged).unwrap()];
        let mut tree = staged("t", Stage::Merged);
        tree.mode = EntryMode::Directory;

        assert!(matches!(
            check_table(&unset),
            Err(IndexError::UnsetFileMode(_))
        ));
        assert!(matches!(
            check_table(&[tree]),
            Err(IndexError::UnsupportedMode { .. })
        ));
    }
}
