//! Incremental edit session
//!
//! An editor queues [`PathEdit`]s and applies them all in one pass over the
//! current table when it is finished. Edits are sorted by path first, so the
//! pass copies untouched runs of entries in bulk and only does work at the
//! edited paths. Edits on the same path run in the order they were added.
//!
//! ## Edits
//!
//! - `Update` changes the entry at a path, creating it if needed. It targets
//!   one stage: the given one, or else the lowest stage present, or else a new
//!   stage 0 entry
//! - `DeletePath` removes every stage of one path
//! - `DeleteTree` removes every entry under a directory
//!
//! A finished editor installs the new table only if it still satisfies every
//! table invariant; otherwise the index keeps its previous table.

use crate::areas::index::Index;
use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::index_entry::{IndexEntry, Stage, validate_path};
use crate::artifacts::index::{path_cmp, table};
use bytes::Bytes;
use tracing::debug;

type Apply<'a> = Box<dyn FnOnce(&mut IndexEntry) + 'a>;

/// A queued change to one path or one directory of the index
pub enum PathEdit<'a> {
    Update {
        path: Bytes,
        stage: Option<Stage>,
        apply: Apply<'a>,
    },
    DeletePath {
        path: Bytes,
    },
    DeleteTree {
        /// Directory prefix ending in `/`, or empty for the whole table
        prefix: Bytes,
    },
}

impl<'a> PathEdit<'a> {
    /// Update the entry at `path`, or create a stage 0 entry if none exists
    ///
    /// A created entry starts zero-valued; `apply` must at least set its mode.
    pub fn update(
        path: impl AsRef<[u8]>,
        apply: impl FnOnce(&mut IndexEntry) + 'a,
    ) -> IndexResult<Self> {
        let path = path.as_ref();
        validate_path(path)?;

        Ok(PathEdit::Update {
            path: Bytes::copy_from_slice(path),
            stage: None,
            apply: Box::new(apply),
        })
    }

    /// Update or create the entry for one stage of `path`
    pub fn update_stage(
        path: impl AsRef<[u8]>,
        stage: Stage,
        apply: impl FnOnce(&mut IndexEntry) + 'a,
    ) -> IndexResult<Self> {
        let path = path.as_ref();
        validate_path(path)?;

        Ok(PathEdit::Update {
            path: Bytes::copy_from_slice(path),
            stage: Some(stage),
            apply: Box::new(apply),
        })
    }

    /// Update the entry at the same path and stage as `entry`
    pub fn update_entry(entry: &IndexEntry, apply: impl FnOnce(&mut IndexEntry) + 'a) -> Self {
        PathEdit::Update {
            path: entry.path_bytes().clone(),
            stage: Some(entry.stage()),
            apply: Box::new(apply),
        }
    }

    /// Remove every stage of `path`
    pub fn delete_path(path: impl AsRef<[u8]>) -> IndexResult<Self> {
        let path = path.as_ref();
        validate_path(path)?;

        Ok(PathEdit::DeletePath {
            path: Bytes::copy_from_slice(path),
        })
    }

    /// Remove everything under directory `path`; an empty path clears the table
    ///
    /// Only entries strictly inside the directory go; a file named exactly
    /// `path` is left alone.
    pub fn delete_tree(path: impl AsRef<[u8]>) -> IndexResult<Self> {
        let path = path.as_ref();
        if path.is_empty() {
            return Ok(PathEdit::DeleteTree {
                prefix: Bytes::new(),
            });
        }

        let dir = path.strip_suffix(&[path_cmp::SEPARATOR]).unwrap_or(path);
        validate_path(dir)?;

        Ok(PathEdit::DeleteTree {
            prefix: Bytes::from(path_cmp::as_dir_prefix(dir)),
        })
    }

    /// The path this edit is sorted by
    pub fn path(&self) -> &[u8] {
        self.key()
    }

    fn key(&self) -> &Bytes {
        match self {
            PathEdit::Update { path, .. } | PathEdit::DeletePath { path } => path,
            PathEdit::DeleteTree { prefix } => prefix,
        }
    }

    /// Run the content change of an update on `entry`
    ///
    /// # Errors
    ///
    /// [`IndexError::UnsupportedOperation`] for deletions, which carry no
    /// content change.
    pub fn apply(self, entry: &mut IndexEntry) -> IndexResult<()> {
        match self {
            PathEdit::Update { apply, .. } => {
                apply(entry);
                Ok(())
            }
            PathEdit::DeletePath { .. } => Err(IndexError::UnsupportedOperation(
                "a path deletion has no content to apply",
            )),
            PathEdit::DeleteTree { .. } => Err(IndexError::UnsupportedOperation(
                "a tree deletion has no content to apply",
            )),
        }
    }
}

impl std::fmt::Debug for PathEdit<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path = String::from_utf8_lossy(self.path());

        match self {
            PathEdit::Update { stage, .. } => f
                .debug_struct("Update")
                .field("path", &path)
                .field("stage", stage)
                .finish_non_exhaustive(),
            PathEdit::DeletePath { .. } => f.debug_struct("DeletePath").field("path", &path).finish(),
            PathEdit::DeleteTree { .. } => {
                f.debug_struct("DeleteTree").field("prefix", &path).finish()
            }
        }
    }
}

#[derive(Debug)]
pub struct IndexEditor<'a> {
    index: &'a mut Index,
    edits: Vec<PathEdit<'a>>,
}

impl<'a> IndexEditor<'a> {
    pub(crate) fn new(index: &'a mut Index) -> Self {
        IndexEditor {
            index,
            edits: Vec::new(),
        }
    }

    pub fn add(&mut self, edit: PathEdit<'a>) {
        self.edits.push(edit);
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Apply the queued edits and install the resulting table
    pub fn finish(self) -> IndexResult<()> {
        let IndexEditor { index, edits } = self;
        Self::install(index, edits)
    }

    /// Finish, then write the table and release the lock
    ///
    /// With no queued edits nothing is written and the lock is just released.
    /// A failed finish releases the lock too, leaving the index file as it was.
    pub fn commit(self) -> IndexResult<()> {
        let IndexEditor { index, edits } = self;

        if edits.is_empty() {
            debug!("no index edits queued, releasing lock");
            index.unlock();
            return Ok(());
        }

        if let Err(e) = Self::install(index, edits) {
            index.unlock();
            return Err(e);
        }
        index.commit()
    }

    fn install(index: &mut Index, edits: Vec<PathEdit<'a>>) -> IndexResult<()> {
        let queued = edits.len();
        let entries = apply_edits(&index.snapshot(), edits)?;

        debug!(edits = queued, entries = entries.len(), "finished index editor");
        index.replace(entries);

        Ok(())
    }
}

/// Merge sorted edits into a sorted table, producing a new table
///
/// Untouched runs are copied wholesale, so the cost is linear in the table
/// plus a binary search per edit. Only the entries an edit produced are
/// checked against the table invariants afterwards.
pub(crate) fn apply_edits(
    entries: &[IndexEntry],
    mut edits: Vec<PathEdit<'_>>,
) -> IndexResult<Vec<IndexEntry>> {
    // stable, so same-path edits keep their submission order
    edits.sort_by(|a, b| path_cmp::compare(a.path(), b.path()));

    let mut output = Vec::with_capacity(entries.len() + edits.len());
    let mut placed = Vec::new();
    let mut last_copied = 0;
    let mut edits = edits.into_iter().peekable();

    while let Some(edit) = edits.next() {
        let found = table::find_from(entries, last_copied, edit.path());
        let (Ok(position) | Err(position)) = found;

        output.extend_from_slice(&entries[last_copied..position]);

        match edit {
            PathEdit::DeleteTree { prefix } => {
                last_copied = table::next_outside_prefix(entries, &prefix, position);
            }
            edit => {
                let path = edit.key().clone();
                let end = match found {
                    Ok(_) => table::next_path(entries, position),
                    Err(_) => position,
                };
                last_copied = end;

                let mut group = vec![edit];
                while let Some(next) = edits.next_if(|next| {
                    next.path() == path.as_ref() && !matches!(next, PathEdit::DeleteTree { .. })
                }) {
                    group.push(next);
                }

                for entry in resolve_path(&path, &entries[position..end], group)? {
                    placed.push(output.len());
                    output.push(entry);
                }
            }
        }
    }

    output.extend_from_slice(&entries[last_copied..]);

    for position in placed {
        table::check_placement(&output, position)?;
    }

    Ok(output)
}

/// Run every edit queued for one path against the stages currently there
fn resolve_path(
    path: &Bytes,
    existing: &[IndexEntry],
    group: Vec<PathEdit<'_>>,
) -> IndexResult<Vec<IndexEntry>> {
    let mut slots = existing.to_vec();

    for edit in group {
        match edit {
            PathEdit::DeletePath { .. } => slots.clear(),
            PathEdit::Update { stage, apply, .. } => {
                let target = stage
                    .or_else(|| slots.first().map(IndexEntry::stage))
                    .unwrap_or(Stage::Merged);

                match slots.iter_mut().find(|slot| slot.stage() == target) {
                    Some(slot) => apply(slot),
                    None => {
                        let mut fresh = IndexEntry::with_checked_path(path.clone(), target);
                        apply(&mut fresh);
                        if fresh.mode.is_missing() {
                            return Err(IndexError::UnsetFileMode(fresh.path_str().into_owned()));
                        }
                        slots.push(fresh);
                    }
                }
            }
            PathEdit::DeleteTree { prefix } => {
                return Err(IndexError::InvalidPathOrdering {
                    path: String::from_utf8_lossy(&prefix).into_owned(),
                    reason: "tree deletion grouped with path edits",
                });
            }
        }
    }

    slots.sort_by_key(IndexEntry::stage);

    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::EntryFlags;
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    fn staged(path: &str, stage: Stage) -> IndexEntry {
        let mut entry = IndexEntry::new(path, stage).unwrap();
        entry.mode = EntryMode::File(FileMode::Regular);
        entry
    }

    fn table_of(entries: Vec<IndexEntry>) -> Index {
        let mut index = Index::new(std::path::Path::new("unused-index").into());
        let mut builder = index.builder();
        for entry in entries {
            builder.add(entry).unwrap();
        }
        builder.finish().unwrap();
        index
    }

    fn listing(index: &Index) -> Vec<(String, u8)> {
        index
            .entries()
            .map(|entry| (entry.path_str().into_owned(), entry.stage().as_u8()))
            .collect()
    }

    fn set_regular(entry: &mut IndexEntry) {
        entry.mode = EntryMode::File(FileMode::Regular);
    }

    #[fixture]
    fn nested() -> Index {
        table_of(vec![
            staged("a", Stage::Merged),
            staged("ab", Stage::Merged),
            staged("b/a", Stage::Merged),
            staged("b/c", Stage::Merged),
        ])
    }

    #[test]
    fn tree_deletion_spares_sibling_prefixes() {
        let mut index = table_of(vec![
            staged("a.txt", Stage::Merged),
            staged("a/b", Stage::Merged),
            staged("a/c", Stage::Merged),
            staged("ab", Stage::Merged),
        ]);

        let mut editor = index.editor();
        editor.add(PathEdit::delete_tree("a").unwrap());
        editor.finish().unwrap();

        assert_eq!(
            listing(&index),
            vec![("a.txt".to_string(), 0), ("ab".to_string(), 0)]
        );
    }

    #[test]
    fn tree_deletion_keeps_file_named_like_the_dir() {
        // the merge pass itself does not care about file/directory collisions
        let entries = vec![
            staged("a", Stage::Merged),
            staged("a/b", Stage::Merged),
            staged("a/c", Stage::Merged),
            staged("ab", Stage::Merged),
        ];

        let output = apply_edits(&entries, vec![PathEdit::delete_tree("a").unwrap()]).unwrap();
        let paths = output.iter().map(|entry| entry.path_str().into_owned()).collect::<Vec<_>>();

        assert_eq!(paths, vec!["a".to_string(), "ab".to_string()]);
    }

    #[rstest]
    fn empty_tree_prefix_clears_everything(mut nested: Index) {
        let mut editor = nested.editor();
        editor.add(PathEdit::delete_tree("").unwrap());
        editor.finish().unwrap();

        assert!(nested.is_empty());
    }

    #[rstest]
    fn updates_and_creates_entries(mut nested: Index) {
        let oid = ObjectId::from_bytes([7; 20]);

        let mut editor = nested.editor();
        editor.add(PathEdit::update("ab", move |entry| entry.oid = oid).unwrap());
        editor.add(
            PathEdit::update("b/b", |entry| {
                set_regular(entry);
                entry.oid = oid;
            })
            .unwrap(),
        );
        editor.add(PathEdit::delete_path("a").unwrap());
        editor.finish().unwrap();

        assert_eq!(
            listing(&nested),
            vec![
                ("ab".to_string(), 0),
                ("b/a".to_string(), 0),
                ("b/b".to_string(), 0),
                ("b/c".to_string(), 0),
            ]
        );
        assert_eq!(nested.entry_by_path(b"ab").map(|entry| entry.oid), Some(oid));
        assert_eq!(nested.entry_by_path(b"b/b").map(|entry| entry.oid), Some(oid));
    }

    #[test]
    fn stages_are_edited_independently() {
        let mut index = table_of(vec![
            staged("f", Stage::Base),
            staged("f", Stage::Ours),
            staged("f", Stage::Theirs),
        ]);
        let oid = ObjectId::from_bytes([9; 20]);

        let mut editor = index.editor();
        editor.add(
            PathEdit::update_stage("f", Stage::Ours, move |entry| entry.oid = oid).unwrap(),
        );
        editor.finish().unwrap();

        let oids: Vec<_> = index.entries_for_path(b"f").iter().map(|e| e.oid).collect();
        assert_eq!(oids, vec![ObjectId::default(), oid, ObjectId::default()]);
    }

    #[test]
    fn unstaged_update_targets_lowest_stage() {
        let mut index = table_of(vec![staged("f", Stage::Ours), staged("f", Stage::Theirs)]);
        let oid = ObjectId::from_bytes([3; 20]);

        let mut editor = index.editor();
        editor.add(PathEdit::update("f", move |entry| entry.oid = oid).unwrap());
        editor.finish().unwrap();

        assert_eq!(index.entry(0).map(|entry| entry.oid), Some(oid));
        assert_eq!(index.entry(1).map(|entry| entry.oid), Some(ObjectId::default()));
    }

    #[test]
    fn conflict_resolves_by_delete_then_update() {
        let mut index = table_of(vec![
            staged("f", Stage::Base),
            staged("f", Stage::Ours),
            staged("f", Stage::Theirs),
        ]);

        let mut editor = index.editor();
        editor.add(PathEdit::delete_path("f").unwrap());
        editor.add(PathEdit::update("f", set_regular).unwrap());
        editor.finish().unwrap();

        assert_eq!(listing(&index), vec![("f".to_string(), 0)]);
    }

    #[rstest]
    fn missing_mode_leaves_table_unchanged(mut nested: Index) {
        let before = nested.snapshot();

        let mut editor = nested.editor();
        editor.add(PathEdit::delete_path("a").unwrap());
        editor.add(
            PathEdit::update("new", |entry| entry.oid = ObjectId::from_bytes([1; 20])).unwrap(),
        );
        let result = editor.finish();

        assert!(matches!(result, Err(IndexError::UnsetFileMode(path)) if path == "new"));
        assert_eq!(nested.snapshot(), before);
    }

    #[rstest]
    fn file_over_directory_is_refused(mut nested: Index) {
        let mut editor = nested.editor();
        editor.add(PathEdit::update("b", set_regular).unwrap());

        assert!(matches!(
            editor.finish(),
            Err(IndexError::PathPrefixCollision { .. })
        ));
    }

    #[rstest]
    fn directory_over_file_is_refused(mut nested: Index) {
        let mut editor = nested.editor();
        editor.add(PathEdit::update("a/x", set_regular).unwrap());

        assert!(matches!(
            editor.finish(),
            Err(IndexError::PathPrefixCollision { .. })
        ));
    }

    #[rstest]
    fn replacing_directory_with_file(mut nested: Index) {
        let mut editor = nested.editor();
        editor.add(PathEdit::update("b", set_regular).unwrap());
        editor.add(PathEdit::delete_tree("b").unwrap());
        editor.finish().unwrap();

        assert_eq!(
            listing(&nested),
            vec![
                ("a".to_string(), 0),
                ("ab".to_string(), 0),
                ("b".to_string(), 0),
            ]
        );
    }

    #[test]
    fn merged_stage_cannot_join_conflicts() {
        let mut index = table_of(vec![staged("f", Stage::Ours)]);

        let mut editor = index.editor();
        editor.add(PathEdit::update_stage("f", Stage::Merged, set_regular).unwrap());

        assert!(matches!(
            editor.finish(),
            Err(IndexError::StageCollision(_))
        ));
    }

    #[test]
    fn deletions_have_no_content_to_apply() {
        let mut entry = staged("f", Stage::Merged);

        assert!(matches!(
            PathEdit::delete_path("f").unwrap().apply(&mut entry),
            Err(IndexError::UnsupportedOperation(_))
        ));
        assert!(matches!(
            PathEdit::delete_tree("d").unwrap().apply(&mut entry),
            Err(IndexError::UnsupportedOperation(_))
        ));
        let update = PathEdit::update("f", |entry| entry.flags.insert(EntryFlags::ASSUME_VALID));
        assert!(update.unwrap().apply(&mut entry).is_ok());
        assert!(entry.flags.contains(EntryFlags::ASSUME_VALID));
    }

    #[test]
    fn invalid_edit_paths_are_refused() {
        assert!(matches!(
            PathEdit::delete_path("a//b"),
            Err(IndexError::InvalidPath(_))
        ));
        assert!(matches!(
            PathEdit::update(".git/config", set_regular),
            Err(IndexError::InvalidPath(_))
        ));
    }

    #[test]
    fn empty_commit_releases_lock_without_writing() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new(path.clone().into_boxed_path());

        index.lock().unwrap();
        index.editor().commit().unwrap();

        assert!(!index.is_locked());
        assert!(!path.exists());
        assert!(index.lock().is_ok());
    }

    #[test]
    fn root_slash_is_not_the_whole_table() {
        assert!(matches!(
            PathEdit::delete_tree("/"),
            Err(IndexError::InvalidPath(_))
        ));
        assert!(matches!(
            PathEdit::delete_tree("a//"),
            Err(IndexError::InvalidPath(_))
        ));
        assert_eq!(PathEdit::delete_tree("").unwrap().path(), b"");
        assert_eq!(PathEdit::delete_tree("a/").unwrap().path(), b"a/");
    }

    #[test]
    fn entry_update_touches_only_its_stage() {
        let mut index = table_of(vec![
            staged("f", Stage::Base),
            staged("f", Stage::Ours),
            staged("f", Stage::Theirs),
        ]);
        let theirs = index.entry(2).unwrap().clone();
        assert_eq!(theirs.stage(), Stage::Theirs);

        let mut editor = index.editor();
        editor.add(PathEdit::update_entry(&theirs, |entry| {
            entry.oid = ObjectId::from_bytes([9; 20]);
        }));
        editor.finish().unwrap();

        let stages = index
            .entries()
            .map(|entry| (entry.stage().as_u8(), entry.oid.as_bytes()[0]))
            .collect::<Vec<_>>();
        assert_eq!(stages, vec![(1, 0), (2, 0), (3, 9)]);

        let mut editor = index.editor();
        editor.add(PathEdit::delete_path("f").unwrap());
        editor.finish().unwrap();

        assert_eq!(index.entry_count(), 0);
    }

    #[test]
    fn failed_commit_releases_lock_and_keeps_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let path = dir.path().join("index");
        let mut index = Index::new(path.clone().into_boxed_path());

        index.lock().unwrap();
        let mut editor = index.editor();
        editor.add(PathEdit::update("f", |_| {}).unwrap());

        assert!(matches!(
            editor.commit(),
            Err(IndexError::UnsetFileMode(_))
        ));
        assert!(!index.is_locked());
        assert!(!dir.path().join("index.lock").exists());
        assert!(!path.exists());

        let mut other = Index::new(path.into_boxed_path());
        assert!(other.lock().is_ok());
        other.unlock();
        assert!(index.lock().is_ok());
    }
}
