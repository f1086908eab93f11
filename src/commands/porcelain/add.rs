use crate::areas::repository::Repository;
use crate::artifacts::index::editor::PathEdit;
use crate::artifacts::index::path_cmp;
use bytes::Bytes;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use tracing::debug;

impl Repository {
    /// Stage the given files and directories
    ///
    /// Directories are expanded to every file below them. Tracked paths that
    /// are gone from the working tree are unstaged. A staged file replaces any
    /// staged directory of the same name and any staged file where one of its
    /// parent directories now is.
    pub async fn add(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.transaction(|index| -> anyhow::Result<()> {
            let mut staged: Vec<PathBuf> = Vec::new();
            let mut removed: Vec<Bytes> = Vec::new();

            for path in paths {
                let relative = self.workspace().relative_path(Path::new(path))?;
                let relative_bytes = relative.as_os_str().as_bytes();

                if self.workspace().exists(&relative) {
                    staged.extend(self.workspace().list_files(Some(relative.clone()))?);

                    // tracked files deleted from inside the given directory
                    removed.extend(
                        index
                            .entries_with_prefix(relative_bytes)
                            .iter()
                            .filter(|entry| {
                                !self.workspace().exists(Path::new(OsStr::from_bytes(entry.path())))
                            })
                            .map(|entry| entry.path_bytes().clone()),
                    );
                } else if index.is_directly_tracked(relative_bytes) {
                    removed.push(Bytes::copy_from_slice(relative_bytes));
                } else {
                    anyhow::bail!("pathspec '{}' did not match any files", path);
                }
            }

            let mut editor = index.editor();
            for path in &removed {
                editor.add(PathEdit::delete_path(path)?);
                editor.add(PathEdit::delete_tree(path)?);
            }

            for path in &staged {
                let (mode, metadata) = self.workspace().stat_file(path)?;
                let oid = self.database().store(&self.workspace().parse_blob(path)?)?;
                let path = path.as_os_str().as_bytes();

                for dir in path_cmp::parent_dirs(path) {
                    editor.add(PathEdit::delete_path(dir)?);
                }
                editor.add(PathEdit::delete_tree(path)?);
                // drop conflict stages along with the old entry
                editor.add(PathEdit::delete_path(path)?);
                editor.add(PathEdit::update(path, move |entry| {
                    entry.mode = mode;
                    entry.oid = oid;
                    entry.metadata = metadata;
                })?);
            }

            debug!(staged = staged.len(), removed = removed.len(), "staging paths");
            editor.commit()?;

            Ok(())
        })
    }
}
