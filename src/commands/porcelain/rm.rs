use crate::areas::repository::Repository;
use crate::artifacts::index::editor::PathEdit;
use std::collections::BTreeSet;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

impl Repository {
    /// Unstage paths, leaving the working tree alone
    ///
    /// Directories are only unstaged with `recursive`. Every path must match
    /// something in the index, otherwise nothing is unstaged.
    pub async fn rm_cached(&mut self, paths: &[String], recursive: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.transaction(|index| -> anyhow::Result<()> {
            let mut edits = Vec::new();
            // paths named twice or covered by a named directory print once
            let mut removed = BTreeSet::new();

            for path in paths {
                let relative = self.workspace().relative_path(Path::new(path))?;
                let relative = relative.as_os_str().as_bytes();

                if !index.entries_for_path(relative).is_empty() {
                    edits.push(PathEdit::delete_path(relative)?);
                    removed.insert(String::from_utf8_lossy(relative).into_owned());
                    continue;
                }

                let nested = index.entries_with_prefix(relative);
                if nested.is_empty() {
                    anyhow::bail!("pathspec '{}' did not match any files", path);
                }
                if !recursive {
                    anyhow::bail!("not removing '{}' recursively without -r", path);
                }

                removed.extend(nested.iter().map(|entry| entry.path_str().into_owned()));
                edits.push(PathEdit::delete_tree(relative)?);
            }

            let mut editor = index.editor();
            for edit in edits {
                editor.add(edit);
            }
            editor.commit()?;

            for path in removed {
                writeln!(self.writer(), "rm '{}'", path)?;
            }

            Ok(())
        })
    }
}
