use crate::areas::repository::Repository;
use crate::artifacts::index::editor::PathEdit;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::Stage;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use derive_new::new;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Flags of the `update-index` command
#[derive(Debug, Clone, Default, new)]
pub struct UpdateIndexOptions {
    /// Stage working tree files that are not in the index yet
    pub add: bool,
    /// Unstage listed paths that are gone from the working tree
    pub remove: bool,
    /// Unstage listed paths whether or not they still exist
    pub force_remove: bool,
    /// `<mode>,<oid>,<path>` entries inserted without touching the working tree
    pub cacheinfo: Vec<String>,
    /// Stage `cacheinfo` entries are recorded at
    pub stage: Option<u8>,
}

/// Parse a `<mode>,<oid>,<path>` triple
fn parse_cacheinfo(cacheinfo: &str) -> anyhow::Result<(EntryMode, ObjectId, &str)> {
    let mut parts = cacheinfo.splitn(3, ',');
    let (Some(mode), Some(oid), Some(path)) = (parts.next(), parts.next(), parts.next()) else {
        anyhow::bail!("option 'cacheinfo' expects <mode>,<sha1>,<path>");
    };

    let mode = EntryMode::from_octal_str(mode)?;
    if !mode.is_stageable() {
        anyhow::bail!("git update-index: --cacheinfo cannot add {}", path);
    }
    let oid = ObjectId::try_parse(oid)?;

    Ok((mode, oid, path))
}

impl Repository {
    /// Edit the index directly
    ///
    /// `cacheinfo` entries are applied first, then `paths` are refreshed from
    /// the working tree. Running with nothing to do releases the lock without
    /// rewriting the index.
    pub async fn update_index(
        &mut self,
        options: UpdateIndexOptions,
        paths: &[String],
    ) -> anyhow::Result<()> {
        let stage = match options.stage {
            Some(stage) => Stage::try_from(stage)?,
            None => Stage::Merged,
        };

        let index = self.index();
        let mut index = index.lock().await;

        index.transaction(|index| -> anyhow::Result<()> {
            let mut edits = Vec::new();

            for cacheinfo in &options.cacheinfo {
                let (mode, oid, path) = parse_cacheinfo(cacheinfo)?;

                if stage == Stage::Merged {
                    // a merged entry resolves any conflict on the path
                    edits.push(PathEdit::delete_path(path)?);
                }
                edits.push(PathEdit::update_stage(path, stage, move |entry| {
                    entry.mode = mode;
                    entry.oid = oid;
                })?);
            }

            for path in paths {
                let relative = self.workspace().relative_path(Path::new(path))?;
                let relative_bytes = relative.as_os_str().as_bytes();

                if options.force_remove {
                    edits.push(PathEdit::delete_path(relative_bytes)?);
                    continue;
                }

                if !self.workspace().exists(&relative) {
                    if !options.remove {
                        anyhow::bail!(
                            "error: {}: does not exist and --remove not passed\nfatal: Unable to process path {}",
                            path,
                            path
                        );
                    }
                    edits.push(PathEdit::delete_path(relative_bytes)?);
                    continue;
                }

                if index.find_entry(relative_bytes).is_err() && !options.add {
                    anyhow::bail!(
                        "error: {}: cannot add to the index - missing --add option?\nfatal: Unable to process path {}",
                        path,
                        path
                    );
                }

                let (mode, metadata) = self.workspace().stat_file(&relative)?;
                if mode.is_tree() {
                    anyhow::bail!("{}: is a directory - add files inside instead", path);
                }
                let oid = self
                    .database()
                    .store(&self.workspace().parse_blob(&relative)?)
                    .with_context(|| format!("Unable to store {}", path))?;

                edits.push(PathEdit::delete_path(relative_bytes)?);
                edits.push(PathEdit::update(relative_bytes, move |entry| {
                    entry.mode = mode;
                    entry.oid = oid;
                    entry.metadata = metadata;
                })?);
            }

            let mut editor = index.editor();
            for edit in edits {
                editor.add(edit);
            }
            editor.commit()?;

            Ok(())
        })
    }
}
