//! Working tree access
//!
//! Lists the files under the repository root (skipping `.git`), reads their
//! content and stats them for index entries. Symlinks are never followed:
//! their content is the link target and their mode is `120000`.

use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use bytes::Bytes;
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 3] = [".git", ".", ".."];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        let data = self.read_file(path)?;
        Ok(Blob::new(data))
    }

    /// Resolve a user-supplied path to one relative to the repository root
    ///
    /// The path does not need to exist.
    pub fn relative_path(&self, path: &Path) -> anyhow::Result<PathBuf> {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.canonicalize()?.join(path)
        };

        let mut normalized = PathBuf::new();
        for component in absolute.components() {
            match component {
                std::path::Component::CurDir => {}
                std::path::Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }

        normalized
            .strip_prefix(self.path.as_ref())
            .map(PathBuf::from)
            .with_context(|| format!("'{}' is outside repository", path.display()))
    }

    /// List every file and symlink at or below `root_file_path`
    ///
    /// Paths are relative to the repository root and sorted.
    pub fn list_files(&self, root_file_path: Option<PathBuf>) -> anyhow::Result<Vec<PathBuf>> {
        let root_file_path = match root_file_path {
            Some(p) => self.path.join(p),
            None => self.path.clone().into(),
        };

        // Check if the root_file_path exists
        let metadata = std::fs::symlink_metadata(&root_file_path).with_context(|| {
            format!(
                "pathspec '{}' did not match any files",
                root_file_path.display()
            )
        })?;

        if metadata.is_dir() {
            let mut files = WalkDir::new(&root_file_path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| !entry.file_type().is_dir())
                .filter_map(|entry| self.check_if_not_ignored_path(entry.path()))
                .collect::<Vec<_>>();
            files.sort_by(|a, b| a.as_os_str().as_bytes().cmp(b.as_os_str().as_bytes()));

            Ok(files)
        } else {
            Ok(self
                .check_if_not_ignored_path(&root_file_path)
                .into_iter()
                .collect())
        }
    }

    fn is_ignored(path: &Path) -> bool {
        // Check if any component of the path is in IGNORED_PATHS
        path.components().any(|component| {
            if let std::path::Component::Normal(name) = component {
                let name_str = name.to_string_lossy();
                IGNORED_PATHS.contains(&name_str.as_ref())
            } else {
                false
            }
        })
    }

    fn check_if_not_ignored_path(&self, path: &Path) -> Option<PathBuf> {
        let relative = path.strip_prefix(self.path.as_ref()).ok()?;

        if !Self::is_ignored(relative) {
            Some(relative.to_path_buf())
        } else {
            None
        }
    }

    /// Read a file's content, or a symlink's target
    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let file_path = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&file_path)
            .with_context(|| format!("Unable to stat {}", file_path.display()))?;

        if metadata.file_type().is_symlink() {
            let target = std::fs::read_link(&file_path)
                .with_context(|| format!("Unable to read link {}", file_path.display()))?;
            return Ok(Bytes::copy_from_slice(target.as_os_str().as_bytes()));
        }

        let content = std::fs::read(&file_path)
            .with_context(|| format!("Unable to read file {}", file_path.display()))?;

        Ok(content.into())
    }

    /// Stat a file without following symlinks
    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<(EntryMode, EntryMetadata)> {
        let full_path = self.path.join(file_path);
        let metadata = std::fs::symlink_metadata(&full_path)
            .with_context(|| format!("Unable to stat {}", full_path.display()))?;

        Ok((
            EntryMode::from_metadata(&full_path, &metadata),
            EntryMetadata::from(&metadata),
        ))
    }

    pub fn exists(&self, file_path: &Path) -> bool {
        std::fs::symlink_metadata(self.path.join(file_path)).is_ok()
    }
}
