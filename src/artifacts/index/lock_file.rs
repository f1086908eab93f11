//! Lock file protocol for atomic index replacement
//!
//! Taking the lock means creating `<target>.lock` exclusively. While the lock
//! is held all writes land in that side file; committing syncs it and renames
//! it over the target, dropping the handle without committing deletes it.
//! The canonical file is therefore either fully replaced or never touched.
//!
//! The lock is advisory and process-wide: a second writer in this or any other
//! process fails immediately instead of waiting. A lock left behind by a
//! crashed writer has to be removed by hand.

use crate::artifacts::index::LOCK_SUFFIX;
use crate::artifacts::index::error::{IndexError, IndexResult};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Exclusive write handle on a file, released on drop
#[derive(Debug)]
pub struct LockFile {
    target: Box<Path>,
    lock_path: Box<Path>,
    writer: Option<BufWriter<File>>,
    committed: bool,
}

impl LockFile {
    /// Create the lock file next to `target`
    ///
    /// # Errors
    ///
    /// [`IndexError::Locked`] when the lock file already exists.
    pub fn acquire(target: &Path) -> IndexResult<Self> {
        let lock_path = Self::lock_path_for(target);

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
        {
            Ok(file) => {
                debug!(lock = %lock_path.display(), "acquired lock");

                Ok(LockFile {
                    target: target.into(),
                    lock_path: lock_path.into_boxed_path(),
                    writer: Some(BufWriter::new(file)),
                    committed: false,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(IndexError::Locked(lock_path)),
            Err(e) => Err(IndexError::Io(e)),
        }
    }

    pub fn lock_path_for(target: &Path) -> PathBuf {
        let mut lock_path = target.as_os_str().to_owned();
        lock_path.push(LOCK_SUFFIX);
        PathBuf::from(lock_path)
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Durably write the side file and rename it over the target
    ///
    /// On failure the target is untouched and the side file is removed.
    pub fn commit(mut self) -> IndexResult<()> {
        let mut writer = self.writer.take().ok_or(IndexError::NotLocked)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        drop(writer);

        std::fs::rename(&self.lock_path, &self.target)?;
        self.committed = true;
        debug!(target = %self.target.display(), "committed lock");

        Ok(())
    }

    /// Release the lock, discarding anything written
    pub fn unlock(self) {}
}

impl Write for LockFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.writer.as_mut() {
            Some(writer) => writer.write(buf),
            None => Err(std::io::Error::other("lock already released")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.writer.as_mut() {
            Some(writer) => writer.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.committed {
            return;
        }

        // close before unlinking
        self.writer.take();
        match std::fs::remove_file(&self.lock_path) {
            Ok(()) => debug!(lock = %self.lock_path.display(), "released lock"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(lock = %self.lock_path.display(), error = %e, "failed to remove lock"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn second_writer_fails_immediately() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");

        let lock = LockFile::acquire(&target).unwrap();
        let second = LockFile::acquire(&target);

        match second {
            Err(IndexError::Locked(path)) => assert_eq!(path, lock.lock_path()),
            other => panic!("expected lock failure, got {:?}", other),
        }
    }

    #[test]
    fn dropping_discards_side_file() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");
        std::fs::write(&target, b"original").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"replacement").unwrap();
        let lock_path = lock.lock_path().to_path_buf();
        drop(lock);

        assert!(!lock_path.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"original");
        assert!(LockFile::acquire(&target).is_ok());
    }

    #[test]
    fn commit_replaces_target() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");
        std::fs::write(&target, b"original").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"replacement").unwrap();
        let lock_path = lock.lock_path().to_path_buf();
        lock.commit().unwrap();

        assert!(!lock_path.exists());
        assert_eq!(std::fs::read(&target).unwrap(), b"replacement");
    }

    #[test]
    fn failed_rename_leaves_target_untouched() {
        let dir = assert_fs::TempDir::new().unwrap();
        let target = dir.path().join("index");
        std::fs::create_dir(&target).unwrap();
        std::fs::write(target.join("keep"), b"occupied").unwrap();

        let mut lock = LockFile::acquire(&target).unwrap();
        lock.write_all(b"replacement").unwrap();
        let lock_path = lock.lock_path().to_path_buf();

        assert!(lock.commit().is_err());
        assert!(target.is_dir());
        assert!(!lock_path.exists());
    }
}
