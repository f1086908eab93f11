//! SHA-1 trailer of the index file
//!
//! Wraps the reader or writer of an index file and hashes every byte that goes
//! through it, so the trailing checksum can be produced or verified once the
//! last entry has been handled.

use crate::artifacts::index::CHECKSUM_SIZE;
use crate::artifacts::index::error::{IndexError, IndexResult};
use sha1::{Digest, Sha1};
use std::io::{Read, Write};

#[derive(Debug)]
pub struct Checksum<S> {
    inner: S,
    digest: Sha1,
}

impl<S> Checksum<S> {
    pub(crate) fn new(inner: S) -> Self {
        Checksum {
            inner,
            digest: Sha1::new(),
        }
    }

    pub(crate) fn inner(&self) -> &S {
        &self.inner
    }

    fn finalize(&self) -> [u8; CHECKSUM_SIZE] {
        let mut checksum = [0u8; CHECKSUM_SIZE];
        checksum.copy_from_slice(self.digest.clone().finalize().as_slice());
        checksum
    }
}

impl<W: Write> Checksum<W> {
    /// Append the digest of everything written so far
    pub(crate) fn write_checksum(mut self) -> IndexResult<W> {
        let checksum = self.finalize();
        self.inner.write_all(&checksum)?;

        Ok(self.inner)
    }
}

impl<R: Read> Checksum<R> {
    /// Compare the digest of everything read so far with the stored trailer
    pub(crate) fn verify(&self, expected: &[u8]) -> IndexResult<()> {
        if expected != self.finalize().as_slice() {
            return Err(IndexError::Corrupt(
                "checksum does not match value stored on disk".to_string(),
            ));
        }

        Ok(())
    }
}

impl<R: Read> Read for Checksum<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.digest.update(&buf[..read]);
        Ok(read)
    }
}

impl<W: Write> Write for Checksum<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
