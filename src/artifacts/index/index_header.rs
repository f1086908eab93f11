use crate::artifacts::index::error::{IndexError, IndexResult};
use crate::artifacts::index::{SIGNATURE, SUPPORTED_VERSIONS};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::{Read, Write};

#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexHeader {
    pub(crate) marker: [u8; 4],
    pub(crate) version: u32,
    pub(crate) entries_count: u32,
}

impl IndexHeader {
    pub(crate) fn serialize(&self) -> IndexResult<Bytes> {
        let mut bytes = Vec::with_capacity(crate::artifacts::index::HEADER_SIZE);
        bytes.write_all(&self.marker)?;
        bytes.write_u32::<NetworkEndian>(self.version)?;
        bytes.write_u32::<NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }

    /// Read and check signature and version
    pub(crate) fn deserialize(reader: &mut impl Read) -> IndexResult<Self> {
        let mut marker = [0u8; 4];
        reader.read_exact(&mut marker)?;
        if &marker != SIGNATURE {
            return Err(IndexError::Corrupt("invalid index file signature".to_string()));
        }

        let version = reader.read_u32::<NetworkEndian>()?;
        if !SUPPORTED_VERSIONS.contains(&version) {
            return Err(IndexError::UnsupportedVersion(version));
        }

        let entries_count = reader.read_u32::<NetworkEndian>()?;

        Ok(IndexHeader {
            marker,
            version,
            entries_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    #[test]
    fn header_layout_matches_git() {
        let header = IndexHeader::new(*SIGNATURE, 2, 3);
        let bytes = header.serialize().unwrap();

        assert_eq!(&bytes[..], b"DIRC\x00\x00\x00\x02\x00\x00\x00\x03");
        assert_eq!(
            IndexHeader::deserialize(&mut Cursor::new(bytes)).unwrap(),
            header
        );
    }

    #[test]
    fn rejects_path_compressed_indexes() {
        let bytes = IndexHeader::new(*SIGNATURE, 4, 0).serialize().unwrap();

        assert!(matches!(
            IndexHeader::deserialize(&mut Cursor::new(bytes)),
            Err(IndexError::UnsupportedVersion(4))
        ));
    }

    #[test]
    fn rejects_foreign_signatures() {
        let bytes = IndexHeader::new(*b"PACK", 2, 0).serialize().unwrap();

        assert!(matches!(
            IndexHeader::deserialize(&mut Cursor::new(bytes)),
            Err(IndexError::Corrupt(_))
        ));
    }
}
