use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::error::IndexResult;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::objects::object_id::ObjectId;
use derive_new::new;

/// One named slot of a stored tree: what it points at and how
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct DatabaseEntry {
    pub oid: ObjectId,
    pub mode: EntryMode,
}

impl DatabaseEntry {
    pub fn is_tree(&self) -> bool {
        self.mode.is_tree()
    }

    /// Stage this slot at `path` as a resolved entry with no stat data
    pub fn to_index_entry(&self, path: &[u8]) -> IndexResult<IndexEntry> {
        let mut entry = IndexEntry::new(path, Stage::Merged)?;
        entry.mode = self.mode;
        entry.oid = self.oid;

        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::FileMode;
    use pretty_assertions::assert_eq;

    #[test]
    fn tree_slots_become_resolved_entries() {
        let oid = ObjectId::from_bytes([7; 20]);
        let slot = DatabaseEntry::new(oid, EntryMode::File(FileMode::Executable));

        let entry = slot.to_index_entry(b"bin/run").unwrap();

        assert_eq!(entry.path(), b"bin/run");
        assert_eq!(entry.stage(), Stage::Merged);
        assert_eq!(entry.mode, slot.mode);
        assert_eq!(entry.oid, oid);
        assert!(slot.to_index_entry(b"../escape").is_err());
    }
}
