//! In-memory sorted table: the active write buffer for the LSM index.

use std::collections::BTreeMap;

use crate::ids::{FileId, VolumeId};
use crate::model::FileEntry;

/// One slot in a memtable: either a live value or a tombstone recording a deletion.
#[derive(Clone, Debug)]
pub enum MemValue {
    Live(FileEntry),
    Tombstone,
}

/// Unique key within the index: `fileId` alone is only unique per volume (e.g. inode numbers
/// collide across devices), so every layer keys on the pair.
pub type EntryKey = (VolumeId, FileId);

/// Sorted in-memory table keyed by `(VolumeId, FileId)`. Read-your-writes within the same
/// table; last write for a key wins (insertion order is not preserved, `put`/`remove` simply
/// overwrite).
#[derive(Default)]
pub struct MemTable {
    entries: BTreeMap<EntryKey, MemValue>,
    /// Approximate byte size (entry overhead + serialized payload), used to decide when to
    /// rotate the active memtable to immutable and flush.
    approx_size: usize,
}

/// Fixed per-entry overhead charged against the memtable size budget, independent of the
/// variable-length path/signature payload.
const ENTRY_OVERHEAD: usize = 64;

impl MemTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, entry: FileEntry) {
        self.approx_size += ENTRY_OVERHEAD + entry.full_path.as_os_str().len();
        self.entries
            .insert((entry.volume_id, entry.file_id), MemValue::Live(entry));
    }

    pub fn remove(&mut self, volume_id: VolumeId, file_id: FileId) {
        self.approx_size += ENTRY_OVERHEAD;
        self.entries.insert((volume_id, file_id), MemValue::Tombstone);
    }

    pub fn get(&self, volume_id: VolumeId, file_id: FileId) -> Option<&FileEntry> {
        match self.entries.get(&(volume_id, file_id)) {
            Some(MemValue::Live(e)) => Some(e),
            Some(MemValue::Tombstone) | None => None,
        }
    }

    pub fn approx_size(&self) -> usize {
        self.approx_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate all slots (including tombstones) in key order, for flushing to an SSTable.
    pub fn iter(&self) -> impl Iterator<Item = (EntryKey, &MemValue)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.approx_size = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{PathId, VolumeId};
    use std::path::PathBuf;

    fn entry(id: u64) -> FileEntry {
        FileEntry::new(
            VolumeId::new(1),
            FileId::new(id),
            PathId::new(id),
            PathBuf::from(format!("/f{id}")),
        )
    }

    #[test]
    fn read_your_writes() {
        let mut mt = MemTable::new();
        mt.put(entry(1));
        assert!(mt.get(VolumeId::new(1), FileId::new(1)).is_some());
    }

    #[test]
    fn tombstone_shadows_live_entry() {
        let mut mt = MemTable::new();
        mt.put(entry(1));
        mt.remove(VolumeId::new(1), FileId::new(1));
        assert!(mt.get(VolumeId::new(1), FileId::new(1)).is_none());
    }

    #[test]
    fn last_write_wins() {
        let mut mt = MemTable::new();
        mt.remove(VolumeId::new(1), FileId::new(1));
        mt.put(entry(1));
        assert!(mt.get(VolumeId::new(1), FileId::new(1)).is_some());
    }

    #[test]
    fn same_file_id_different_volume_is_distinct() {
        let mut mt = MemTable::new();
        let mut a = entry(1);
        a.volume_id = VolumeId::new(1);
        let mut b = entry(1);
        b.volume_id = VolumeId::new(2);
        mt.put(a);
        mt.put(b);
        assert_eq!(mt.len(), 2);
        assert!(mt.get(VolumeId::new(1), FileId::new(1)).is_some());
        assert!(mt.get(VolumeId::new(2), FileId::new(1)).is_some());
    }
}
