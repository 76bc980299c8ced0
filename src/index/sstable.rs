//! Immutable on-disk sorted table. mmap'd for reads; written once, atomically renamed into
//! place (never mutated after creation).

use memmap2::Mmap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::IndexError;
use crate::ids::{FileId, PathId, VolumeId};
use crate::index::memtable::{EntryKey, MemTable, MemValue};
use crate::model::{FileAttributes, FileEntry, FileTimestamps};

const MAGIC: [u8; 4] = *b"DSLM";
const VERSION: u32 = 1;
const HEADER_LEN: usize = 64;
const INDEX_ENTRY_LEN: usize = 29;

#[derive(Clone, Copy, Debug)]
struct Header {
    entry_count: u64,
    level: u32,
    min_volume_id: u64,
    max_volume_id: u64,
    min_file_id: u64,
    max_file_id: u64,
    data_offset: u64,
}

impl Header {
    fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&MAGIC);
        buf[4..8].copy_from_slice(&VERSION.to_le_bytes());
        buf[8..16].copy_from_slice(&self.entry_count.to_le_bytes());
        buf[16..20].copy_from_slice(&self.level.to_le_bytes());
        buf[20..28].copy_from_slice(&self.min_volume_id.to_le_bytes());
        buf[28..36].copy_from_slice(&self.max_volume_id.to_le_bytes());
        buf[36..44].copy_from_slice(&self.min_file_id.to_le_bytes());
        buf[44..52].copy_from_slice(&self.max_file_id.to_le_bytes());
        buf[52..60].copy_from_slice(&self.data_offset.to_le_bytes());
        // bytes 60..64 reserved, left zeroed.
        buf
    }

    fn decode(buf: &[u8], path: &Path) -> Result<Header, IndexError> {
        if buf.len() < HEADER_LEN || buf[0..4] != MAGIC {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: "bad magic".into(),
            });
        }
        let version = u32::from_le_bytes(buf[4..8].try_into().unwrap());
        if version != VERSION {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: format!("unsupported version {version}"),
            });
        }
        Ok(Header {
            entry_count: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            level: u32::from_le_bytes(buf[16..20].try_into().unwrap()),
            min_volume_id: u64::from_le_bytes(buf[20..28].try_into().unwrap()),
            max_volume_id: u64::from_le_bytes(buf[28..36].try_into().unwrap()),
            min_file_id: u64::from_le_bytes(buf[36..44].try_into().unwrap()),
            max_file_id: u64::from_le_bytes(buf[44..52].try_into().unwrap()),
            data_offset: u64::from_le_bytes(buf[52..60].try_into().unwrap()),
        })
    }
}

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    file_id: u64,
    volume_id: u64,
    data_offset: u64,
    data_len: u32,
    tombstone: bool,
}

impl IndexEntry {
    fn encode(&self) -> [u8; INDEX_ENTRY_LEN] {
        let mut buf = [0u8; INDEX_ENTRY_LEN];
        buf[0..8].copy_from_slice(&self.file_id.to_le_bytes());
        buf[8..16].copy_from_slice(&self.volume_id.to_le_bytes());
        buf[16..24].copy_from_slice(&self.data_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&self.data_len.to_le_bytes());
        buf[28] = self.tombstone as u8;
        buf
    }

    fn decode(buf: &[u8]) -> IndexEntry {
        IndexEntry {
            file_id: u64::from_le_bytes(buf[0..8].try_into().unwrap()),
            volume_id: u64::from_le_bytes(buf[8..16].try_into().unwrap()),
            data_offset: u64::from_le_bytes(buf[16..24].try_into().unwrap()),
            data_len: u32::from_le_bytes(buf[24..28].try_into().unwrap()),
            tombstone: buf[28] != 0,
        }
    }
}

fn put_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
    buf.extend_from_slice(bytes);
}

fn take_bytes<'a>(buf: &'a [u8], pos: &mut usize) -> &'a [u8] {
    let len = u32::from_le_bytes(buf[*pos..*pos + 4].try_into().unwrap()) as usize;
    *pos += 4;
    let out = &buf[*pos..*pos + len];
    *pos += len;
    out
}

fn encode_optional_hash(buf: &mut Vec<u8>, hash: &Option<[u8; 32]>) {
    match hash {
        Some(h) => {
            buf.push(1);
            buf.extend_from_slice(h);
        }
        None => buf.push(0),
    }
}

fn decode_optional_hash(buf: &[u8], pos: &mut usize) -> Option<[u8; 32]> {
    let present = buf[*pos];
    *pos += 1;
    if present == 0 {
        return None;
    }
    let mut h = [0u8; 32];
    h.copy_from_slice(&buf[*pos..*pos + 32]);
    *pos += 32;
    Some(h)
}

/// Encode a `FileEntry` payload. `perceptual_hash`/`image_dimensions`/`audio_duration` are not
/// persisted: the scanner and dedup cascade never populate them (see model::FileEntry docs).
fn encode_entry(entry: &FileEntry) -> Vec<u8> {
    let mut buf = Vec::with_capacity(96 + entry.full_path.as_os_str().len());
    buf.extend_from_slice(&entry.volume_id.get().to_le_bytes());
    buf.extend_from_slice(&entry.file_id.get().to_le_bytes());
    buf.extend_from_slice(&entry.path_id.get().to_le_bytes());
    buf.extend_from_slice(&entry.size_logical.to_le_bytes());
    buf.extend_from_slice(&entry.size_on_disk.to_le_bytes());
    buf.extend_from_slice(&entry.attributes.bits().to_le_bytes());
    buf.extend_from_slice(&entry.timestamps.creation_time.to_le_bytes());
    buf.extend_from_slice(&entry.timestamps.last_write_time.to_le_bytes());
    buf.extend_from_slice(&entry.timestamps.last_access_time.to_le_bytes());
    buf.extend_from_slice(&entry.timestamps.change_time.to_le_bytes());
    encode_optional_hash(&mut buf, &entry.head_tail_signature);
    encode_optional_hash(&mut buf, &entry.content_hash);
    put_bytes(&mut buf, entry.full_path.to_string_lossy().as_bytes());
    buf
}

fn decode_entry(buf: &[u8]) -> FileEntry {
    let mut pos = 0usize;
    let mut next_u64 = |p: &mut usize| {
        let v = u64::from_le_bytes(buf[*p..*p + 8].try_into().unwrap());
        *p += 8;
        v
    };
    let volume_id = VolumeId::new(next_u64(&mut pos));
    let file_id = FileId::new(next_u64(&mut pos));
    let path_id = PathId::new(next_u64(&mut pos));
    let size_logical = next_u64(&mut pos);
    let size_on_disk = next_u64(&mut pos);
    let attr_bits = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
    pos += 2;
    let attributes = FileAttributes::from_bits_truncate(attr_bits);
    let timestamps = FileTimestamps {
        creation_time: next_u64(&mut pos),
        last_write_time: next_u64(&mut pos),
        last_access_time: next_u64(&mut pos),
        change_time: next_u64(&mut pos),
    };
    let head_tail_signature = decode_optional_hash(buf, &mut pos);
    let content_hash = decode_optional_hash(buf, &mut pos);
    let path_bytes = take_bytes(buf, &mut pos);
    let full_path = PathBuf::from(String::from_utf8_lossy(path_bytes).into_owned());

    FileEntry {
        volume_id,
        file_id,
        path_id,
        full_path,
        size_logical,
        size_on_disk,
        attributes,
        timestamps,
        head_tail_signature,
        content_hash,
        perceptual_hash: None,
        image_dimensions: None,
        audio_duration: None,
    }
}

/// An immutable, mmap'd sorted table on disk.
pub struct SSTable {
    path: PathBuf,
    mmap: Mmap,
    header: Header,
    index: Vec<IndexEntry>,
}

impl SSTable {
    /// Write `memtable`'s entries (including tombstones) to a new SSTable at `path`, then
    /// reopen it mmap'd. Writes to a `.tmp` sibling first and renames into place so a reader
    /// never observes a partially-written file.
    pub fn write(path: &Path, level: u32, memtable: &MemTable) -> Result<SSTable, IndexError> {
        let mut index = Vec::with_capacity(memtable.len());
        let mut data = Vec::new();
        let mut min_key: (u64, u64) = (u64::MAX, u64::MAX);
        let mut max_key: (u64, u64) = (0, 0);

        for ((volume_id, file_id), value) in memtable.iter() {
            let key = (volume_id.get(), file_id.get());
            min_key = min_key.min(key);
            max_key = max_key.max(key);
            let offset = data.len() as u64;
            let (len, tombstone) = match value {
                MemValue::Live(entry) => {
                    let encoded = encode_entry(entry);
                    let len = encoded.len() as u32;
                    data.extend_from_slice(&encoded);
                    (len, false)
                }
                MemValue::Tombstone => (0, true),
            };
            index.push(IndexEntry {
                file_id: file_id.get(),
                volume_id: volume_id.get(),
                data_offset: offset,
                data_len: len,
                tombstone,
            });
        }
        if memtable.is_empty() {
            min_key = (0, 0);
        }

        let header = Header {
            entry_count: index.len() as u64,
            level,
            min_volume_id: min_key.0,
            max_volume_id: max_key.0,
            min_file_id: min_key.1,
            max_file_id: max_key.1,
            data_offset: (HEADER_LEN + index.len() * INDEX_ENTRY_LEN) as u64,
        };

        let tmp_path = path.with_extension("sst.tmp");
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(&header.encode())?;
            for e in &index {
                file.write_all(&e.encode())?;
            }
            file.write_all(&data)?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp_path, path)?;

        Self::open(path)
    }

    pub fn open(path: &Path) -> Result<SSTable, IndexError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        if mmap.len() < HEADER_LEN {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: "file shorter than header".into(),
            });
        }
        let header = Header::decode(&mmap[..HEADER_LEN], path)?;
        let index_bytes_len = header.entry_count as usize * INDEX_ENTRY_LEN;
        let index_region_end = HEADER_LEN + index_bytes_len;
        if mmap.len() < index_region_end {
            return Err(IndexError::Corrupt {
                path: path.to_path_buf(),
                reason: "truncated index region".into(),
            });
        }
        let mut index = Vec::with_capacity(header.entry_count as usize);
        for i in 0..header.entry_count as usize {
            let start = HEADER_LEN + i * INDEX_ENTRY_LEN;
            index.push(IndexEntry::decode(&mmap[start..start + INDEX_ENTRY_LEN]));
        }
        Ok(SSTable {
            path: path.to_path_buf(),
            mmap,
            header,
            index,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn level(&self) -> u32 {
        self.header.level
    }

    /// `(volumeId, fileId)` of the smallest key in this table.
    pub fn min_key(&self) -> (u64, u64) {
        (self.header.min_volume_id, self.header.min_file_id)
    }

    /// `(volumeId, fileId)` of the largest key in this table.
    pub fn max_key(&self) -> (u64, u64) {
        (self.header.max_volume_id, self.header.max_file_id)
    }

    pub fn entry_count(&self) -> usize {
        self.header.entry_count as usize
    }

    fn data_slice(&self, entry: &IndexEntry) -> &[u8] {
        let start = self.header.data_offset as usize + entry.data_offset as usize;
        &self.mmap[start..start + entry.data_len as usize]
    }

    /// Binary-search by `(volumeId, fileId)` since the index region is sorted on that pair
    /// during `write`.
    fn find(&self, volume_id: VolumeId, file_id: FileId) -> Option<&IndexEntry> {
        let key = (volume_id.get(), file_id.get());
        self.index
            .binary_search_by_key(&key, |e| (e.volume_id, e.file_id))
            .ok()
            .map(|i| &self.index[i])
    }

    /// `Some(Some(entry))` for a live value, `Some(None)` for a tombstone (the key was
    /// deleted at this table's generation), `None` if the key is absent entirely.
    pub fn get(&self, volume_id: VolumeId, file_id: FileId) -> Option<Option<FileEntry>> {
        let entry = self.find(volume_id, file_id)?;
        if entry.tombstone {
            return Some(None);
        }
        Some(Some(decode_entry(self.data_slice(entry))))
    }

    /// Iterate every live entry in this table, in key order.
    pub fn iter_live(&self) -> impl Iterator<Item = FileEntry> + '_ {
        self.index.iter().filter(|e| !e.tombstone).map(|e| decode_entry(self.data_slice(e)))
    }

    /// Iterate every slot (live and tombstone) in key order, for compaction merges.
    pub fn iter_raw(&self) -> impl Iterator<Item = (EntryKey, Option<FileEntry>)> + '_ {
        self.index.iter().map(move |e| {
            (
                (VolumeId::new(e.volume_id), FileId::new(e.file_id)),
                (!e.tombstone).then(|| decode_entry(self.data_slice(e))),
            )
        })
    }
}
