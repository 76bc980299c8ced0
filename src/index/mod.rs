//! Log-structured merge index: an active memtable backed by immutable, mmap'd SSTables on
//! disk, with background compaction. `Index` is a small trait so tests can swap in an
//! in-memory stand-in.

mod compaction;
mod memtable;
mod sstable;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::IndexError;
use crate::ids::{FileId, VolumeId};
use crate::model::FileEntry;

use compaction::CompactionWorker;
use memtable::{EntryKey, MemTable, MemValue};
use sstable::SSTable;

/// Memtable grows until it passes this approximate byte size, then rotates to immutable and
/// flushes to a new level-0 SSTable.
pub const DEFAULT_MEMTABLE_LIMIT: usize = 64 * 1024 * 1024;
/// Number of level-0 tables that triggers a compaction pass.
const COMPACTION_TRIGGER: usize = 4;

#[derive(Clone, Debug, Default)]
pub struct IndexStats {
    pub memtable_entries: usize,
    pub immutable_memtables: usize,
    pub sstable_count: usize,
    pub levels: usize,
}

/// Storage contract for the index. A trait (not a C++-style virtual base) so tests can
/// substitute an in-memory stand-in without touching disk.
pub trait Index {
    fn put(&self, entry: FileEntry) -> Result<(), IndexError>;
    fn remove(&self, volume_id: VolumeId, file_id: FileId) -> Result<(), IndexError>;
    fn get(&self, volume_id: VolumeId, file_id: FileId) -> Result<Option<FileEntry>, IndexError>;

    fn get_by_volume(&self, volume_id: VolumeId) -> Result<Vec<FileEntry>, IndexError>;
    fn get_by_size_range(&self, min: u64, max: u64) -> Result<Vec<FileEntry>, IndexError>;
    fn get_by_path_prefix(&self, prefix: &Path) -> Result<Vec<FileEntry>, IndexError>;
    fn get_by_extension(&self, extension: &str) -> Result<Vec<FileEntry>, IndexError>;
    fn get_by_date_range(&self, start: u64, end: u64) -> Result<Vec<FileEntry>, IndexError>;

    fn flush(&self) -> Result<(), IndexError>;
    fn compact(&self) -> Result<(), IndexError>;
    fn start_compaction(&self) -> Result<(), IndexError>;
    fn stop_compaction(&self) -> Result<(), IndexError>;

    fn get_stats(&self) -> IndexStats;
    fn clear(&self) -> Result<(), IndexError>;
}

struct Inner {
    active: MemTable,
    immutable: Vec<MemTable>,
    /// `levels[0]` holds the newest flushed/compacted tables; within a level, index 0 is the
    /// newest table. Lookups scan active, then immutable (newest first), then levels in order.
    levels: Vec<Vec<Arc<SSTable>>>,
}

/// State shared with the background compaction worker via `Arc`, independent of wherever
/// the owning `LsmIndex` itself lives.
struct Shared {
    dir: PathBuf,
    memtable_limit: usize,
    inner: Mutex<Inner>,
    flush_lock: Mutex<()>,
    next_id: AtomicU64,
}

impl Shared {
    fn sstable_path(&self, level: u32, id: u64) -> PathBuf {
        self.dir.join(format!("{level:02}-{id:08}.sst"))
    }

    fn merged_live_entries(&self) -> HashMap<EntryKey, FileEntry> {
        let inner = self.inner.lock().unwrap();
        let mut map: HashMap<EntryKey, Option<FileEntry>> = HashMap::new();

        for level in inner.levels.iter().rev() {
            for table in level.iter().rev() {
                for (key, value) in table.iter_raw() {
                    map.insert(key, value);
                }
            }
        }
        for mt in inner.immutable.iter() {
            for (key, value) in mt.iter() {
                map.insert(
                    key,
                    match value {
                        MemValue::Live(e) => Some(e.clone()),
                        MemValue::Tombstone => None,
                    },
                );
            }
        }
        for (key, value) in inner.active.iter() {
            map.insert(
                key,
                match value {
                    MemValue::Live(e) => Some(e.clone()),
                    MemValue::Tombstone => None,
                },
            );
        }

        map.into_iter().filter_map(|(key, v)| v.map(|e| (key, e))).collect()
    }

    fn get(&self, volume_id: VolumeId, file_id: FileId) -> Result<Option<FileEntry>, IndexError> {
        let key = (volume_id, file_id);
        let inner = self.inner.lock().unwrap();
        if let Some(v) = inner.active.iter().find(|(k, _)| *k == key) {
            return Ok(match v.1 {
                MemValue::Live(e) => Some(e.clone()),
                MemValue::Tombstone => None,
            });
        }
        for mt in inner.immutable.iter().rev() {
            if let Some(v) = mt.iter().find(|(k, _)| *k == key) {
                return Ok(match v.1 {
                    MemValue::Live(e) => Some(e.clone()),
                    MemValue::Tombstone => None,
                });
            }
        }
        let key_pair = (volume_id.get(), file_id.get());
        for level in inner.levels.iter() {
            for table in level.iter() {
                if table.min_key() > key_pair || table.max_key() < key_pair {
                    continue;
                }
                if let Some(found) = table.get(volume_id, file_id) {
                    return Ok(found);
                }
            }
        }
        Ok(None)
    }

    fn maybe_rotate_and_flush(&self) -> Result<(), IndexError> {
        let needs_flush = {
            let inner = self.inner.lock().unwrap();
            inner.active.approx_size() >= self.memtable_limit
        };
        if needs_flush {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), IndexError> {
        let _guard = self.flush_lock.lock().unwrap();

        let to_flush = {
            let mut inner = self.inner.lock().unwrap();
            if inner.active.is_empty() {
                return Ok(());
            }
            let full = std::mem::replace(&mut inner.active, MemTable::new());
            inner.immutable.push(MemTable::new());
            full
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.sstable_path(0, id);
        let table = SSTable::write(&path, 0, &to_flush)?;

        let mut inner = self.inner.lock().unwrap();
        inner.immutable.pop();
        if inner.levels.is_empty() {
            inner.levels.push(Vec::new());
        }
        inner.levels[0].insert(0, Arc::new(table));
        let should_compact = inner.levels[0].len() >= COMPACTION_TRIGGER;
        drop(inner);

        if should_compact {
            self.compaction_hint.set_pending();
        }
        Ok(())
    }

    /// Full merge of every on-disk SSTable into a single level-1 table. Newest generation
    /// wins on key collision; tombstones are dropped since after a full merge there is no
    /// older generation left for them to shadow.
    fn compact(&self) -> Result<(), IndexError> {
        let _guard = self.flush_lock.lock().unwrap();

        let (old_tables, old_level_count) = {
            let inner = self.inner.lock().unwrap();
            (
                inner.levels.iter().flatten().cloned().collect::<Vec<_>>(),
                inner.levels.len(),
            )
        };
        if old_tables.len() < 2 {
            return Ok(());
        }

        // levels[0] is newest-first already; merge oldest-to-newest so later writes
        // overwrite earlier ones in the map, matching the active-memtable precedence rule.
        let mut merged: HashMap<EntryKey, FileEntry> = HashMap::new();
        for table in old_tables.iter().rev() {
            for (key, value) in table.iter_raw() {
                match value {
                    Some(entry) => {
                        merged.insert(key, entry);
                    }
                    None => {
                        merged.remove(&key);
                    }
                }
            }
        }

        let mut mt = MemTable::new();
        for (_, entry) in merged {
            mt.put(entry);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let path = self.sstable_path(1, id);
        let new_table = if mt.is_empty() {
            None
        } else {
            Some(SSTable::write(&path, 1, &mt)?)
        };

        let old_paths: Vec<PathBuf> = old_tables.iter().map(|t| t.path().to_path_buf()).collect();

        {
            let mut inner = self.inner.lock().unwrap();
            inner.levels = vec![Vec::new(); old_level_count.max(2)];
            if let Some(t) = new_table {
                inner.levels[1].push(Arc::new(t));
            }
        }
        for p in old_paths {
            let _ = std::fs::remove_file(p);
        }
        Ok(())
    }
}

/// Shared flag the flush path sets and the compaction worker clears, so the worker only
/// does real work on its poll tick when a flush actually pushed the level-0 count over
/// [`COMPACTION_TRIGGER`].
#[derive(Default)]
struct CompactionHint(std::sync::atomic::AtomicBool);

impl CompactionHint {
    fn set_pending(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn take(&self) -> bool {
        self.0.swap(false, Ordering::Relaxed)
    }
}

/// Real LSM-backed implementation of [`Index`].
pub struct LsmIndex {
    shared: Arc<SharedWithHint>,
    compaction: Mutex<Option<CompactionWorker>>,
}

/// `Shared` plus the compaction hint, grouped so both travel together into the worker
/// closure behind one `Arc`.
struct SharedWithHint {
    shared: Shared,
    compaction_hint: CompactionHint,
}

impl std::ops::Deref for SharedWithHint {
    type Target = Shared;
    fn deref(&self) -> &Shared {
        &self.shared
    }
}

impl LsmIndex {
    pub fn open(dir: impl Into<PathBuf>) -> Result<LsmIndex, IndexError> {
        Self::open_with_limit(dir, DEFAULT_MEMTABLE_LIMIT)
    }

    pub fn open_with_limit(
        dir: impl Into<PathBuf>,
        memtable_limit: usize,
    ) -> Result<LsmIndex, IndexError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut levels: Vec<Vec<Arc<SSTable>>> = vec![Vec::new()];
        let mut max_id = 0u64;
        let mut entries: Vec<_> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "sst"))
            .collect();
        entries.sort();

        for path in entries {
            let table = SSTable::open(&path)?;
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Some((level_str, id_str)) = stem.split_once('-')
                && let (Ok(_), Ok(id)) = (level_str.parse::<u32>(), id_str.parse::<u64>())
            {
                max_id = max_id.max(id);
            }
            let level = table.level() as usize;
            while levels.len() <= level {
                levels.push(Vec::new());
            }
            levels[level].push(Arc::new(table));
        }
        for level in &mut levels {
            level.sort_by(|a, b| b.path().cmp(a.path()));
        }

        Ok(LsmIndex {
            shared: Arc::new(SharedWithHint {
                shared: Shared {
                    dir,
                    memtable_limit,
                    inner: Mutex::new(Inner {
                        active: MemTable::new(),
                        immutable: Vec::new(),
                        levels,
                    }),
                    flush_lock: Mutex::new(()),
                    next_id: AtomicU64::new(max_id + 1),
                },
                compaction_hint: CompactionHint::default(),
            }),
            compaction: Mutex::new(None),
        })
    }
}

impl Index for LsmIndex {
    fn put(&self, entry: FileEntry) -> Result<(), IndexError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.active.put(entry);
        }
        self.shared.maybe_rotate_and_flush()
    }

    fn remove(&self, volume_id: VolumeId, file_id: FileId) -> Result<(), IndexError> {
        {
            let mut inner = self.shared.inner.lock().unwrap();
            inner.active.remove(volume_id, file_id);
        }
        self.shared.maybe_rotate_and_flush()
    }

    fn get(&self, volume_id: VolumeId, file_id: FileId) -> Result<Option<FileEntry>, IndexError> {
        self.shared.get(volume_id, file_id)
    }

    fn get_by_volume(&self, volume_id: VolumeId) -> Result<Vec<FileEntry>, IndexError> {
        Ok(self
            .shared
            .merged_live_entries()
            .into_values()
            .filter(|e| e.volume_id == volume_id)
            .collect())
    }

    fn get_by_size_range(&self, min: u64, max: u64) -> Result<Vec<FileEntry>, IndexError> {
        Ok(self
            .shared
            .merged_live_entries()
            .into_values()
            .filter(|e| e.size_logical >= min && e.size_logical <= max)
            .collect())
    }

    fn get_by_path_prefix(&self, prefix: &Path) -> Result<Vec<FileEntry>, IndexError> {
        Ok(self
            .shared
            .merged_live_entries()
            .into_values()
            .filter(|e| e.full_path.starts_with(prefix))
            .collect())
    }

    fn get_by_extension(&self, extension: &str) -> Result<Vec<FileEntry>, IndexError> {
        Ok(self
            .shared
            .merged_live_entries()
            .into_values()
            .filter(|e| e.extension() == Some(extension))
            .collect())
    }

    fn get_by_date_range(&self, start: u64, end: u64) -> Result<Vec<FileEntry>, IndexError> {
        Ok(self
            .shared
            .merged_live_entries()
            .into_values()
            .filter(|e| {
                let t = e.timestamps.last_write_time;
                t >= start && t <= end
            })
            .collect())
    }

    fn flush(&self) -> Result<(), IndexError> {
        self.shared.flush()
    }

    fn compact(&self) -> Result<(), IndexError> {
        self.shared.compact()
    }

    fn start_compaction(&self) -> Result<(), IndexError> {
        let mut guard = self.compaction.lock().unwrap();
        if guard.is_some() {
            return Err(IndexError::CompactionInProgress);
        }
        let shared = Arc::clone(&self.shared);
        *guard = Some(CompactionWorker::spawn(move || {
            if shared.compaction_hint.take() {
                let _ = shared.compact();
            }
        }));
        Ok(())
    }

    fn stop_compaction(&self) -> Result<(), IndexError> {
        let worker = self.compaction.lock().unwrap().take();
        if let Some(w) = worker {
            w.stop();
        }
        Ok(())
    }

    fn get_stats(&self) -> IndexStats {
        let inner = self.shared.inner.lock().unwrap();
        IndexStats {
            memtable_entries: inner.active.len(),
            immutable_memtables: inner.immutable.len(),
            sstable_count: inner.levels.iter().map(|l| l.len()).sum(),
            levels: inner.levels.len(),
        }
    }

    fn clear(&self) -> Result<(), IndexError> {
        self.stop_compaction()?;
        let mut inner = self.shared.inner.lock().unwrap();
        inner.active.clear();
        inner.immutable.clear();
        let paths: Vec<PathBuf> = inner
            .levels
            .iter()
            .flatten()
            .map(|t| t.path().to_path_buf())
            .collect();
        inner.levels = vec![Vec::new()];
        drop(inner);
        for p in paths {
            let _ = std::fs::remove_file(p);
        }
        Ok(())
    }
}
