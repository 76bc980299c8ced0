//! Recursive directory scanner: walks a root path and emits [`FileEntry`] records.
//!
//! Built on `walkdir` for a single-strategy traversal instead of hand-rolled recursion, and
//! checked for cancellation at each directory boundary rather than per-file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, trace, warn};
use walkdir::WalkDir;

use crate::engine::tools::glob_match;
use crate::error::ScanError;
use crate::hash::{hash_file, head_tail_signature};
use crate::ids::{FileId, PathId, VolumeId};
use crate::model::{FileAttributes, FileEntry, FileTimestamps};

/// Options controlling a single scan pass.
#[derive(Clone, Debug)]
pub struct ScanOptions {
    pub follow_symlinks: bool,
    /// Glob patterns (matched against file name and full path) excluded from the walk.
    pub exclude_globs: Vec<String>,
    /// Files smaller than this are still recorded, but never hashed.
    pub min_file_size: u64,
    pub compute_head_tail: bool,
    pub compute_full_hash: bool,
    /// `None` means unbounded depth.
    pub max_depth: Option<usize>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            follow_symlinks: false,
            exclude_globs: Vec::new(),
            min_file_size: 0,
            compute_head_tail: true,
            compute_full_hash: false,
            max_depth: None,
        }
    }
}

/// One event emitted by the scanner as it walks. Only `FileAdded` is produced today; the
/// variant exists so a future incremental rescan can add `FileUpdated`/`FileRemoved` without
/// changing the callback signature.
pub enum ScanEvent {
    FileAdded(FileEntry),
}

fn is_excluded(path: &Path, options: &ScanOptions) -> bool {
    if options.exclude_globs.is_empty() {
        return false;
    }
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let path_str = path.to_str().unwrap_or("");
    options
        .exclude_globs
        .iter()
        .any(|pattern| glob_match(pattern, name) || glob_match(pattern, path_str))
}

#[cfg(unix)]
fn volume_id_of(meta: &fs::Metadata) -> VolumeId {
    use std::os::unix::fs::MetadataExt;
    VolumeId::new(meta.dev())
}

#[cfg(not(unix))]
fn volume_id_of(_meta: &fs::Metadata) -> VolumeId {
    VolumeId::new(0)
}

#[cfg(unix)]
fn file_id_of(meta: &fs::Metadata) -> FileId {
    use std::os::unix::fs::MetadataExt;
    FileId::new(meta.ino())
}

#[cfg(not(unix))]
fn file_id_of(meta: &fs::Metadata) -> FileId {
    use std::hash::{Hash, Hasher};
    let mut h = std::collections::hash_map::DefaultHasher::new();
    meta.len().hash(&mut h);
    FileId::new(h.finish())
}

#[cfg(unix)]
fn unix_attributes(meta: &fs::Metadata) -> FileAttributes {
    use std::os::unix::fs::PermissionsExt;
    let mut attrs = FileAttributes::empty();
    if meta.permissions().mode() & 0o200 == 0 {
        attrs |= FileAttributes::READ_ONLY;
    }
    if meta.is_dir() {
        attrs |= FileAttributes::DIRECTORY;
    }
    if meta.file_type().is_symlink() {
        attrs |= FileAttributes::REPARSE_POINT;
    }
    attrs
}

#[cfg(unix)]
fn size_on_disk_of(meta: &fs::Metadata) -> u64 {
    use std::os::unix::fs::MetadataExt;
    meta.blocks() * 512
}

#[cfg(not(unix))]
fn size_on_disk_of(meta: &fs::Metadata) -> u64 {
    (meta.len() + 4095) & !4095u64
}

#[cfg(not(unix))]
fn unix_attributes(meta: &fs::Metadata) -> FileAttributes {
    let mut attrs = FileAttributes::empty();
    if meta.is_dir() {
        attrs |= FileAttributes::DIRECTORY;
    }
    attrs
}

fn filetime_from_system_time(t: std::io::Result<std::time::SystemTime>) -> u64 {
    // FILETIME: 100ns intervals since 1601-01-01 UTC. Unix epoch is 1970-01-01, offset by
    // 11644473600 seconds.
    const EPOCH_DIFF_SECS: u64 = 11_644_473_600;
    let Ok(t) = t else { return 0 };
    match t.duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => (d.as_secs() + EPOCH_DIFF_SECS) * 10_000_000 + (d.subsec_nanos() as u64 / 100),
        Err(_) => 0,
    }
}

fn timestamps_of(meta: &fs::Metadata) -> FileTimestamps {
    FileTimestamps {
        creation_time: filetime_from_system_time(meta.created()),
        last_write_time: filetime_from_system_time(meta.modified()),
        last_access_time: filetime_from_system_time(meta.accessed()),
        change_time: filetime_from_system_time(meta.modified()),
    }
}

fn build_entry(path: &Path, meta: &fs::Metadata, options: &ScanOptions) -> Result<FileEntry, ScanError> {
    let volume_id = volume_id_of(meta);
    let file_id = file_id_of(meta);

    let mut entry = FileEntry::new(volume_id, file_id, PathId::new(file_id.get()), path.to_path_buf());
    entry.size_logical = meta.len();
    entry.size_on_disk = size_on_disk_of(meta);
    entry.attributes = unix_attributes(meta);
    entry.timestamps = timestamps_of(meta);

    if meta.len() >= options.min_file_size {
        if options.compute_head_tail {
            entry.head_tail_signature = Some(head_tail_signature(path, meta.len())?);
        }
        if options.compute_full_hash {
            entry.content_hash = Some(hash_file(path, meta.len(), None)?);
        }
    }

    Ok(entry)
}

/// Walk `root` emitting one [`ScanEvent`] per visited file or directory. Checked for
/// cancellation at each directory boundary; `cancel` being set aborts with [`ScanError::Cancelled`]
/// after flushing whatever has already been emitted to `on_event`.
pub fn scan(
    root: &Path,
    options: &ScanOptions,
    cancel: Option<&Arc<AtomicBool>>,
    mut on_event: impl FnMut(ScanEvent),
) -> Result<(), ScanError> {
    let mut walker = WalkDir::new(root).follow_links(options.follow_symlinks);
    if let Some(depth) = options.max_depth {
        walker = walker.max_depth(depth);
    }

    for entry in walker {
        if let Some(c) = cancel
            && c.load(Ordering::Relaxed)
        {
            return Err(ScanError::Cancelled);
        }

        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf);
                warn!("walk error at {path:?}: {err}, skipping");
                continue;
            }
        };

        let path = entry.path();
        if path == root {
            continue;
        }
        if is_excluded(path, options) {
            trace!("excluded by glob: {}", path.display());
            continue;
        }

        let meta = match entry.metadata() {
            Ok(m) => m,
            Err(err) => {
                warn!("metadata error at {}: {err}, skipping", path.display());
                continue;
            }
        };

        if !meta.is_file() {
            continue;
        }

        match build_entry(path, &meta, options) {
            Ok(file_entry) => on_event(ScanEvent::FileAdded(file_entry)),
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(err) => {
                debug!("skipping {}: {}", path.display(), err);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "disksense-scanner-test-{name}-{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn finds_all_files_recursively() {
        let dir = scratch("recursive");
        fs::create_dir_all(dir.join("sub")).unwrap();
        fs::write(dir.join("a.txt"), b"hello").unwrap();
        fs::write(dir.join("sub/b.txt"), b"world").unwrap();

        let mut found = Vec::new();
        scan(&dir, &ScanOptions::default(), None, |ScanEvent::FileAdded(e)| {
            found.push(e.full_path);
        })
        .unwrap();

        assert_eq!(found.len(), 2);
    }

    /// Coverage law: exactly `n` events for `n` regular files, with no exclusion configured.
    /// Directories themselves never produce an event even though the walk descends into them.
    #[test]
    fn emits_one_event_per_regular_file_and_none_for_directories() {
        let dir = scratch("coverage");
        fs::create_dir_all(dir.join("a/b")).unwrap();
        fs::write(dir.join("a/f1.txt"), b"x").unwrap();
        fs::write(dir.join("a/b/f2.txt"), b"y").unwrap();

        let mut count = 0usize;
        scan(&dir, &ScanOptions::default(), None, |ScanEvent::FileAdded(_)| {
            count += 1;
        })
        .unwrap();

        assert_eq!(count, 2);
    }

    #[test]
    fn excludes_matching_glob() {
        let dir = scratch("exclude");
        fs::write(dir.join("keep.txt"), b"x").unwrap();
        fs::write(dir.join("skip.log"), b"y").unwrap();

        let mut options = ScanOptions::default();
        options.exclude_globs.push("*.log".to_string());

        let mut found = Vec::new();
        scan(&dir, &options, None, |ScanEvent::FileAdded(e)| {
            found.push(e.full_path);
        })
        .unwrap();

        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("keep.txt"));
    }

    #[test]
    fn does_not_exclude_os_junk_files_by_default() {
        let dir = scratch("junk");
        fs::write(dir.join(".DS_Store"), b"x").unwrap();
        fs::write(dir.join("a.txt"), b"y").unwrap();

        let mut found = Vec::new();
        scan(&dir, &ScanOptions::default(), None, |ScanEvent::FileAdded(e)| {
            found.push(e.full_path);
        })
        .unwrap();

        assert_eq!(found.len(), 2);
    }

    #[test]
    fn computes_signatures_above_min_size() {
        let dir = scratch("signatures");
        let mut f = fs::File::create(dir.join("big.bin")).unwrap();
        f.write_all(&vec![9u8; 200]).unwrap();
        drop(f);

        let mut options = ScanOptions::default();
        options.min_file_size = 100;
        options.compute_full_hash = true;

        let mut seen = None;
        scan(&dir, &options, None, |ScanEvent::FileAdded(e)| {
            seen = Some(e);
        })
        .unwrap();

        let entry = seen.unwrap();
        assert!(entry.head_tail_signature.is_some());
        assert!(entry.content_hash.is_some());
    }

    #[cfg(unix)]
    #[test]
    fn size_on_disk_is_a_multiple_of_the_block_size() {
        let dir = scratch("size-on-disk");
        fs::write(dir.join("a.txt"), b"hello").unwrap();

        let mut seen = None;
        scan(&dir, &ScanOptions::default(), None, |ScanEvent::FileAdded(e)| {
            seen = Some(e);
        })
        .unwrap();

        let entry = seen.unwrap();
        assert!(entry.size_on_disk >= entry.size_logical);
        assert_eq!(entry.size_on_disk % 512, 0);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_subdirectory_is_skipped_not_fatal() {
        use std::os::unix::fs::PermissionsExt;

        let dir = scratch("permission-denied");
        fs::create_dir_all(dir.join("locked")).unwrap();
        fs::write(dir.join("locked/secret.txt"), b"x").unwrap();
        fs::write(dir.join("visible.txt"), b"y").unwrap();
        fs::set_permissions(dir.join("locked"), fs::Permissions::from_mode(0o000)).unwrap();

        let mut found = Vec::new();
        let result = scan(&dir, &ScanOptions::default(), None, |ScanEvent::FileAdded(e)| {
            found.push(e.full_path);
        });

        fs::set_permissions(dir.join("locked"), fs::Permissions::from_mode(0o755)).unwrap();

        assert!(result.is_ok());
        assert!(found.iter().any(|p| p.ends_with("visible.txt")));
    }

    #[test]
    fn cancellation_aborts_walk() {
        let dir = scratch("cancel");
        fs::write(dir.join("a.txt"), b"x").unwrap();
        fs::write(dir.join("b.txt"), b"y").unwrap();

        let cancel = Arc::new(AtomicBool::new(true));
        let result = scan(&dir, &ScanOptions::default(), Some(&cancel), |_| {});
        assert!(matches!(result, Err(ScanError::Cancelled)));
    }
}
