//! Duplicate detection and removal: group-by-size → filter-by-signature → conditional
//! full-hash → group-by-hash, then a safety-gated action pass.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use log::warn;
use rayon::prelude::*;

use crate::error::DedupeError;
use crate::hash::hash_file;
use crate::ids::VolumeId;
use crate::index::Index;
use crate::model::FileEntry;
use crate::safety;
use crate::trash;

#[derive(Clone, Debug)]
pub struct DedupeOptions {
    /// When true (the default), `deduplicate` only tallies `actual_savings`; no file is
    /// touched. Safety Mode forces this behavior regardless of the option's value.
    pub simulate_only: bool,
    pub use_hardlinks: bool,
    pub move_to_recycle_bin: bool,
    /// Force full-content hashing even for small candidate groups.
    pub compute_full_hash: bool,
    pub min_file_size: u64,
    pub exclude_paths: Vec<PathBuf>,
}

impl Default for DedupeOptions {
    fn default() -> Self {
        Self {
            simulate_only: true,
            use_hardlinks: false,
            move_to_recycle_bin: false,
            compute_full_hash: false,
            min_file_size: 1024,
            exclude_paths: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct DedupeStats {
    pub total_files: usize,
    pub duplicate_groups: usize,
    pub duplicate_files: usize,
    pub potential_savings: u64,
    pub actual_savings: u64,
    pub hardlinks_created: usize,
}

#[derive(Clone, Debug)]
pub struct DuplicateGroup {
    pub files: Vec<FileEntry>,
    pub potential_savings: u64,
}

fn group_by_size(files: Vec<FileEntry>, min_file_size: u64) -> HashMap<u64, Vec<FileEntry>> {
    let mut groups: HashMap<u64, Vec<FileEntry>> = HashMap::new();
    for entry in files {
        if entry.is_directory() || entry.size_logical < min_file_size {
            continue;
        }
        groups.entry(entry.size_logical).or_default().push(entry);
    }
    groups.retain(|_, v| v.len() >= 2);
    groups
}

fn filter_by_head_tail(candidates: Vec<FileEntry>) -> Vec<FileEntry> {
    let mut by_signature: HashMap<[u8; 32], Vec<FileEntry>> = HashMap::new();
    for entry in candidates {
        if let Some(sig) = entry.head_tail_signature {
            by_signature.entry(sig).or_default().push(entry);
        }
    }
    by_signature
        .into_values()
        .filter(|group| group.len() > 1)
        .flatten()
        .collect()
}

/// Compute full-content hashes in parallel across a size/signature group. Files that fail to
/// hash (removed mid-scan, permission denied) are silently dropped from the group.
fn compute_full_hashes(candidates: Vec<FileEntry>) -> Vec<FileEntry> {
    candidates
        .into_par_iter()
        .filter_map(|mut entry| {
            if entry.content_hash.is_some() {
                return Some(entry);
            }
            match hash_file(&entry.full_path, entry.size_logical, None) {
                Ok(digest) => {
                    entry.content_hash = Some(digest);
                    Some(entry)
                }
                Err(_) => None,
            }
        })
        .collect()
}

fn group_by_hash(files: Vec<FileEntry>) -> Vec<Vec<FileEntry>> {
    let mut groups: HashMap<[u8; 32], Vec<FileEntry>> = HashMap::new();
    for entry in files {
        let key = entry.content_hash.or(entry.head_tail_signature);
        if let Some(key) = key {
            groups.entry(key).or_default().push(entry);
        }
    }
    groups.into_values().filter(|g| g.len() >= 2).collect()
}

fn is_excluded(entry: &FileEntry, exclude_paths: &[PathBuf]) -> bool {
    exclude_paths.iter().any(|p| entry.full_path.starts_with(p))
}

/// Scan the index for duplicate groups without touching disk. Each returned group's `files`
/// is sorted so `files[0]` is the file that survives when `deduplicate` runs.
pub fn find_duplicates(
    index: &dyn Index,
    options: &DedupeOptions,
) -> Result<(Vec<DuplicateGroup>, DedupeStats), DedupeError> {
    let mut stats = DedupeStats::default();
    let mut groups = Vec::new();

    let all = index.get_by_size_range(options.min_file_size, u64::MAX)?;
    let all: Vec<FileEntry> = all
        .into_iter()
        .filter(|e| !is_excluded(e, &options.exclude_paths))
        .collect();

    let size_groups = group_by_size(all, options.min_file_size);

    for (size, files) in size_groups {
        stats.total_files += files.len();

        let filtered = filter_by_head_tail(files);
        if filtered.len() < 2 {
            continue;
        }

        let hash_verified = if options.compute_full_hash || filtered.len() > 10 {
            compute_full_hashes(filtered)
        } else {
            filtered
        };

        for mut group_files in group_by_hash(hash_verified) {
            if group_files.len() < 2 {
                continue;
            }
            group_files.sort_by(|a, b| a.file_id.cmp(&b.file_id));
            let potential_savings = (group_files.len() as u64 - 1) * size;

            stats.duplicate_groups += 1;
            stats.duplicate_files += group_files.len();
            stats.potential_savings += potential_savings;

            groups.push(DuplicateGroup {
                files: group_files,
                potential_savings,
            });
        }
    }

    Ok((groups, stats))
}

fn same_volume(files: &[FileEntry]) -> bool {
    match files.first() {
        Some(first) => files.iter().all(|f| f.volume_id == first.volume_id),
        None => false,
    }
}

/// Hardlink every member after `files[0]` to it, skipping (not aborting on) any member that
/// fails. Returns the count that actually succeeded.
fn create_hardlinks(files: &[FileEntry]) -> usize {
    let source = &files[0];
    let mut created = 0;
    for target in &files[1..] {
        if target.volume_id != source.volume_id {
            warn!(
                "{}",
                DedupeError::CrossVolumeHardlink(source.full_path.clone(), target.full_path.clone())
            );
            continue;
        }
        let result = fs::remove_file(&target.full_path)
            .and_then(|_| fs::hard_link(&source.full_path, &target.full_path));
        match result {
            Ok(()) => created += 1,
            Err(e) => warn!(
                "hardlink {} -> {} failed: {e}, leaving it in place",
                target.full_path.display(),
                source.full_path.display()
            ),
        }
    }
    created
}

/// Move every file to trash, skipping (not aborting on) any member that fails. Returns the
/// count that actually succeeded.
fn move_group_to_trash(files: &[FileEntry]) -> usize {
    let mut moved = 0;
    for f in files {
        match trash::move_to_trash(&f.full_path) {
            Ok(()) => moved += 1,
            Err(e) => warn!("move to trash {} failed: {e}, leaving it in place", f.full_path.display()),
        }
    }
    moved
}

/// Delete every file, skipping (not aborting on) any member that fails. Returns the count that
/// actually succeeded.
fn delete_files(files: &[FileEntry]) -> usize {
    let mut deleted = 0;
    for f in files {
        match fs::remove_file(&f.full_path) {
            Ok(()) => deleted += 1,
            Err(e) => warn!("delete {} failed: {e}, leaving it in place", f.full_path.display()),
        }
    }
    deleted
}

/// Apply `options`'s chosen action to every group's duplicates (keeping `files[0]` in each
/// group). Safety-gated first: simulation or a closed Safety Mode always wins over the
/// requested action, regardless of `use_hardlinks`/`move_to_recycle_bin`. A failed member is
/// counted as unchanged and left in place; it never halts the rest of the sweep, and
/// `actual_savings` only credits members that actually succeeded.
pub fn deduplicate(
    groups: &[DuplicateGroup],
    options: &DedupeOptions,
) -> Result<DedupeStats, DedupeError> {
    let mut stats = DedupeStats::default();
    let safety_blocks_delete = !safety::deletion_allowed();

    for group in groups {
        if group.files.len() < 2 {
            continue;
        }

        if options.simulate_only || safety_blocks_delete {
            stats.actual_savings += group.potential_savings;
            continue;
        }

        let extras = &group.files[1..];
        let per_file_savings = group.potential_savings / extras.len() as u64;

        let succeeded = if options.use_hardlinks && same_volume(&group.files) {
            let created = create_hardlinks(&group.files);
            stats.hardlinks_created += created;
            created
        } else if options.move_to_recycle_bin {
            move_group_to_trash(extras)
        } else {
            delete_files(extras)
        };

        stats.actual_savings += succeeded as u64 * per_file_savings;
    }

    Ok(stats)
}

/// Convenience: files that would be removed by `deduplicate` with the given options, without
/// running any action. Useful for a dry-run report independent of `simulate_only`.
pub fn candidates_for_removal(groups: &[DuplicateGroup]) -> Vec<&FileEntry> {
    groups.iter().flat_map(|g| g.files[1..].iter()).collect()
}

pub fn volume_of(entry: &FileEntry) -> VolumeId {
    entry.volume_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::{FileId, PathId};
    use std::io::Write;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("disksense-dedupe-test-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn make_file(dir: &std::path::Path, name: &str, contents: &[u8], id: u64) -> FileEntry {
        let path = dir.join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(contents).unwrap();
        drop(f);
        let mut entry = FileEntry::new(VolumeId::new(1), FileId::new(id), PathId::new(id), path);
        entry.size_logical = contents.len() as u64;
        entry.head_tail_signature = Some(crate::hash::head_tail_signature(&entry.full_path, entry.size_logical).unwrap());
        entry
    }

    #[test]
    fn group_by_size_drops_singletons() {
        let dir = scratch("size");
        let a = make_file(&dir, "a", b"hello", 1);
        let b = make_file(&dir, "b", b"world!", 2);
        let groups = group_by_size(vec![a, b], 0);
        assert!(groups.is_empty());
    }

    #[test]
    fn full_pipeline_finds_identical_content() {
        let dir = scratch("pipeline");
        let a = make_file(&dir, "a", b"duplicate-content", 1);
        let b = make_file(&dir, "b", b"duplicate-content", 2);
        let c = make_file(&dir, "c", b"unique-content-xyz", 3);

        let size_groups = group_by_size(vec![a, b, c], 0);
        let mut total_groups = 0;
        for (_, files) in size_groups {
            let filtered = filter_by_head_tail(files);
            if filtered.len() < 2 {
                continue;
            }
            let hashed = compute_full_hashes(filtered);
            let hash_groups = group_by_hash(hashed);
            total_groups += hash_groups.len();
        }
        assert_eq!(total_groups, 1);
    }

    #[test]
    fn simulate_only_never_touches_disk() {
        let dir = scratch("simulate");
        let a = make_file(&dir, "a", b"same-bytes", 1);
        let b = make_file(&dir, "b", b"same-bytes", 2);
        let group = DuplicateGroup {
            potential_savings: a.size_logical,
            files: vec![a.clone(), b.clone()],
        };
        let options = DedupeOptions {
            simulate_only: true,
            ..Default::default()
        };
        let stats = deduplicate(&[group], &options).unwrap();
        assert_eq!(stats.actual_savings, a.size_logical);
        assert!(a.full_path.exists());
        assert!(b.full_path.exists());
    }

    #[test]
    fn delete_files_keeps_sweeping_past_a_missing_file() {
        let dir = scratch("partial-failure");
        let b = make_file(&dir, "b", b"same-bytes-3", 2);
        let c = make_file(&dir, "c", b"same-bytes-3", 3);
        // `b` is already gone by the time the sweep reaches it; `c` must still be removed.
        fs::remove_file(&b.full_path).unwrap();

        let deleted = delete_files(&[b.clone(), c.clone()]);

        assert_eq!(deleted, 1);
        assert!(!c.full_path.exists());
    }

    #[test]
    fn safety_mode_blocks_delete_even_when_not_simulating() {
        // DISKSENSE_ALLOW_DELETE is unset in the test process, so safety::deletion_allowed()
        // is false and the delete branch must fall back to stats-only.
        let dir = scratch("safety");
        let a = make_file(&dir, "a", b"same-bytes-2", 1);
        let b = make_file(&dir, "b", b"same-bytes-2", 2);
        let group = DuplicateGroup {
            potential_savings: a.size_logical,
            files: vec![a.clone(), b.clone()],
        };
        let options = DedupeOptions {
            simulate_only: false,
            ..Default::default()
        };
        let stats = deduplicate(&[group], &options).unwrap();
        assert_eq!(stats.actual_savings, a.size_logical);
        assert!(b.full_path.exists());
    }
}
