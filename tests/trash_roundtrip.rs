//! Dedupe-triggers-trash scenario. Kept in its own test binary: it flips the process-wide
//! Safety Mode `OnceLock` to "allowed", which would otherwise race with the other integration
//! tests that rely on it staying closed (each file under `tests/` is its own process).

use disksense::index::{Index, LsmIndex};
use disksense::{DedupeOptions, ScanEvent, ScanOptions};
use std::fs;
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "disksense-trash-roundtrip-{name}-{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[cfg(unix)]
#[test]
fn dedupe_with_recycle_bin_round_trips_through_trash() {
    let root = scratch("roundtrip");
    // SAFETY: this test binary's only test; no other thread reads HOME or
    // DISKSENSE_ALLOW_DELETE concurrently with this scoped, process-local mutation.
    unsafe {
        std::env::set_var("HOME", &root);
        std::env::set_var(disksense::safety::ALLOW_DELETE_ENV, "1");
    }

    fs::write(root.join("a.txt"), b"trash-me-twice").unwrap();
    fs::write(root.join("b.txt"), b"trash-me-twice").unwrap();

    let index = LsmIndex::open(root.join(".disksense/index")).unwrap();
    let mut options = ScanOptions::default();
    options.compute_full_hash = true;
    disksense::scanner::scan(&root, &options, None, |ScanEvent::FileAdded(entry)| {
        if !entry.is_directory() {
            index.put(entry).unwrap();
        }
    })
    .unwrap();

    let dedupe_options = DedupeOptions {
        simulate_only: false,
        move_to_recycle_bin: true,
        min_file_size: 1,
        ..DedupeOptions::default()
    };
    let (groups, _) = disksense::dedupe::find_duplicates(&index, &dedupe_options).unwrap();
    assert_eq!(groups.len(), 1);
    disksense::dedupe::deduplicate(&groups, &dedupe_options).unwrap();

    let trashed = groups[0].files[1].full_path.clone();
    assert!(!trashed.exists());
    let trash_files_dir = root.join(".local/share/Trash/files");
    assert!(trash_files_dir.exists());
    assert_eq!(fs::read_dir(&trash_files_dir).unwrap().count(), 1);
}
