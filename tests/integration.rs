//! End-to-end scenarios spanning scan, index, and dedupe together.

use disksense::index::{Index, LsmIndex};
use disksense::{DedupeOptions, ScanEvent, ScanOptions};
use std::fs;
use std::path::PathBuf;

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "disksense-integration-{name}-{}",
        std::process::id()
    ));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn trivial_scan_then_dedupe_finds_and_reports_duplicates() {
    let root = scratch("trivial");
    fs::write(root.join("a.txt"), b"duplicate payload").unwrap();
    fs::write(root.join("b.txt"), b"duplicate payload").unwrap();
    fs::write(root.join("c.txt"), b"unrelated payload").unwrap();

    let index = LsmIndex::open(root.join(".disksense/index")).unwrap();
    let options = ScanOptions::default();
    disksense::scanner::scan(&root, &options, None, |ScanEvent::FileAdded(entry)| {
        if !entry.is_directory() {
            index.put(entry).unwrap();
        }
    })
    .unwrap();

    let dedupe_options = DedupeOptions {
        min_file_size: 1,
        ..DedupeOptions::default()
    };
    let (groups, stats) = disksense::dedupe::find_duplicates(&index, &dedupe_options).unwrap();
    assert_eq!(stats.duplicate_groups, 1);
    assert_eq!(groups[0].files.len(), 2);
}

#[test]
fn full_hash_spans_multiple_read_chunks_consistently() {
    let root = scratch("chunked-hash");
    // Larger than HASH_READ_CHUNK_SIZE (64KiB) so hash_file crosses a chunk boundary.
    let data = vec![0x5Au8; disksense::hash::HASH_READ_CHUNK_SIZE * 3 + 17];
    let path = root.join("big.bin");
    fs::write(&path, &data).unwrap();

    let via_chunks = disksense::hash::hash_file(&path, data.len() as u64, None).unwrap();
    let direct = blake3::hash(&data);
    assert_eq!(via_chunks, *direct.as_bytes());
}

#[test]
fn tombstone_shadows_value_from_an_older_sstable_generation() {
    let root = scratch("tombstone-shadow");
    let dir = root.join(".disksense/index");

    {
        let index = LsmIndex::open(&dir).unwrap();
        let mut options = ScanOptions::default();
        options.compute_full_hash = true;
        fs::write(root.join("f.txt"), b"payload").unwrap();
        disksense::scanner::scan(&root, &options, None, |ScanEvent::FileAdded(entry)| {
            if !entry.is_directory() {
                index.put(entry).unwrap();
            }
        })
        .unwrap();
        index.flush().unwrap();
    }

    // Reopen (simulating a later process) and remove the entry; the tombstone sits in a
    // newer generation (the active memtable) than the flushed SSTable carrying the value.
    let index = LsmIndex::open(&dir).unwrap();
    let all = index.get_by_size_range(0, u64::MAX).unwrap();
    assert_eq!(all.len(), 1);
    let file_id = all[0].file_id;
    let volume_id = all[0].volume_id;
    index.remove(volume_id, file_id).unwrap();
    assert!(index.get(volume_id, file_id).unwrap().is_none());
}

#[test]
fn mid_scan_cancellation_stops_the_walk_early() {
    let root = scratch("cancel");
    for i in 0..20 {
        fs::write(root.join(format!("f{i}.txt")), b"x").unwrap();
    }

    let cancel = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
    let cancel_clone = cancel.clone();
    let mut seen = 0;
    let result = disksense::scanner::scan(
        &root,
        &ScanOptions::default(),
        Some(&cancel),
        |ScanEvent::FileAdded(_)| {
            seen += 1;
            if seen == 3 {
                cancel_clone.store(true, std::sync::atomic::Ordering::Relaxed);
            }
        },
    );
    assert!(matches!(result, Err(disksense::error::ScanError::Cancelled)));
    assert!(seen < 20);
}

#[test]
fn safety_gate_blocks_delete_and_falls_back_to_simulation() {
    // DISKSENSE_ALLOW_DELETE is unset for the test binary, so even a non-simulated dedupe
    // request must fall back to stats-only and leave both files on disk.
    assert!(!disksense::safety::deletion_allowed());

    let root = scratch("safety-gate");
    fs::write(root.join("a.txt"), b"same-payload-here").unwrap();
    fs::write(root.join("b.txt"), b"same-payload-here").unwrap();

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
        min_file_size: 1,
        ..DedupeOptions::default()
    };
    let (groups, _) = disksense::dedupe::find_duplicates(&index, &dedupe_options).unwrap();
    let stats = disksense::dedupe::deduplicate(&groups, &dedupe_options).unwrap();

    assert!(stats.actual_savings > 0);
    assert!(root.join("a.txt").exists());
    assert!(root.join("b.txt").exists());
}

