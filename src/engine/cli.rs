//! CLI command handlers: translate parsed args into library calls, reporting progress
//! through a `kdam` bar.

use anyhow::{Context, Result};
use log::info;

use crate::config;
use crate::dedupe::{self, DedupeOptions};
use crate::engine::arg_parser::{Commands, DedupeAction};
use crate::engine::progress::create_counter;
use crate::engine::tools::{
    check_for_cancel, check_root_and_canonicalize, running_as_root, setup_ctrlc_handler,
};
use crate::index::{Index, LsmIndex};
use crate::scanner::{self, ScanEvent, ScanOptions};

/// Name of the on-disk state directory created under the scanned root.
const STATE_DIR: &str = ".disksense";

fn index_dir(root: &std::path::Path) -> std::path::PathBuf {
    root.join(STATE_DIR).join("index")
}

pub fn handle_run(command: Commands) -> Result<()> {
    match command {
        Commands::Scan {
            dir,
            follow_symlinks,
            exclude,
            min_file_size,
            full_hash,
            max_depth,
        } => handle_scan(
            &dir,
            follow_symlinks,
            exclude,
            min_file_size,
            full_hash,
            max_depth,
        ),
        Commands::Dedupe {
            dir,
            action,
            full_hash,
            min_file_size,
            exclude,
        } => handle_dedupe(&dir, action, full_hash, min_file_size, exclude),
        Commands::Similar { .. } => {
            anyhow::bail!("perceptual similarity search is not implemented")
        }
        Commands::Cleanup { .. } => {
            anyhow::bail!("interactive cleanup is not implemented")
        }
        Commands::Treemap { .. } => {
            anyhow::bail!("treemap visualization is not implemented")
        }
    }
}

fn handle_scan(
    dir: &std::path::Path,
    follow_symlinks: bool,
    exclude: Vec<String>,
    min_file_size: u64,
    full_hash: bool,
    max_depth: Option<usize>,
) -> Result<()> {
    let root = check_root_and_canonicalize(dir)?;
    if running_as_root() {
        log::warn!("running as root; indexing with elevated privileges");
    }

    let mut options = ScanOptions {
        follow_symlinks,
        exclude_globs: exclude,
        min_file_size,
        compute_full_hash: full_hash,
        max_depth,
        ..ScanOptions::default()
    };
    if let Some(file) = config::load(&root) {
        config::apply_to_scan_options(&file, &mut options);
    }
    options.follow_symlinks = follow_symlinks || options.follow_symlinks;

    let index = LsmIndex::open(index_dir(&root)).context("open index")?;
    index.start_compaction().context("start compaction worker")?;

    let cancel = setup_ctrlc_handler()?;
    let bar = create_counter("scanning");

    let mut count = 0usize;
    let result = scanner::scan(&root, &options, Some(&cancel), |ScanEvent::FileAdded(entry)| {
        count += 1;
        let batch = crate::utils::config::ProgressConsts::PROGRESS_UPDATE_BATCH_SIZE;
        if count.is_multiple_of(batch) {
            crate::engine::progress::update_progress_bar(&bar, batch);
        }
        if let Err(e) = index.put(entry) {
            log::error!("index put failed: {e}");
        }
    });

    index.flush().context("final flush")?;
    index.stop_compaction().context("stop compaction worker")?;
    check_for_cancel(&cancel)?;
    result.context("scan")?;

    info!("scanned {count} entries under {}", root.display());
    let stats = index.get_stats();
    println!(
        "scanned {count} entries; index: {} memtable, {} sstables across {} levels",
        stats.memtable_entries, stats.sstable_count, stats.levels
    );
    Ok(())
}

fn handle_dedupe(
    dir: &std::path::Path,
    action: DedupeAction,
    full_hash: bool,
    min_file_size: u64,
    exclude: Vec<std::path::PathBuf>,
) -> Result<()> {
    let root = check_root_and_canonicalize(dir)?;

    let mut options = DedupeOptions {
        compute_full_hash: full_hash,
        min_file_size,
        exclude_paths: exclude,
        ..DedupeOptions::default()
    };
    if let Some(file) = config::load(&root) {
        config::apply_to_dedupe_options(&file, &mut options);
    }
    // `--action` is an explicit choice on the command line, so it overrides whatever the
    // config file set for simulate_only/use_hardlinks/move_to_recycle_bin.
    match action {
        DedupeAction::Simulate => {
            options.simulate_only = true;
            options.use_hardlinks = false;
            options.move_to_recycle_bin = false;
        }
        DedupeAction::Hardlink => {
            options.simulate_only = false;
            options.use_hardlinks = true;
            options.move_to_recycle_bin = false;
        }
        DedupeAction::Move => {
            options.simulate_only = false;
            options.use_hardlinks = false;
            options.move_to_recycle_bin = true;
        }
        DedupeAction::Delete => {
            options.simulate_only = false;
            options.use_hardlinks = false;
            options.move_to_recycle_bin = false;
        }
    }

    let index = LsmIndex::open(index_dir(&root)).context("open index")?;
    let (groups, find_stats) =
        dedupe::find_duplicates(&index, &options).context("find duplicates")?;
    let action_stats = dedupe::deduplicate(&groups, &options).context("deduplicate")?;

    println!(
        "{} duplicate groups, {} duplicate files, {} bytes potential savings, {} bytes actual savings, {} hardlinks created",
        find_stats.duplicate_groups,
        find_stats.duplicate_files,
        find_stats.potential_savings,
        action_stats.actual_savings,
        action_stats.hardlinks_created,
    );
    if options.simulate_only || !crate::safety::deletion_allowed() {
        println!(
            "Safety Mode: no files were touched (set {}=1 to allow destructive actions)",
            crate::safety::ALLOW_DELETE_ENV
        );
    }

    Ok(())
}
