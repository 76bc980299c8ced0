//! Command-line surface: `disksense scan`, `disksense dedupe`, plus three Non-goal stub
//! subcommands that the external interface names but never implements.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// What `dedupe` does with the extra copies in each duplicate group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum DedupeAction {
    /// Report only; never touch disk. Default.
    Simulate,
    /// Replace extra copies with hardlinks when all copies share a volume.
    Hardlink,
    /// Move extra copies to the trash.
    Move,
    /// Delete extra copies outright.
    Delete,
}

/// Disk analysis engine: scans a directory tree into an LSM index and finds (and, gated,
/// removes) duplicate files.
#[derive(Clone, Parser)]
#[command(name = "disksense")]
#[command(about = "Scan a directory, index it, and find duplicate files.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug-level logging for this crate).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Walk a directory tree and populate the index.
    Scan {
        /// Directory to scan. Default: current directory.
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// Follow symbolic links. Default: false.
        #[arg(long, short = 'f')]
        follow_symlinks: bool,

        /// Exclude patterns (glob syntax). Can specify multiple: -e pattern1 pattern2
        #[arg(long, short = 'e', num_args = 0..)]
        exclude: Vec<String>,

        /// Files smaller than this many bytes are recorded but never hashed.
        #[arg(long, default_value = "0")]
        min_file_size: u64,

        /// Compute full-content BLAKE3 hash for every file during the scan (slower; normally
        /// deferred to dedupe's conditional full-hash step).
        #[arg(long)]
        full_hash: bool,

        /// Maximum recursion depth. Default: unbounded.
        #[arg(long)]
        max_depth: Option<usize>,
    },

    /// Find and (if allowed) remove duplicate files already in the index.
    Dedupe {
        /// Directory whose index to read. Default: current directory.
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,

        /// What to do with extra copies. Safety Mode still blocks every destructive action
        /// regardless of this choice unless `DISKSENSE_ALLOW_DELETE=1` is set.
        #[arg(long, value_enum, default_value = "simulate")]
        action: DedupeAction,

        /// Force full-content hashing even for small candidate groups.
        #[arg(long)]
        full_hash: bool,

        /// Minimum file size considered for deduplication.
        #[arg(long, default_value = "1024")]
        min_file_size: u64,

        /// Paths to exclude from deduplication (prefix match).
        #[arg(long, num_args = 0..)]
        exclude: Vec<PathBuf>,
    },

    /// Perceptual similarity search across indexed media. Not implemented.
    Similar {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Interactive cleanup UI. Not implemented.
    Cleanup {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },

    /// Disk usage treemap visualization. Not implemented.
    Treemap {
        #[arg(value_name = "DIR", default_value = ".")]
        dir: PathBuf,
    },
}
