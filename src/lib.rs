//! disksense: scans a directory tree into a crash-tolerant LSM index and finds (and, gated,
//! removes) duplicate files.

pub mod config;
pub mod dedupe;
pub mod engine;
pub mod error;
pub mod hash;
pub mod ids;
pub mod index;
pub mod model;
pub mod safety;
pub mod scanner;
pub mod trash;
pub mod utils;

pub use dedupe::{DedupeOptions, DedupeStats, DuplicateGroup};
pub use error::DisksenseError;
pub use ids::{FileId, PathId, VolumeId};
pub use index::{Index, IndexStats, LsmIndex};
pub use model::{FileAttributes, FileEntry, FileTimestamps};
pub use scanner::{ScanEvent, ScanOptions};
