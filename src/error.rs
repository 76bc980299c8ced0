//! Typed library errors. The CLI binds these into `anyhow::Error` at its boundary via `?`;
//! library code returns these directly so callers can match on error kind.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("cancelled by user")]
    Cancelled,
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("corrupt sstable {path}: {reason}")]
    Corrupt { path: PathBuf, reason: String },
    #[error("compaction already in progress")]
    CompactionInProgress,
    #[error("compaction worker panicked")]
    CompactionWorkerPanicked,
}

#[derive(Debug, Error)]
pub enum DedupeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0} and {1} are on different volumes; cannot hardlink")]
    CrossVolumeHardlink(PathBuf, PathBuf),
    #[error(transparent)]
    Trash(#[from] TrashError),
    #[error(transparent)]
    Index(#[from] IndexError),
}

#[derive(Debug, Error)]
pub enum TrashError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("could not determine home directory for trash bridge")]
    NoHomeDir,
    #[error("platform trash backend failed: {0}")]
    Platform(String),
}

#[derive(Debug, Error)]
pub enum DisksenseError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Index(#[from] IndexError),
    #[error(transparent)]
    Dedupe(#[from] DedupeError),
    #[error(transparent)]
    Trash(#[from] TrashError),
}
