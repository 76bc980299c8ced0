//! Tuning constants shared across the scan/dedupe pipelines.

/// Progress bar and adaptive chunk tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Batch size for progress bar updates during directory walk (reduce lock contention).
    pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 100;
    /// Target number of progress updates across all workers (~100 total).
    pub const ADAPTIVE_PROGRESS_TARGET_UPDATES: usize = 100;
    /// Minimum chunk size for adaptive progress (avoid too-frequent updates).
    pub const ADAPTIVE_CHUNK_MIN: usize = 10;
}
