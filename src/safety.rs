//! Process-wide Safety Mode: gates every destructive dedupe action.
//!
//! Read once per process from `DISKSENSE_ALLOW_DELETE` and cached; there is no runtime
//! toggle. Anything other than the literal value `"1"` (including the variable being unset)
//! forces all destructive actions into simulation.

use std::sync::OnceLock;

static DELETION_ALLOWED: OnceLock<bool> = OnceLock::new();

/// Env var that unlocks destructive dedupe actions when set to exactly `"1"`.
pub const ALLOW_DELETE_ENV: &str = "DISKSENSE_ALLOW_DELETE";

/// Whether destructive actions (delete, and falling through to delete when no other
/// non-destructive option applies) are permitted in this process.
pub fn deletion_allowed() -> bool {
    *DELETION_ALLOWED.get_or_init(|| {
        std::env::var(ALLOW_DELETE_ENV)
            .map(|v| v == "1")
            .unwrap_or(false)
    })
}
