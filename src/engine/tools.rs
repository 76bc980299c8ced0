//! Path and filter utilities shared by the scanner and CLI.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Simple glob pattern matching (supports `*` and `?`).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern = pattern.strip_prefix('!').unwrap_or(pattern);

    let mut pattern_chars = pattern.chars().peekable();
    let mut text_chars = text.chars().peekable();

    while let Some(&p) = pattern_chars.peek() {
        match p {
            '*' => {
                pattern_chars.next();
                if pattern_chars.peek().is_none() {
                    return true;
                }
                while text_chars.peek().is_some() {
                    if glob_match(
                        &pattern_chars.clone().collect::<String>(),
                        &text_chars.clone().collect::<String>(),
                    ) {
                        return true;
                    }
                    text_chars.next();
                }
                return false;
            }
            '?' => {
                pattern_chars.next();
                if text_chars.next().is_none() {
                    return false;
                }
            }
            _ => {
                pattern_chars.next();
                if text_chars.next() != Some(p) {
                    return false;
                }
            }
        }
    }

    text_chars.peek().is_none()
}

#[cfg(unix)]
fn check_for_root(path: &Path) -> Result<()> {
    use std::os::unix::fs::MetadataExt;
    let root_meta = std::fs::metadata(path).context("read root metadata")?;
    if root_meta.uid() == 0 {
        anyhow::bail!(
            "Cannot index root-owned directory: {}. Use sudo with caution.",
            path.display()
        );
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_for_root(_path: &Path) -> Result<()> {
    Ok(())
}

/// True if the process is running with effective uid 0 (e.g. via sudo).
#[cfg(unix)]
pub fn running_as_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

pub fn check_root_and_canonicalize(path: &Path) -> Result<PathBuf> {
    let path = path
        .canonicalize()
        .with_context(|| format!("canonicalize path {}", path.display()))?;
    check_for_root(&path)?;
    Ok(path)
}

/// Set up a SIGINT handler and return a shared flag it sets on Ctrl+C.
pub fn setup_ctrlc_handler() -> Result<Arc<AtomicBool>> {
    let cancel_requested = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel_requested);

    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("set Ctrl+C handler")?;
    Ok(cancel_requested)
}

/// Return an error if the user requested cancellation (e.g. after scanning; partial index may
/// have already been flushed).
pub fn check_for_cancel(cancel_requested: &Arc<AtomicBool>) -> Result<()> {
    if cancel_requested.load(Ordering::Relaxed) {
        anyhow::bail!("scan cancelled by user; partial index was flushed");
    }
    Ok(())
}
