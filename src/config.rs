//! Load `.disksense.toml` from a directory and merge it into CLI-derived options.
//!
//! File config is applied first, field by field, only when present; CLI flags applied
//! afterward always win.

use serde::Deserialize;
use std::path::Path;

use crate::dedupe::DedupeOptions;
use crate::scanner::ScanOptions;

#[derive(Debug, Default, Deserialize)]
pub struct DisksenseToml {
    #[serde(default)]
    scan: ScanSection,
    #[serde(default)]
    dedupe: DedupeSection,
}

#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    follow_symlinks: Option<bool>,
    exclude: Option<Vec<String>>,
    min_file_size: Option<u64>,
    compute_head_tail: Option<bool>,
    compute_full_hash: Option<bool>,
    max_depth: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DedupeSection {
    simulate_only: Option<bool>,
    use_hardlinks: Option<bool>,
    move_to_recycle_bin: Option<bool>,
    compute_full_hash: Option<bool>,
    min_file_size: Option<u64>,
    exclude: Option<Vec<String>>,
}

/// Load `.disksense.toml` from `dir` if present. Returns `None` if the file is missing or
/// fails to parse (a parse failure is logged at `warn!` and treated as absent).
pub fn load(dir: &Path) -> Option<DisksenseToml> {
    let path = dir.join(".disksense.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&contents)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite `opts` field from file when present.
macro_rules! apply_file_opt {
    ($section:expr, $opts:expr, $section_field:ident => $opts_field:ident) => {
        if let Some(v) = $section.$section_field {
            $opts.$opts_field = v;
        }
    };
}

/// Apply file config to scan options (only fields present in the file). Call before applying
/// CLI flag overrides.
pub fn apply_to_scan_options(file: &DisksenseToml, opts: &mut ScanOptions) {
    let section = &file.scan;
    apply_file_opt!(section, opts, follow_symlinks => follow_symlinks);
    if let Some(ref v) = section.exclude {
        opts.exclude_globs = v.clone();
    }
    apply_file_opt!(section, opts, min_file_size => min_file_size);
    apply_file_opt!(section, opts, compute_head_tail => compute_head_tail);
    apply_file_opt!(section, opts, compute_full_hash => compute_full_hash);
    if let Some(v) = section.max_depth {
        opts.max_depth = Some(v);
    }
}

/// Apply file config to dedupe options (only fields present in the file).
pub fn apply_to_dedupe_options(file: &DisksenseToml, opts: &mut DedupeOptions) {
    let section = &file.dedupe;
    apply_file_opt!(section, opts, simulate_only => simulate_only);
    apply_file_opt!(section, opts, use_hardlinks => use_hardlinks);
    apply_file_opt!(section, opts, move_to_recycle_bin => move_to_recycle_bin);
    apply_file_opt!(section, opts, compute_full_hash => compute_full_hash);
    apply_file_opt!(section, opts, min_file_size => min_file_size);
    if let Some(ref v) = section.exclude {
        opts.exclude_paths = v.iter().map(std::path::PathBuf::from).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_returns_none() {
        let dir = std::env::temp_dir().join(format!("disksense-config-test-missing-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        assert!(load(&dir).is_none());
    }

    #[test]
    fn applies_only_present_fields() {
        let dir = std::env::temp_dir().join(format!("disksense-config-test-present-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let mut f = std::fs::File::create(dir.join(".disksense.toml")).unwrap();
        writeln!(f, "[scan]\nmin_file_size = 2048\n\n[dedupe]\nsimulate_only = false").unwrap();
        drop(f);

        let file = load(&dir).unwrap();

        let mut scan_opts = ScanOptions::default();
        apply_to_scan_options(&file, &mut scan_opts);
        assert_eq!(scan_opts.min_file_size, 2048);
        assert!(!scan_opts.follow_symlinks);

        let mut dedupe_opts = DedupeOptions::default();
        apply_to_dedupe_options(&file, &mut dedupe_opts);
        assert!(!dedupe_opts.simulate_only);
        assert_eq!(dedupe_opts.min_file_size, 1024);
    }
}
