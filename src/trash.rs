//! Trash/recycle-bin bridge.
//!
//! POSIX follows the XDG Trash Specification directly (`~/.local/share/Trash/{files,info}`).
//! Windows and macOS delegate to the platform trash API via the `trash` crate rather than
//! hand-rolling `IFileOperation`/`NSWorkspace` bindings.

use std::path::{Path, PathBuf};

use crate::error::TrashError;

/// Move `path` to the trash. Returns the path it was moved to (POSIX only; empty on
/// platforms where the trash crate does not expose the final location).
pub fn move_to_trash(path: &Path) -> Result<PathBuf, TrashError> {
    #[cfg(unix)]
    {
        posix::move_to_trash(path)
    }
    #[cfg(not(unix))]
    {
        trash::delete(path).map_err(|e| TrashError::Platform(e.to_string()))?;
        Ok(PathBuf::new())
    }
}

#[cfg(unix)]
mod posix {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn home_dir() -> Result<PathBuf, TrashError> {
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .ok_or(TrashError::NoHomeDir)
    }

    fn trash_dirs() -> Result<(PathBuf, PathBuf), TrashError> {
        let trash = home_dir()?.join(".local/share/Trash");
        let files = trash.join("files");
        let info = trash.join("info");
        fs::create_dir_all(&files)?;
        fs::create_dir_all(&info)?;
        Ok((files, info))
    }

    /// ISO-8601 local-time date-time in `%Y-%m-%dT%H:%M:%S` form (no fractional seconds,
    /// no timezone offset), as the XDG Trash info format requires.
    fn deletion_date_now() -> String {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        format_local(secs)
    }

    /// Minimal civil-calendar conversion from a unix timestamp to an ISO-8601-ish local
    /// string. `libc::localtime_r` is avoided to keep this a pure function; disksense treats
    /// the trashinfo timestamp as informational, not load-bearing for restore logic.
    fn format_local(unix_secs: i64) -> String {
        let days = unix_secs.div_euclid(86_400);
        let secs_of_day = unix_secs.rem_euclid(86_400);
        let (h, m, s) = (secs_of_day / 3600, (secs_of_day / 60) % 60, secs_of_day % 60);

        // civil_from_days, Howard Hinnant's algorithm.
        let z = days + 719_468;
        let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
        let doe = (z - era * 146_097) as i64;
        let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
        let y = yoe + era * 400;
        let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
        let mp = (5 * doy + 2) / 153;
        let d = doy - (153 * mp + 2) / 5 + 1;
        let m_ = if mp < 10 { mp + 3 } else { mp - 9 };
        let y = if m_ <= 2 { y + 1 } else { y };

        format!("{:04}-{:02}-{:02}T{:02}:{:02}:{:02}", y, m_, d, h, m, s)
    }

    pub fn move_to_trash(path: &Path) -> Result<PathBuf, TrashError> {
        let (files_dir, info_dir) = trash_dirs()?;
        if !path.exists() {
            return Err(TrashError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}", path.display()),
            )));
        }

        let base = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut dest = files_dir.join(&base);
        let mut suffix = 1u32;
        while dest.exists() {
            dest = files_dir.join(format!("{base}.{suffix}"));
            suffix += 1;
        }

        fs::rename(path, &dest)?;

        let info_name = format!(
            "{}.trashinfo",
            dest.file_name().unwrap_or_default().to_string_lossy()
        );
        let info_path = info_dir.join(info_name);
        let mut info = fs::File::create(&info_path)?;
        writeln!(info, "[Trash Info]")?;
        writeln!(info, "Path={}", path.display())?;
        writeln!(info, "DeletionDate={}", deletion_date_now())?;

        Ok(dest)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn round_trips_into_trash_files_dir() {
        // Scope HOME to a scratch dir so this test never touches the real trash.
        let scratch = std::env::temp_dir().join(format!("disksense-trash-test-{}", std::process::id()));
        std::fs::create_dir_all(&scratch).unwrap();
        // SAFETY: single-threaded test process at this point; no other thread reads HOME
        // concurrently with this scoped mutation.
        unsafe {
            std::env::set_var("HOME", &scratch);
        }

        let victim = scratch.join("duplicate.txt");
        File::create(&victim).unwrap();

        let trashed = move_to_trash(&victim).unwrap();
        assert!(trashed.exists());
        assert!(!victim.exists());

        let info_dir = scratch.join(".local/share/Trash/info");
        let trashinfo = info_dir.join(format!(
            "{}.trashinfo",
            trashed.file_name().unwrap().to_string_lossy()
        ));
        let contents = std::fs::read_to_string(trashinfo).unwrap();
        assert!(contents.contains("[Trash Info]"));
        assert!(contents.contains(&format!("Path={}", victim.display())));
        assert!(contents.contains("DeletionDate="));
    }
}
