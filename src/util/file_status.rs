//! File status queries and metadata transfer.
//!
//! - [`is_reg_file`] / [`is_directory`] — file-type tests by path
//! - [`set_file_stat`] — apply a source file's modification time and
//!   permission bits to a destination
//!
//! Only mtime and mode bits are transferred; ownership and extended
//! attributes are left alone.

use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;

/// Returns `true` if `path` refers to a regular file (symlinks followed).
pub fn is_reg_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
}

/// Returns `true` if `path` refers to a directory (symlinks followed).
pub fn is_directory(path: &Path) -> bool {
    fs::metadata(path)
        .map(|m| m.file_type().is_dir())
        .unwrap_or(false)
}

/// Applies `mtime` and the lower 12 permission bits of `mode` to the regular
/// file at `path`.
///
/// Returns `Err` if `path` is not a regular file. The access time is set to
/// the current wall clock.
pub fn set_file_stat(path: &Path, mtime: SystemTime, mode: u32) -> io::Result<()> {
    if !is_reg_file(path) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "set_file_stat: not a regular file",
        ));
    }

    let atime = FileTime::from_system_time(SystemTime::now());
    let ft_mtime = FileTime::from_system_time(mtime);
    filetime::set_file_times(path, atime, ft_mtime)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
    }
    #[cfg(windows)]
    {
        // Windows has no POSIX mode bits; honour the owner-write bit only.
        let readonly = (mode & 0o200) == 0;
        let mut perms = fs::metadata(path)?.permissions();
        perms.set_readonly(readonly);
        fs::set_permissions(path, perms)?;
    }
    #[cfg(not(any(unix, windows)))]
    let _ = mode;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn file_type_tests() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("f");
        std::fs::write(&p, b"x").unwrap();
        assert!(is_reg_file(&p));
        assert!(!is_directory(&p));
        assert!(is_directory(dir.path()));
        assert!(!is_reg_file(dir.path()));
    }

    #[test]
    fn set_stat_rejects_directory() {
        let dir = TempDir::new().unwrap();
        let err = set_file_stat(dir.path(), SystemTime::now(), 0o644).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn set_stat_applies_mtime() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("f");
        std::fs::write(&p, b"x").unwrap();
        let past = SystemTime::now() - Duration::from_secs(3600);
        set_file_stat(&p, past, 0o644).unwrap();
        let got = std::fs::metadata(&p).unwrap().modified().unwrap();
        let delta = past
            .duration_since(got)
            .unwrap_or_else(|e| e.duration())
            .as_secs();
        assert!(delta <= 2, "mtime not transferred (off by {delta}s)");
    }

    #[cfg(unix)]
    #[test]
    fn set_stat_applies_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("f");
        std::fs::write(&p, b"x").unwrap();
        set_file_stat(&p, SystemTime::now(), 0o100640).unwrap();
        let mode = std::fs::metadata(&p).unwrap().permissions().mode();
        assert_eq!(mode & 0o7777, 0o640);
    }
}
