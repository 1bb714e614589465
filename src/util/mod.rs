//! Filesystem and formatting utilities shared by the I/O layer.
//!
//! Submodules:
//! - [`file_size`]   — file length queries that keep "unknown" distinct from 0
//! - [`file_status`] — file-type tests and metadata transfer (mtime, mode)
//!
//! The flat helpers below cover identity comparison and human-readable size
//! formatting for progress lines and `--list` output.

pub mod file_size;
pub mod file_status;

pub use file_size::{get_file_size, get_open_file_size};
pub use file_status::{is_directory, is_reg_file, set_file_stat};

/// Returns `true` when both paths resolve to the same filesystem object.
///
/// On Unix the comparison is by `(device, inode)` identity, so hard links and
/// differently spelled paths to one file are detected. Elsewhere the paths
/// are canonicalised and compared.
pub fn is_same_file(a: &str, b: &str) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        match (std::fs::metadata(a), std::fs::metadata(b)) {
            (Ok(ma), Ok(mb)) => ma.dev() == mb.dev() && ma.ino() == mb.ino(),
            _ => false,
        }
    }
    #[cfg(not(unix))]
    {
        match (
            std::fs::canonicalize(std::path::Path::new(a)),
            std::fs::canonicalize(std::path::Path::new(b)),
        ) {
            (Ok(ca), Ok(cb)) => ca == cb,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Human-readable sizes
// ---------------------------------------------------------------------------

/// A byte count scaled for display: `{value:.precision$}{suffix}`.
#[derive(Clone, Copy, Debug)]
pub struct HumanReadableSize {
    pub value: f64,
    pub precision: usize,
    pub suffix: &'static str,
}

impl std::fmt::Display for HumanReadableSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.*}{}", self.precision, self.value, self.suffix)
    }
}

/// Scales `size` to the largest binary unit that keeps the value below 1024.
pub fn human_size(size: u64) -> HumanReadableSize {
    const SUFFIXES: [&str; 6] = [" B", " KiB", " MiB", " GiB", " TiB", " PiB"];
    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < SUFFIXES.len() {
        value /= 1024.0;
        unit += 1;
    }
    let precision = if unit == 0 {
        0
    } else if value >= 100.0 {
        1
    } else {
        2
    };
    HumanReadableSize {
        value,
        precision,
        suffix: SUFFIXES[unit],
    }
}
