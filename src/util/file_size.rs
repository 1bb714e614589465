//! File size queries backed by `std::fs` metadata.
//!
//! "Unknown" is kept distinct from an empty file: a pipe, a missing path, or
//! a directory yields `None`, never `0`. The compression engine relies on
//! this distinction when deciding whether to pledge a source size.

use std::fs::{self, File};
use std::path::Path;

/// Returns the size in bytes of the already-open `file`, or `None` if the
/// handle does not refer to a regular file (stdin, a pipe, a device).
pub fn get_open_file_size(file: &File) -> Option<u64> {
    file.metadata()
        .ok()
        .filter(|m| m.file_type().is_file())
        .map(|m| m.len())
}

/// Returns the size in bytes of the regular file at `path`, or `None` if the
/// path does not exist, is not a regular file, or cannot be stat-ted.
pub fn get_file_size(path: &Path) -> Option<u64> {
    fs::metadata(path)
        .ok()
        .filter(|m| m.file_type().is_file())
        .map(|m| m.len())
}
