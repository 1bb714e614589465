//! Compile-time configuration constants for the `zstdr` programs layer.
//!
//! Runtime-tunable counterparts live in [`crate::io::prefs::Prefs`]; the
//! values here are the build-time defaults and hard limits.

/// Default compression level applied when no `-#` flag is given.
pub const CLEVEL_DEFAULT: i32 = 3;

/// Hard upper bound on the number of codec worker threads.
///
/// Requests exceeding this value are clamped.
pub const NB_WORKERS_MAX: usize = 200;

/// Window log forced when adaptive mode is enabled without an explicit
/// window setting, so that level changes do not alter the frame's window
/// requirement mid-stream.
pub const ADAPT_WINDOWLOG_DEFAULT: u32 = 23;

/// Memory limit applied to decompression when none is requested
/// (128 MiB window ceiling).
pub const DEFAULT_MEM_LIMIT: u32 = 128 << 20;

/// Permission bits for destinations whose source is not a regular file
/// (stdin input, concatenated outputs).
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o666;

// ---------------------------------------------------------------------------
// Filename extensions
// ---------------------------------------------------------------------------

pub const ZSTD_EXTENSION: &str = ".zst";
pub const TZSTD_EXTENSION: &str = ".tzst";
pub const ZSTD_ALT_EXTENSION: &str = ".zz";
pub const GZ_EXTENSION: &str = ".gz";
pub const TGZ_EXTENSION: &str = ".tgz";
pub const XZ_EXTENSION: &str = ".xz";
pub const TXZ_EXTENSION: &str = ".txz";
pub const LZMA_EXTENSION: &str = ".lzma";
pub const LZ4_EXTENSION: &str = ".lz4";
pub const TLZ4_EXTENSION: &str = ".tlz4";

/// Extension produced when decompressing one of the short tar-variant
/// suffixes (`.tzst`, `.tgz`, `.txz`, `.tlz4`).
pub const TAR_EXTENSION: &str = ".tar";
