//! File-level I/O orchestration: batch driving, destination lifecycle,
//! sparse writes, signal cleanup, frame demultiplexing, and `--list`.
//!
//! This module assembles the `io` sub-modules and re-exports the symbols
//! consumed by the CLI and library users.

pub mod adapt;
pub mod compress_alt;
pub mod compress_frame;
pub mod decompress_alt;
pub mod decompress_dispatch;
pub mod decompress_frame;
pub mod decompress_resources;
pub mod file_info;
pub mod file_io;
pub mod names;
pub mod prefs;
pub mod signal;
pub mod sparse;

// ── Core type re-exports ─────────────────────────────────────────────────────
pub use file_info::FileInfo;
pub use prefs::{CompressionFormat, FileIoCtx, ParamSwitch, Prefs};

// ── Special I/O sentinels ────────────────────────────────────────────────────
pub use file_io::{NUL_MARK, STDIN_MARK, STDOUT_MARK};

// ── Display / notification controls ──────────────────────────────────────────
pub use prefs::{set_notification_level, set_progress_setting, ProgressSetting};

// ── Worker count ─────────────────────────────────────────────────────────────
pub use prefs::default_nb_workers;

// ── Compression public API ───────────────────────────────────────────────────
pub use compress_frame::{compress_filename, compress_multiple_filenames};

// ── Decompression public API ─────────────────────────────────────────────────
pub use decompress_dispatch::{decompress_filename, decompress_multiple_filenames};

// ── File info / --list ───────────────────────────────────────────────────────
pub use file_info::list_multiple_files;
