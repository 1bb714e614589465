//! I/O preferences, batch context, and display globals.
//!
//! This module defines:
//!
//! - [`Prefs`] — a plain value type holding every tunable compression and
//!   decompression parameter (codec knobs, concurrency, adaptive bounds,
//!   sparse mode, overwrite policy, ...). Mutated only between files, never
//!   during one.
//! - [`FileIoCtx`] — per-batch state: file counters and aggregate byte
//!   totals.
//! - [`DISPLAY_LEVEL`] / [`set_notification_level`] — an atomic global
//!   controlling diagnostic output on stderr, plus the progress-mode switch
//!   and the ~6 Hz refresh clock gating progress lines.

use std::sync::atomic::{AtomicI32, AtomicU8, Ordering};
use std::sync::Mutex;

use crate::timefn::{clock_span_micro, get_time, TimeT};

// ---------------------------------------------------------------------------
// Numeric constants
// ---------------------------------------------------------------------------

pub const KB: usize = 1 << 10;
pub const MB: usize = 1 << 20;
pub const GB: usize = 1 << 30;

// ---------------------------------------------------------------------------
// Display / notification globals
// ---------------------------------------------------------------------------

/// Global notification level. 0 = silent, 1 = errors only, 2 = results +
/// warnings, 3 = progress, 4+ = verbose.
pub static DISPLAY_LEVEL: AtomicI32 = AtomicI32::new(2);

/// Progress-line policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProgressSetting {
    /// Progress lines when the level permits (default).
    Auto = 0,
    /// Progress lines even at low verbosity.
    Always = 1,
    /// No progress lines at all.
    Never = 2,
}

static PROGRESS_SETTING: AtomicU8 = AtomicU8::new(ProgressSetting::Auto as u8);

/// Refresh interval for progress updates and adaptive-controller ticks
/// (one sixth of a second, in microseconds).
pub const REFRESH_RATE_MICRO: u64 = 1_000_000 / 6;

static DISPLAY_CLOCK: Mutex<Option<TimeT>> = Mutex::new(None);

/// Sets the global notification level and returns the value stored.
pub fn set_notification_level(level: i32) -> i32 {
    DISPLAY_LEVEL.store(level, Ordering::Relaxed);
    level
}

pub fn notification_level() -> i32 {
    DISPLAY_LEVEL.load(Ordering::Relaxed)
}

pub fn set_progress_setting(setting: ProgressSetting) {
    PROGRESS_SETTING.store(setting as u8, Ordering::Relaxed);
}

pub fn progress_setting() -> ProgressSetting {
    match PROGRESS_SETTING.load(Ordering::Relaxed) {
        1 => ProgressSetting::Always,
        2 => ProgressSetting::Never,
        _ => ProgressSetting::Auto,
    }
}

/// Writes `msg` to stderr if the current notification level is ≥ `level`.
/// Flushes stderr when the level is ≥ 4 so verbose traces appear in real
/// time.
#[inline]
pub fn display_level(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(Ordering::Relaxed) >= level {
        eprint!("{}", msg);
        if DISPLAY_LEVEL.load(Ordering::Relaxed) >= 4 {
            use std::io::Write;
            let _ = std::io::stderr().flush();
        }
    }
}

/// Returns `true` when a progress refresh is due: progress lines are not
/// suppressed and the refresh clock has expired (or was never started).
pub fn ready_for_update() -> bool {
    if progress_setting() == ProgressSetting::Never {
        return false;
    }
    match *DISPLAY_CLOCK.lock().unwrap() {
        None => true,
        Some(t) => clock_span_micro(t) > REFRESH_RATE_MICRO,
    }
}

/// Restarts the refresh clock.
pub fn delay_next_update() {
    *DISPLAY_CLOCK.lock().unwrap() = Some(get_time());
}

/// Rate-limited progress line: printed when the level permits and either the
/// refresh clock expired or verbosity is ≥ 4.
pub fn display_update(level: i32, msg: &str) {
    if DISPLAY_LEVEL.load(Ordering::Relaxed) >= level
        && progress_setting() != ProgressSetting::Never
        && (ready_for_update() || DISPLAY_LEVEL.load(Ordering::Relaxed) >= 4)
    {
        delay_next_update();
        display_level(level, msg);
    }
}

// ---------------------------------------------------------------------------
// Output format
// ---------------------------------------------------------------------------

/// Target container format for compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionFormat {
    Zstd,
    Gzip,
    Xz,
    Lzma,
    Lz4,
}

/// Tri-state parameter switch (libzstd `ZSTD_paramSwitch_e`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParamSwitch {
    Auto = 0,
    Enable = 1,
    Disable = 2,
}

impl ParamSwitch {
    pub fn value(self) -> u32 {
        self as u32
    }
}

/// Individual codec parameters overriding the level-derived defaults.
/// A zero field means "leave to the codec".
#[derive(Clone, Copy, Debug, Default)]
pub struct ComprParams {
    pub window_log: u32,
    pub chain_log: u32,
    pub hash_log: u32,
    pub search_log: u32,
    pub min_match: u32,
    pub target_length: u32,
    pub strategy: u32,
}

// ---------------------------------------------------------------------------
// Preferences struct
// ---------------------------------------------------------------------------

/// All tunable parameters for compression and decompression.
///
/// `Prefs` is a plain value type; create one with [`Prefs::default`] and
/// apply setters before handing it to the I/O routines. The I/O layer only
/// mutates it between files (the stdout gate may downgrade `auto` sparse
/// mode to off).
#[derive(Clone, Debug)]
pub struct Prefs {
    /// Output format for compression. Default: zstd.
    pub compression_type: CompressionFormat,
    /// Sparse-file writes: 0 = off, 1 = auto (files yes, stdout no),
    /// 2 = forced. Default: auto.
    pub sparse_file_support: u32,
    /// Embed the dictionary ID in frame headers. Default: true.
    pub dict_id_flag: bool,
    /// Append a content checksum to each frame. Default: true.
    pub checksum_flag: bool,
    /// Per-job size for multithreaded compression (0 = codec default).
    pub block_size: u32,
    /// Overlap log for multithreaded compression (`None` = codec default).
    pub overlap_log: Option<u32>,
    /// Closed-loop compression-level adaptation. Default: false.
    pub adaptive_mode: bool,
    /// Row-based match finder switch.
    pub use_row_match_finder: ParamSwitch,
    /// Rsync-friendly output. Default: false.
    pub rsyncable: bool,
    /// Lower clamp for adaptive mode.
    pub min_adapt_level: i32,
    /// Upper clamp for adaptive mode.
    pub max_adapt_level: i32,
    /// Long-distance matching.
    pub ldm_flag: bool,
    pub ldm_hash_log: u32,
    pub ldm_min_match: u32,
    pub ldm_bucket_size_log: Option<u32>,
    pub ldm_hash_rate_log: Option<u32>,
    /// Declared source size when the input is not a regular file.
    pub stream_src_size: u64,
    /// Target compressed block size (0 = off).
    pub target_cblock_size: u32,
    /// Source-size hint for parameter selection (0 = off).
    pub src_size_hint: u32,
    /// Decompress but discard output. Default: false.
    pub test_mode: bool,
    /// Literal (Huffman) compression switch.
    pub literal_compression_mode: ParamSwitch,
    /// Remove source files after success. Default: false.
    pub remove_src_file: bool,
    /// Overwrite destinations without prompting. Default: false.
    pub overwrite: bool,
    /// Decompression memory limit in bytes (0 = default window ceiling).
    pub mem_limit: u32,
    /// Codec worker threads (0 = single-pass mode).
    pub nb_workers: u32,
    /// Skip sources that already carry a compressed suffix. Default: false.
    pub exclude_compressed_files: bool,
    /// Use the dictionary as a raw window prefix (delta compression).
    pub patch_from_mode: bool,
    /// Write the source size into the frame header when known. Default: true.
    pub content_size: bool,
    /// Accept block devices as sources. Default: false.
    pub allow_block_devices: bool,
    /// Individual parameter overrides.
    pub compr_params: ComprParams,
}

impl Default for Prefs {
    fn default() -> Self {
        Prefs {
            compression_type: CompressionFormat::Zstd,
            sparse_file_support: 1,
            dict_id_flag: true,
            checksum_flag: true,
            block_size: 0,
            overlap_log: None,
            adaptive_mode: false,
            use_row_match_finder: ParamSwitch::Auto,
            rsyncable: false,
            min_adapt_level: -50,
            max_adapt_level: 22,
            ldm_flag: false,
            ldm_hash_log: 0,
            ldm_min_match: 0,
            ldm_bucket_size_log: None,
            ldm_hash_rate_log: None,
            stream_src_size: 0,
            target_cblock_size: 0,
            src_size_hint: 0,
            test_mode: false,
            literal_compression_mode: ParamSwitch::Auto,
            remove_src_file: false,
            overwrite: false,
            mem_limit: 0,
            nb_workers: 1,
            exclude_compressed_files: false,
            patch_from_mode: false,
            content_size: true,
            allow_block_devices: false,
            compr_params: ComprParams::default(),
        }
    }
}

impl Prefs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the worker count, clamped to `[0, NB_WORKERS_MAX]`.
    /// Returns the value stored.
    pub fn set_nb_workers(&mut self, nb_workers: u32) -> u32 {
        let clamped = nb_workers.min(crate::config::NB_WORKERS_MAX as u32);
        self.nb_workers = clamped;
        clamped
    }

    /// Enables or disables adaptive mode. Adaptive mode relies on the codec's
    /// job pipeline, so it is rejected in single-pass (0-worker) mode.
    pub fn set_adaptive_mode(&mut self, adapt: bool) -> std::io::Result<()> {
        if adapt && self.nb_workers == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "adaptive mode is not compatible with single-pass mode",
            ));
        }
        self.adaptive_mode = adapt;
        Ok(())
    }

    /// Enables or disables rsyncable output; rejected in single-pass mode.
    pub fn set_rsyncable(&mut self, rsyncable: bool) -> std::io::Result<()> {
        if rsyncable && self.nb_workers == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "rsyncable mode is not compatible with single-pass mode",
            ));
        }
        self.rsyncable = rsyncable;
        Ok(())
    }

    /// Sets the per-job size; pointless without workers, so warn then.
    pub fn set_block_size(&mut self, block_size: u32) {
        if block_size != 0 && self.nb_workers == 0 {
            display_level(2, "Setting block size is useless in single-thread mode \n");
        }
        self.block_size = block_size;
    }

    pub fn set_overlap_log(&mut self, overlap_log: u32) {
        if overlap_log != 0 && self.nb_workers == 0 {
            display_level(2, "Setting overlapLog is useless in single-thread mode \n");
        }
        self.overlap_log = Some(overlap_log);
    }

    pub fn set_adapt_min(&mut self, min_level: i32) {
        self.min_adapt_level = min_level;
    }

    pub fn set_adapt_max(&mut self, max_level: i32) {
        self.max_adapt_level = max_level;
    }

    /// Sparse-write mode: 0 off, 1 auto, 2 force.
    pub fn set_sparse_write(&mut self, sparse: u32) {
        self.sparse_file_support = sparse;
    }
}

/// Default worker count for `-T0`: physical cores minus a spare share.
pub fn default_nb_workers() -> u32 {
    let nb_cores = num_cpus::get_physical() as u32;
    let spared = 1 + (nb_cores >> 3);
    nb_cores.saturating_sub(spared).max(1)
}

// ---------------------------------------------------------------------------
// Batch context
// ---------------------------------------------------------------------------

/// Per-batch state threaded through the compression and decompression
/// drivers.
#[derive(Clone, Debug)]
pub struct FileIoCtx {
    pub nb_files_total: usize,
    pub has_stdin_input: bool,
    pub has_stdout_output: bool,
    pub curr_file_idx: usize,
    pub nb_files_processed: usize,
    pub total_bytes_input: u64,
    pub total_bytes_output: u64,
}

impl Default for FileIoCtx {
    fn default() -> Self {
        FileIoCtx {
            nb_files_total: 1,
            has_stdin_input: false,
            has_stdout_output: false,
            curr_file_idx: 0,
            nb_files_processed: 0,
            total_bytes_input: 0,
            total_bytes_output: 0,
        }
    }
}

impl FileIoCtx {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scans the source list for the stdin sentinel.
    pub fn determine_has_stdin_input(&mut self, sources: &[&str]) {
        self.has_stdin_input = sources
            .iter()
            .any(|s| *s == crate::io::file_io::STDIN_MARK);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
