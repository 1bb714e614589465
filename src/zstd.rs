//! Safe wrappers over the libzstd streaming API.
//!
//! `zstd-sys` links libzstd statically and exposes the stable `zstd.h`
//! surface. This module adds:
//!
//! - [`CCtx`] / [`DCtx`] — RAII owners of the streaming (de)compression
//!   contexts, with slice-based `compress_stream2` / `decompress_stream`
//!   entry points.
//! - [`CParam`] / [`DParam`] — typed advanced-parameter setters. Parameters
//!   that `zstd.h` still routes through experimental slots (rsyncable,
//!   literal compression mode, row match finder, ...) map onto the reserved
//!   `ZSTD_c_experimentalParam*` enum entries, which are part of the public
//!   enum layout.
//! - [`FrameProgression`] — the codec's frame-progression snapshot consumed
//!   by the adaptive level controller.
//!
//! `ZSTD_getFrameProgression`, `ZSTD_toFlushNow`, and `ZSTD_getCParams` are
//! declared in a local `extern "C"` block: they sit behind
//! `ZSTD_STATIC_LINKING_ONLY` in the header so the generated bindings omit
//! them, but libzstd is statically compiled in full, so the symbols are
//! available at link time.

use std::ffi::CStr;
use std::fmt;
use std::os::raw::{c_int, c_uint, c_void};
use std::ptr::NonNull;

use zstd_sys::{ZSTD_cParameter, ZSTD_dParameter, ZSTD_EndDirective, ZSTD_ResetDirective};

// ---------------------------------------------------------------------------
// Frame-format constants (zstd.h #defines, not present in the bindings)
// ---------------------------------------------------------------------------

/// Magic number opening every Zstandard frame (little-endian).
pub const ZSTD_MAGICNUMBER: u32 = 0xFD2F_B528;

/// First magic number of the skippable-frame range.
pub const ZSTD_MAGIC_SKIPPABLE_START: u32 = 0x184D_2A50;

/// Mask folding all 16 skippable magic numbers onto the range start.
pub const ZSTD_MAGIC_SKIPPABLE_MASK: u32 = 0xFFFF_FFF0;

/// Largest possible Zstandard frame header, in bytes.
pub const FRAMEHEADERSIZE_MAX: usize = 18;

/// Smallest possible Zstandard frame header, in bytes.
pub const FRAMEHEADERSIZE_MIN: usize = 6;

/// Bounds of the window-log parameter on 64-bit targets.
pub const WINDOWLOG_MAX: u32 = 31;
pub const WINDOWLOG_MIN: u32 = 10;

/// Sentinel returned by `ZSTD_getFrameContentSize` for frames that omit the
/// content size.
const CONTENTSIZE_UNKNOWN: u64 = u64::MAX;
/// Sentinel returned by `ZSTD_getFrameContentSize` for invalid input.
const CONTENTSIZE_ERROR: u64 = u64::MAX - 1;

/// Returns `true` if `magic` falls in the skippable-frame range.
#[inline]
pub fn is_skippable_magic(magic: u32) -> bool {
    (magic & ZSTD_MAGIC_SKIPPABLE_MASK) == ZSTD_MAGIC_SKIPPABLE_START
}

// ---------------------------------------------------------------------------
// Static-linking-only declarations
// ---------------------------------------------------------------------------

/// Frame-progression snapshot, mirroring `ZSTD_frameProgression`.
///
/// Counters are cumulative since the start of the current frame. `ingested`
/// counts bytes accepted from the caller, `consumed` bytes actually
/// compressed, `produced` compressed bytes generated internally, `flushed`
/// compressed bytes handed back to the caller. `current_job_id` and
/// `nb_active_workers` expose the multithreaded pipeline state.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameProgression {
    pub ingested: u64,
    pub consumed: u64,
    pub produced: u64,
    pub flushed: u64,
    pub current_job_id: c_uint,
    pub nb_active_workers: c_uint,
}

/// Compression parameters as resolved by libzstd for a (level, srcSize,
/// dictSize) triple. Mirrors `ZSTD_compressionParameters`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct CompressionParameters {
    pub window_log: c_uint,
    pub chain_log: c_uint,
    pub hash_log: c_uint,
    pub search_log: c_uint,
    pub min_match: c_uint,
    pub target_length: c_uint,
    pub strategy: c_uint,
}

extern "C" {
    fn ZSTD_getFrameProgression(cctx: *const zstd_sys::ZSTD_CCtx) -> FrameProgression;
    fn ZSTD_toFlushNow(cctx: *mut zstd_sys::ZSTD_CCtx) -> usize;
    fn ZSTD_getCParams(
        compression_level: c_int,
        estimated_src_size: u64,
        dict_size: usize,
    ) -> CompressionParameters;
}

/// Strategy id at which the binary-tree match finders start
/// (`ZSTD_btlazy2`); used by [`cycle_log`].
const STRATEGY_BTLAZY2: c_uint = 6;

/// Returns libzstd's resolved parameters for a compression level.
pub fn get_cparams(level: i32, estimated_src_size: u64, dict_size: usize) -> CompressionParameters {
    unsafe { ZSTD_getCParams(level, estimated_src_size, dict_size) }
}

/// Cycle log of a match-finder table: binary-tree strategies reuse half the
/// chain table per position.
pub fn cycle_log(chain_log: u32, strategy: u32) -> u32 {
    let bt_scale = u32::from(strategy >= STRATEGY_BTLAZY2);
    chain_log - bt_scale
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// A libzstd error code, printable via `ZSTD_getErrorName`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZstdError(usize);

impl ZstdError {
    /// Human-readable error description (a static string inside libzstd).
    pub fn name(&self) -> &'static str {
        unsafe {
            CStr::from_ptr(zstd_sys::ZSTD_getErrorName(self.0))
                .to_str()
                .unwrap_or("unidentified zstd error")
        }
    }
}

impl fmt::Display for ZstdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::error::Error for ZstdError {}

/// Converts a raw libzstd return code into a `Result`.
#[inline]
fn check(code: usize) -> Result<usize, ZstdError> {
    if unsafe { zstd_sys::ZSTD_isError(code) } != 0 {
        Err(ZstdError(code))
    } else {
        Ok(code)
    }
}

// ---------------------------------------------------------------------------
// Level bounds and recommended buffer sizes
// ---------------------------------------------------------------------------

pub fn min_c_level() -> i32 {
    unsafe { zstd_sys::ZSTD_minCLevel() }
}

pub fn max_c_level() -> i32 {
    unsafe { zstd_sys::ZSTD_maxCLevel() }
}

/// Recommended compression input buffer size.
pub fn cstream_in_size() -> usize {
    unsafe { zstd_sys::ZSTD_CStreamInSize() }
}

/// Recommended compression output buffer size.
pub fn cstream_out_size() -> usize {
    unsafe { zstd_sys::ZSTD_CStreamOutSize() }
}

/// Recommended decompression input buffer size.
pub fn dstream_in_size() -> usize {
    unsafe { zstd_sys::ZSTD_DStreamInSize() }
}

/// Recommended decompression output buffer size.
pub fn dstream_out_size() -> usize {
    unsafe { zstd_sys::ZSTD_DStreamOutSize() }
}

// ---------------------------------------------------------------------------
// Frame inspection
// ---------------------------------------------------------------------------

/// Content size declared by the frame starting at `src[0..]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContentSize {
    Known(u64),
    Unknown,
    Error,
}

/// Reads the declared content size of the frame at the head of `src`.
/// `src` should hold at least [`FRAMEHEADERSIZE_MAX`] bytes for a
/// guaranteed answer.
pub fn get_frame_content_size(src: &[u8]) -> ContentSize {
    let ret =
        unsafe { zstd_sys::ZSTD_getFrameContentSize(src.as_ptr() as *const c_void, src.len()) };
    // The C API multiplexes two sentinels onto the unsigned return value.
    match ret as u64 {
        CONTENTSIZE_UNKNOWN => ContentSize::Unknown,
        CONTENTSIZE_ERROR => ContentSize::Error,
        n => ContentSize::Known(n),
    }
}

// ---------------------------------------------------------------------------
// Directives and parameters
// ---------------------------------------------------------------------------

/// End-of-input directive for [`CCtx::compress_stream2`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Directive {
    Continue,
    Flush,
    End,
}

impl Directive {
    fn raw(self) -> ZSTD_EndDirective {
        match self {
            Directive::Continue => ZSTD_EndDirective::ZSTD_e_continue,
            Directive::Flush => ZSTD_EndDirective::ZSTD_e_flush,
            Directive::End => ZSTD_EndDirective::ZSTD_e_end,
        }
    }
}

/// Advanced compression parameter with its value.
#[derive(Clone, Copy, Debug)]
pub enum CParam {
    CompressionLevel(i32),
    WindowLog(u32),
    HashLog(u32),
    ChainLog(u32),
    SearchLog(u32),
    MinMatch(u32),
    TargetLength(u32),
    Strategy(u32),
    EnableLongDistanceMatching(bool),
    LdmHashLog(u32),
    LdmMinMatch(u32),
    LdmBucketSizeLog(u32),
    LdmHashRateLog(u32),
    ContentSizeFlag(bool),
    ChecksumFlag(bool),
    DictIdFlag(bool),
    NbWorkers(u32),
    JobSize(u32),
    OverlapLog(u32),
    /// `ZSTD_c_rsyncable` (experimental slot 1).
    Rsyncable(bool),
    /// `ZSTD_c_literalCompressionMode` (experimental slot 5): 0 auto,
    /// 1 enable, 2 disable.
    LiteralCompressionMode(u32),
    /// `ZSTD_c_targetCBlockSize` (experimental slot 6).
    TargetCBlockSize(u32),
    /// `ZSTD_c_srcSizeHint` (experimental slot 7).
    SrcSizeHint(u32),
    /// `ZSTD_c_enableDedicatedDictSearch` (experimental slot 8).
    EnableDedicatedDictSearch(bool),
    /// `ZSTD_c_useRowMatchFinder` (experimental slot 14): 0 auto,
    /// 1 enable, 2 disable.
    UseRowMatchFinder(u32),
}

impl CParam {
    fn raw(self) -> (ZSTD_cParameter, c_int) {
        use ZSTD_cParameter::*;
        match self {
            CParam::CompressionLevel(v) => (ZSTD_c_compressionLevel, v),
            CParam::WindowLog(v) => (ZSTD_c_windowLog, v as c_int),
            CParam::HashLog(v) => (ZSTD_c_hashLog, v as c_int),
            CParam::ChainLog(v) => (ZSTD_c_chainLog, v as c_int),
            CParam::SearchLog(v) => (ZSTD_c_searchLog, v as c_int),
            CParam::MinMatch(v) => (ZSTD_c_minMatch, v as c_int),
            CParam::TargetLength(v) => (ZSTD_c_targetLength, v as c_int),
            CParam::Strategy(v) => (ZSTD_c_strategy, v as c_int),
            CParam::EnableLongDistanceMatching(v) => {
                (ZSTD_c_enableLongDistanceMatching, v as c_int)
            }
            CParam::LdmHashLog(v) => (ZSTD_c_ldmHashLog, v as c_int),
            CParam::LdmMinMatch(v) => (ZSTD_c_ldmMinMatch, v as c_int),
            CParam::LdmBucketSizeLog(v) => (ZSTD_c_ldmBucketSizeLog, v as c_int),
            CParam::LdmHashRateLog(v) => (ZSTD_c_ldmHashRateLog, v as c_int),
            CParam::ContentSizeFlag(v) => (ZSTD_c_contentSizeFlag, v as c_int),
            CParam::ChecksumFlag(v) => (ZSTD_c_checksumFlag, v as c_int),
            CParam::DictIdFlag(v) => (ZSTD_c_dictIDFlag, v as c_int),
            CParam::NbWorkers(v) => (ZSTD_c_nbWorkers, v as c_int),
            CParam::JobSize(v) => (ZSTD_c_jobSize, v as c_int),
            CParam::OverlapLog(v) => (ZSTD_c_overlapLog, v as c_int),
            CParam::Rsyncable(v) => (ZSTD_c_experimentalParam1, v as c_int),
            CParam::LiteralCompressionMode(v) => (ZSTD_c_experimentalParam5, v as c_int),
            CParam::TargetCBlockSize(v) => (ZSTD_c_targetCBlockSize, v as c_int),
            CParam::SrcSizeHint(v) => (ZSTD_c_experimentalParam7, v as c_int),
            CParam::EnableDedicatedDictSearch(v) => (ZSTD_c_experimentalParam8, v as c_int),
            CParam::UseRowMatchFinder(v) => (ZSTD_c_experimentalParam14, v as c_int),
        }
    }
}

/// Advanced decompression parameter with its value.
#[derive(Clone, Copy, Debug)]
pub enum DParam {
    WindowLogMax(u32),
    /// `ZSTD_d_forceIgnoreChecksum` (experimental slot 3; slots 1 and 2 are
    /// the frame-format and stable-output switches).
    ForceIgnoreChecksum(bool),
}

impl DParam {
    fn raw(self) -> (ZSTD_dParameter, c_int) {
        use ZSTD_dParameter::*;
        match self {
            DParam::WindowLogMax(v) => (ZSTD_d_windowLogMax, v as c_int),
            DParam::ForceIgnoreChecksum(v) => (ZSTD_d_experimentalParam3, v as c_int),
        }
    }
}

// ---------------------------------------------------------------------------
// CCtx
// ---------------------------------------------------------------------------

/// Streaming compression context.
pub struct CCtx {
    ptr: NonNull<zstd_sys::ZSTD_CCtx>,
}

// SAFETY: a ZSTD_CCtx is only touched through &mut self from one thread at a
// time; libzstd contexts may migrate between threads.
unsafe impl Send for CCtx {}

impl CCtx {
    /// Allocates a compression context, or `None` on allocation failure.
    pub fn try_new() -> Option<Self> {
        NonNull::new(unsafe { zstd_sys::ZSTD_createCCtx() }).map(|ptr| CCtx { ptr })
    }

    pub fn set_parameter(&mut self, param: CParam) -> Result<(), ZstdError> {
        let (p, v) = param.raw();
        check(unsafe { zstd_sys::ZSTD_CCtx_setParameter(self.ptr.as_ptr(), p, v) })?;
        Ok(())
    }

    /// Declares the total source size of the next frame.
    pub fn set_pledged_src_size(&mut self, size: u64) -> Result<(), ZstdError> {
        check(unsafe { zstd_sys::ZSTD_CCtx_setPledgedSrcSize(self.ptr.as_ptr(), size) })?;
        Ok(())
    }

    /// Loads `dict` as a compression dictionary (content is copied).
    pub fn load_dictionary(&mut self, dict: &[u8]) -> Result<(), ZstdError> {
        check(unsafe {
            zstd_sys::ZSTD_CCtx_loadDictionary(
                self.ptr.as_ptr(),
                dict.as_ptr() as *const c_void,
                dict.len(),
            )
        })?;
        Ok(())
    }

    /// References `prefix` as the window prefix of the next frame (content is
    /// NOT copied).
    ///
    /// # Safety
    /// `prefix` must stay valid and unmodified until the next frame has been
    /// fully compressed (or the context reset).
    pub unsafe fn ref_prefix(&mut self, prefix: &[u8]) -> Result<(), ZstdError> {
        check(zstd_sys::ZSTD_CCtx_refPrefix(
            self.ptr.as_ptr(),
            prefix.as_ptr() as *const c_void,
            prefix.len(),
        ))?;
        Ok(())
    }

    /// One streaming step: consumes from `src[*src_pos..]`, produces into
    /// `dst[*dst_pos..]`, advancing both positions.
    ///
    /// Returns the minimal number of bytes still to flush: with
    /// [`Directive::End`] the frame is complete exactly when this reaches 0
    /// and the input is fully consumed.
    pub fn compress_stream2(
        &mut self,
        dst: &mut [u8],
        dst_pos: &mut usize,
        src: &[u8],
        src_pos: &mut usize,
        directive: Directive,
    ) -> Result<usize, ZstdError> {
        let mut out = zstd_sys::ZSTD_outBuffer {
            dst: dst.as_mut_ptr() as *mut c_void,
            size: dst.len(),
            pos: *dst_pos,
        };
        let mut inp = zstd_sys::ZSTD_inBuffer {
            src: src.as_ptr() as *const c_void,
            size: src.len(),
            pos: *src_pos,
        };
        let ret = check(unsafe {
            zstd_sys::ZSTD_compressStream2(self.ptr.as_ptr(), &mut out, &mut inp, directive.raw())
        })?;
        *dst_pos = out.pos;
        *src_pos = inp.pos;
        Ok(ret)
    }

    /// Current frame-progression snapshot.
    pub fn frame_progression(&self) -> FrameProgression {
        unsafe { ZSTD_getFrameProgression(self.ptr.as_ptr()) }
    }

    /// Bytes immediately flushable from completed jobs; 0 means flushing has
    /// caught up with production.
    pub fn to_flush_now(&mut self) -> usize {
        unsafe { ZSTD_toFlushNow(self.ptr.as_ptr()) }
    }
}

impl Drop for CCtx {
    fn drop(&mut self) {
        unsafe {
            zstd_sys::ZSTD_freeCCtx(self.ptr.as_ptr());
        }
    }
}

// ---------------------------------------------------------------------------
// DCtx
// ---------------------------------------------------------------------------

/// Streaming decompression context.
pub struct DCtx {
    ptr: NonNull<zstd_sys::ZSTD_DCtx>,
}

// SAFETY: same single-thread-at-a-time discipline as CCtx.
unsafe impl Send for DCtx {}

impl DCtx {
    /// Allocates a decompression context, or `None` on allocation failure.
    pub fn try_new() -> Option<Self> {
        NonNull::new(unsafe { zstd_sys::ZSTD_createDCtx() }).map(|ptr| DCtx { ptr })
    }

    pub fn set_parameter(&mut self, param: DParam) -> Result<(), ZstdError> {
        let (p, v) = param.raw();
        check(unsafe { zstd_sys::ZSTD_DCtx_setParameter(self.ptr.as_ptr(), p, v) })?;
        Ok(())
    }

    /// Loads `dict` as a decompression dictionary (content is copied).
    pub fn load_dictionary(&mut self, dict: &[u8]) -> Result<(), ZstdError> {
        check(unsafe {
            zstd_sys::ZSTD_DCtx_loadDictionary(
                self.ptr.as_ptr(),
                dict.as_ptr() as *const c_void,
                dict.len(),
            )
        })?;
        Ok(())
    }

    /// Resets the streaming session, keeping parameters and dictionary.
    pub fn reset_session(&mut self) {
        // Cannot fail with ZSTD_reset_session_only.
        let _ = unsafe {
            zstd_sys::ZSTD_DCtx_reset(
                self.ptr.as_ptr(),
                ZSTD_ResetDirective::ZSTD_reset_session_only,
            )
        };
    }

    /// One streaming step. Returns a hint of how many input bytes the next
    /// call would like; 0 signals the end of the current frame.
    pub fn decompress_stream(
        &mut self,
        dst: &mut [u8],
        dst_pos: &mut usize,
        src: &[u8],
        src_pos: &mut usize,
    ) -> Result<usize, ZstdError> {
        let mut out = zstd_sys::ZSTD_outBuffer {
            dst: dst.as_mut_ptr() as *mut c_void,
            size: dst.len(),
            pos: *dst_pos,
        };
        let mut inp = zstd_sys::ZSTD_inBuffer {
            src: src.as_ptr() as *const c_void,
            size: src.len(),
            pos: *src_pos,
        };
        let ret = check(unsafe {
            zstd_sys::ZSTD_decompressStream(self.ptr.as_ptr(), &mut out, &mut inp)
        })?;
        *dst_pos = out.pos;
        *src_pos = inp.pos;
        Ok(ret)
    }
}

impl Drop for DCtx {
    fn drop(&mut self) {
        unsafe {
            zstd_sys::ZSTD_freeDCtx(self.ptr.as_ptr());
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
