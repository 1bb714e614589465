//! Zstandard frame compression and the compression batch driver.
//!
//! This module owns:
//!
//! - [`CompressResources`] — one codec context plus fixed source and
//!   destination buffers (sized by the codec's recommended streaming sizes),
//!   allocated before the first file of a batch and reused for every file.
//!   The buffers are never resized.
//! - [`compress_zstd_frame`] — the per-file streaming loop, including the
//!   adaptive level controller hookup.
//! - The per-file destination lifecycle: open → arm signal slot → compress →
//!   disarm → close → stat transfer, with partial-output removal on failure.
//! - [`compress_filename`] / [`compress_multiple_filenames`] — the
//!   public batch entry points (single concatenated destination, one
//!   destination per source, optional output-directory rebase).

use std::io::{self, Read, Write};
use std::path::Path;
use std::time::SystemTime;

use crate::config::{ADAPT_WINDOWLOG_DEFAULT, DEFAULT_FILE_PERMISSIONS};
use crate::io::adapt::AdaptiveController;
use crate::io::file_io::{
    load_dict_buffer, open_dst_file, open_src_file, read_to_capacity, remove_file,
    require_user_confirmation, DstFile, STDIN_MARK, STDOUT_MARK,
};
use crate::io::names::{check_filename_collisions, determine_compressed_name, is_compressed_file};
use crate::io::prefs::{
    delay_next_update, display_level, notification_level, progress_setting, ready_for_update,
    CompressionFormat, ComprParams, FileIoCtx, Prefs, ProgressSetting, GB,
};
use crate::io::signal::ArmedDestination;
use crate::timefn::{clock_span_ns, get_time};
use crate::util::{get_file_size, human_size, is_directory, is_same_file, set_file_stat};
use crate::zstd::{self, CCtx, CParam, Directive};

extern "C" {
    fn clock() -> libc::clock_t;
}

const CLOCKS_PER_SEC: libc::clock_t = 1_000_000;

// ---------------------------------------------------------------------------
// Patch-from parameter derivation
// ---------------------------------------------------------------------------

/// Position of the highest set bit. `v` must be non-zero.
fn highbit64(v: u64) -> u32 {
    debug_assert!(v != 0);
    63 - v.leading_zeros()
}

fn adjust_mem_limit_for_patch_from(
    prefs: &mut Prefs,
    dict_size: u64,
    max_src_file_size: Option<u64>,
) -> io::Result<()> {
    let max_src = match max_src_file_size {
        Some(s) => s,
        None => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "error 42 : Using --patch-from with stdin requires --stream-size",
            ))
        }
    };
    let max_size = (prefs.mem_limit as u64).max(dict_size.max(max_src));
    let max_window_size = 1u64 << zstd::WINDOWLOG_MAX;
    if max_size > max_window_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "error 42 : Can't handle files larger than {} GB",
                max_window_size / GB as u64
            ),
        ));
    }
    prefs.mem_limit = max_size as u32;
    Ok(())
}

/// Derives window and long-distance-matching settings for patch-from mode:
/// the window must cover `max(dictSize, srcSize)`, and LDM turns on when
/// that window exceeds the cycle log of the level's match finder.
fn adjust_params_for_patch_from(
    prefs: &mut Prefs,
    compr_params: &mut ComprParams,
    dict_size: u64,
    max_src_file_size: Option<u64>,
    c_level: i32,
) -> io::Result<()> {
    adjust_mem_limit_for_patch_from(prefs, dict_size, max_src_file_size)?;
    let max_src = max_src_file_size.unwrap_or(0).max(1);
    let file_window_log = highbit64(max_src) + 1;
    let cparams = zstd::get_cparams(c_level, max_src, dict_size as usize);
    if file_window_log > zstd::WINDOWLOG_MAX {
        display_level(
            1,
            "Max window log exceeded by file (compression ratio will suffer)\n",
        );
    }
    compr_params.window_log = file_window_log.clamp(zstd::WINDOWLOG_MIN, zstd::WINDOWLOG_MAX);
    if file_window_log > zstd::cycle_log(cparams.chain_log, cparams.strategy) {
        if !prefs.ldm_flag {
            display_level(1, "long mode automatically triggered\n");
        }
        prefs.ldm_flag = true;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CompressResources
// ---------------------------------------------------------------------------

/// Compression resources allocated once per batch and reused across files.
pub struct CompressResources {
    // Declared first so the context drops before the dictionary buffer it
    // may reference as a prefix.
    pub cctx: CCtx,
    pub src_buffer: Vec<u8>,
    pub dst_buffer: Vec<u8>,
    pub dict_buffer: Vec<u8>,
    pub dict_file_name: Option<String>,
}

impl CompressResources {
    /// Allocates buffers and the codec context, and applies every parameter
    /// from `prefs`. `max_src_file_size` is the largest source in the batch
    /// (used by patch-from window derivation); `None` when unknown.
    pub fn new(
        prefs: &mut Prefs,
        dict_file_name: Option<&str>,
        max_src_file_size: Option<u64>,
        c_level: i32,
    ) -> io::Result<Self> {
        let mut compr_params = prefs.compr_params;

        let mut cctx = CCtx::try_new().ok_or_else(|| {
            io::Error::other("error 30 : allocation error : can't create compression context")
        })?;

        if prefs.patch_from_mode {
            let dict_size = dict_file_name
                .and_then(|n| get_file_size(Path::new(n)))
                .unwrap_or(0);
            let stream_size = if prefs.stream_src_size > 0 {
                Some(prefs.stream_src_size)
            } else {
                max_src_file_size
            };
            adjust_params_for_patch_from(prefs, &mut compr_params, dict_size, stream_size, c_level)?;
        }

        let src_buffer = vec![0u8; zstd::cstream_in_size()];
        let dst_buffer = vec![0u8; zstd::cstream_out_size()];
        let dict_buffer = load_dict_buffer(prefs, dict_file_name)?;

        if prefs.adaptive_mode && !prefs.ldm_flag && compr_params.window_log == 0 {
            // Pin the window so adaptive level changes cannot alter the
            // frame's memory requirement mid-stream.
            compr_params.window_log = ADAPT_WINDOWLOG_DEFAULT;
        }

        let zerr = |e: zstd::ZstdError| io::Error::other(format!("error 11 : {}", e));

        cctx.set_parameter(CParam::ContentSizeFlag(prefs.content_size))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::DictIdFlag(prefs.dict_id_flag))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::ChecksumFlag(prefs.checksum_flag))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::CompressionLevel(c_level))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::TargetCBlockSize(prefs.target_cblock_size))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::SrcSizeHint(prefs.src_size_hint))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::EnableLongDistanceMatching(prefs.ldm_flag))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::LdmHashLog(prefs.ldm_hash_log))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::LdmMinMatch(prefs.ldm_min_match))
            .map_err(zerr)?;
        if let Some(v) = prefs.ldm_bucket_size_log {
            cctx.set_parameter(CParam::LdmBucketSizeLog(v)).map_err(zerr)?;
        }
        if let Some(v) = prefs.ldm_hash_rate_log {
            cctx.set_parameter(CParam::LdmHashRateLog(v)).map_err(zerr)?;
        }
        cctx.set_parameter(CParam::UseRowMatchFinder(prefs.use_row_match_finder.value()))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::WindowLog(compr_params.window_log))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::ChainLog(compr_params.chain_log))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::HashLog(compr_params.hash_log))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::SearchLog(compr_params.search_log))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::MinMatch(compr_params.min_match))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::TargetLength(compr_params.target_length))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::Strategy(compr_params.strategy))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::LiteralCompressionMode(
            prefs.literal_compression_mode.value(),
        ))
        .map_err(zerr)?;
        cctx.set_parameter(CParam::EnableDedicatedDictSearch(true))
            .map_err(zerr)?;
        display_level(5, &format!("set nb workers = {} \n", prefs.nb_workers));
        cctx.set_parameter(CParam::NbWorkers(prefs.nb_workers))
            .map_err(zerr)?;
        cctx.set_parameter(CParam::JobSize(prefs.block_size))
            .map_err(zerr)?;
        if let Some(overlap) = prefs.overlap_log {
            display_level(3, &format!("set overlapLog = {} \n", overlap));
            cctx.set_parameter(CParam::OverlapLog(overlap)).map_err(zerr)?;
        }
        cctx.set_parameter(CParam::Rsyncable(prefs.rsyncable))
            .map_err(zerr)?;

        if !dict_buffer.is_empty() {
            if prefs.patch_from_mode {
                // SAFETY: dict_buffer lives in this struct and is never
                // resized; the context field drops first.
                unsafe { cctx.ref_prefix(&dict_buffer).map_err(zerr)? };
            } else {
                cctx.load_dictionary(&dict_buffer).map_err(zerr)?;
            }
        }

        Ok(CompressResources {
            cctx,
            src_buffer,
            dst_buffer,
            dict_buffer,
            dict_file_name: dict_file_name.map(|s| s.to_owned()),
        })
    }
}

// ---------------------------------------------------------------------------
// Zstandard per-file streaming loop
// ---------------------------------------------------------------------------

/// Compresses one source stream into one destination as a Zstandard frame.
///
/// Returns the compressed byte count and adds the consumed source bytes to
/// `readsize`. The pledged size comes from the stat-reported `file_size`, or
/// from the declared stream size; when neither is known the frame omits the
/// content size.
pub fn compress_zstd_frame(
    fctx: &FileIoCtx,
    prefs: &Prefs,
    ress: &mut CompressResources,
    src: &mut dyn Read,
    dst: &mut DstFile,
    src_file_name: &str,
    file_size: Option<u64>,
    compression_level: i32,
    readsize: &mut u64,
) -> io::Result<u64> {
    display_level(6, "compression using zstd format \n");

    let CompressResources {
        cctx,
        src_buffer,
        dst_buffer,
        ..
    } = ress;

    let mut compressed_file_size: u64 = 0;
    let mut directive = Directive::Continue;

    if let Some(size) = file_size {
        cctx.set_pledged_src_size(size)
            .map_err(|e| io::Error::other(format!("error 11 : {}", e)))?;
    } else if prefs.stream_src_size > 0 {
        // Unknown source size; trust the declared stream size.
        cctx.set_pledged_src_size(prefs.stream_src_size)
            .map_err(|e| io::Error::other(format!("error 11 : {}", e)))?;
    }

    let mut controller = if prefs.adaptive_mode {
        Some(AdaptiveController::new(
            compression_level,
            prefs.min_adapt_level.max(zstd::min_c_level()),
            prefs.max_adapt_level.min(zstd::max_c_level()),
            prefs.nb_workers,
        ))
    } else {
        None
    };
    let mut current_level = compression_level;

    loop {
        // Fill the input buffer.
        let in_size = read_to_capacity(src, src_buffer)
            .map_err(|e| io::Error::new(e.kind(), format!("error 26 : Read error : {}", e)))?;
        display_level(6, &format!("read {} bytes from source \n", in_size));
        *readsize += in_size as u64;

        if in_size == 0 || Some(*readsize) == file_size {
            directive = Directive::End;
        }

        let mut src_pos = 0usize;
        let mut still_to_flush = 1usize;
        while src_pos != in_size || (directive == Directive::End && still_to_flush != 0) {
            let old_ipos = src_pos;
            let to_flush_now = cctx.to_flush_now();
            let mut dst_pos = 0usize;
            still_to_flush = cctx
                .compress_stream2(
                    dst_buffer,
                    &mut dst_pos,
                    &src_buffer[..in_size],
                    &mut src_pos,
                    directive,
                )
                .map_err(|e| io::Error::other(format!("error 11 : {}", e)))?;

            if let Some(ctrl) = controller.as_mut() {
                ctrl.note_stream_call(src_pos != old_ipos, to_flush_now);
            }

            if dst_pos > 0 {
                dst.write_all(&dst_buffer[..dst_pos]).map_err(|e| {
                    io::Error::new(
                        e.kind(),
                        format!("error 25 : Write error : {} (cannot write compressed block)", e),
                    )
                })?;
                compressed_file_size += dst_pos as u64;
            }

            // Progress notification and adaptive correction, rate-limited.
            if ready_for_update() {
                let zfp = cctx.frame_progression();
                let c_share =
                    zfp.produced as f64 / (zfp.consumed.max(1)) as f64 * 100.0;
                if notification_level() >= 3 {
                    display_level(
                        3,
                        &format!(
                            "\r(L{}) Buffered :{:>8} - Consumed :{:>8} - Compressed :{:>8} => {:.2}% ",
                            current_level,
                            human_size(zfp.ingested - zfp.consumed),
                            human_size(zfp.consumed),
                            human_size(zfp.produced),
                            c_share,
                        ),
                    );
                } else if notification_level() >= 2
                    || progress_setting() == ProgressSetting::Always
                {
                    display_level(1, &format!("\r{:79}\r", ""));
                    if fctx.nb_files_total > 1 {
                        let shown = if src_file_name.len() > 18 {
                            &src_file_name[src_file_name.len() - 15..]
                        } else {
                            src_file_name
                        };
                        display_level(
                            1,
                            &format!(
                                "Compress: {}/{} files. Current: {} ",
                                fctx.curr_file_idx + 1,
                                fctx.nb_files_total,
                                shown
                            ),
                        );
                    }
                    display_level(1, &format!("Read:{:>8} ", human_size(zfp.consumed)));
                    if let Some(size) = file_size {
                        display_level(2, &format!("/{:>8}", human_size(size)));
                    }
                    display_level(1, &format!(" ==> {:.0}%", c_share));
                }

                if let Some(ctrl) = controller.as_mut() {
                    if let Some(new_level) = ctrl.observe(&zfp) {
                        current_level = new_level;
                        cctx.set_parameter(CParam::CompressionLevel(new_level))
                            .map_err(|e| io::Error::other(format!("error 11 : {}", e)))?;
                    }
                }
                delay_next_update();
            }
        }

        if directive == Directive::End {
            break;
        }
    }

    if let Some(size) = file_size {
        if *readsize != size {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("error 27 : Read error : Incomplete read : {} / {} B", readsize, size),
            ));
        }
    }

    Ok(compressed_file_size)
}

// ---------------------------------------------------------------------------
// Per-file lifecycle
// ---------------------------------------------------------------------------

/// Compresses one already-opened source into `dst`, dispatching on the
/// output format, and accounts the result into `fctx`.
fn compress_filename_internal(
    fctx: &mut FileIoCtx,
    prefs: &Prefs,
    ress: &mut CompressResources,
    dst: &mut DstFile,
    dst_file_name: &str,
    src: &mut dyn Read,
    src_file_name: &str,
    compression_level: i32,
) -> io::Result<()> {
    let time_start = get_time();
    // SAFETY: clock() is the C standard library CPU-clock query.
    let cpu_start = unsafe { clock() };
    let mut readsize: u64 = 0;

    let file_size = if src_file_name != STDIN_MARK {
        get_file_size(Path::new(src_file_name))
    } else {
        None
    };
    display_level(
        5,
        &format!("{}: {:?} bytes \n", src_file_name, file_size),
    );

    let compressed_size = match prefs.compression_type {
        CompressionFormat::Zstd => compress_zstd_frame(
            fctx,
            prefs,
            ress,
            src,
            dst,
            src_file_name,
            file_size,
            compression_level,
            &mut readsize,
        )?,
        #[cfg(feature = "gzip")]
        CompressionFormat::Gzip => super::compress_alt::compress_gz_frame(
            ress,
            src,
            dst,
            src_file_name,
            file_size,
            compression_level,
            &mut readsize,
        )?,
        #[cfg(feature = "xz")]
        CompressionFormat::Xz | CompressionFormat::Lzma => {
            super::compress_alt::compress_lzma_frame(
                ress,
                src,
                dst,
                src_file_name,
                file_size,
                compression_level,
                &mut readsize,
                prefs.compression_type == CompressionFormat::Lzma,
            )?
        }
        #[cfg(feature = "lz4")]
        CompressionFormat::Lz4 => super::compress_alt::compress_lz4_frame(
            ress,
            src,
            dst,
            src_file_name,
            file_size,
            prefs.checksum_flag,
            &mut readsize,
        )?,
        #[allow(unreachable_patterns)]
        other => {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!(
                    "error 20 : {}: file cannot be compressed as {:?} (zstdr built without that format)",
                    src_file_name, other
                ),
            ))
        }
    };

    fctx.total_bytes_input += readsize;
    fctx.total_bytes_output += compressed_size;

    display_level(2, &format!("\r{:79}\r", ""));
    if notification_level() >= 2
        && !fctx.has_stdout_output
        && (notification_level() >= 3 || fctx.nb_files_total <= 1)
    {
        let ratio = if readsize == 0 {
            0.0
        } else {
            compressed_size as f64 / readsize as f64 * 100.0
        };
        display_level(
            2,
            &format!(
                "{:<20} :{:6.2}%   ({:>8} => {:>8}, {}) \n",
                src_file_name,
                ratio,
                human_size(readsize),
                human_size(compressed_size),
                dst_file_name,
            ),
        );
    }

    // Elapsed time and CPU load.
    {
        let cpu_load_s = (unsafe { clock() } - cpu_start) as f64 / CLOCKS_PER_SEC as f64;
        let time_s = clock_span_ns(time_start).max(1) as f64 / 1_000_000_000.0;
        display_level(
            4,
            &format!(
                "{:<20} : Completed in {:.2} sec  (cpu load : {:.0}%)\n",
                src_file_name,
                time_s,
                cpu_load_s / time_s * 100.0
            ),
        );
    }
    Ok(())
}

/// Opens the destination (unless a shared one is provided), arms the signal
/// slot, compresses, then closes and transfers stat — removing the partial
/// artefact if anything failed.
fn compress_filename_dst_file(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    ress: &mut CompressResources,
    shared_dst: Option<&mut DstFile>,
    dst_file_name: &str,
    src: &mut dyn Read,
    src_file_name: &str,
    compression_level: i32,
) -> io::Result<()> {
    if let Some(dst) = shared_dst {
        // Single concatenated destination: lifecycle owned by the caller.
        return compress_filename_internal(
            fctx,
            prefs,
            ress,
            dst,
            dst_file_name,
            src,
            src_file_name,
            compression_level,
        );
    }

    // Capture the source's stat before compressing, for permission and
    // mtime transfer.
    let src_stat = if src_file_name != STDIN_MARK {
        std::fs::metadata(src_file_name)
            .ok()
            .filter(|m| m.file_type().is_file())
    } else {
        None
    };
    #[cfg(unix)]
    let dst_permissions = src_stat
        .as_ref()
        .map(|m| {
            use std::os::unix::fs::MetadataExt;
            m.mode()
        })
        .unwrap_or(DEFAULT_FILE_PERMISSIONS);
    #[cfg(not(unix))]
    let dst_permissions = DEFAULT_FILE_PERMISSIONS;

    display_level(
        6,
        &format!("opening destination: {} \n", dst_file_name),
    );
    let mut dst = open_dst_file(fctx, prefs, Some(src_file_name), dst_file_name, dst_permissions)?;
    // Armed only after the open succeeded: an interrupt during the overwrite
    // prompt must not delete a pre-existing file.
    let guard = ArmedDestination::arm(dst_file_name);

    let result = compress_filename_internal(
        fctx,
        prefs,
        ress,
        &mut dst,
        dst_file_name,
        src,
        src_file_name,
        compression_level,
    );

    guard.disarm();
    display_level(6, &format!("closing destination: {} \n", dst_file_name));
    let close_result = dst.close();

    let result = match (result, close_result) {
        (Ok(()), Err(e)) => Err(io::Error::new(
            e.kind(),
            format!("zstdr: {}: {}", dst_file_name, e),
        )),
        (r, _) => r,
    };

    if result.is_ok() {
        if let Some(meta) = &src_stat {
            if !prefs.test_mode && dst_file_name != STDOUT_MARK {
                let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                let _ = set_file_stat(Path::new(dst_file_name), mtime, dst_permissions);
            }
        }
    } else if dst_file_name != STDOUT_MARK && !prefs.test_mode {
        // Remove the compression artefact; nothing special on failure.
        let _ = remove_file(dst_file_name);
    }

    result
}

/// Opens the source, runs the destination lifecycle, then handles `--rm`.
fn compress_filename_src_file(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    ress: &mut CompressResources,
    shared_dst: Option<&mut DstFile>,
    dst_file_name: &str,
    src_file_name: &str,
    compression_level: i32,
) -> io::Result<()> {
    display_level(6, &format!("compressing source: {} \n", src_file_name));

    if is_directory(Path::new(src_file_name)) {
        display_level(1, &format!("zstdr: {} is a directory -- ignored \n", src_file_name));
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}: is a directory", src_file_name),
        ));
    }

    if let Some(dict) = ress.dict_file_name.as_deref() {
        if is_same_file(src_file_name, dict) {
            display_level(
                1,
                &format!("zstdr: cannot use {} as an input file and dictionary \n", src_file_name),
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}: is the dictionary", src_file_name),
            ));
        }
    }

    // --exclude-compressed: skip sources that already look compressed.
    if prefs.exclude_compressed_files && is_compressed_file(src_file_name) {
        display_level(4, &format!("File is already compressed : {} \n", src_file_name));
        return Ok(());
    }

    let mut src = open_src_file(Some(prefs), src_file_name)?;

    let result = compress_filename_dst_file(
        fctx,
        prefs,
        ress,
        shared_dst,
        dst_file_name,
        &mut *src,
        src_file_name,
        compression_level,
    );
    drop(src);

    if result.is_ok() && prefs.remove_src_file && src_file_name != STDIN_MARK {
        // The signal slot was cleared inside the destination lifecycle, so
        // an interrupt from here on cannot delete the finished output.
        remove_file(src_file_name).map_err(|e| {
            io::Error::new(e.kind(), format!("error 1 : zstdr: {}: {}", src_file_name, e))
        })?;
    }
    result
}

// ---------------------------------------------------------------------------
// Multi-file warning
// ---------------------------------------------------------------------------

/// Decides whether a multi-source run into one destination may proceed.
/// Returns `true` when the console should abort.
pub(crate) fn remove_multi_files_warning(
    fctx: &FileIoCtx,
    prefs: &Prefs,
    out_file_name: &str,
    display_level_cutoff: i32,
) -> bool {
    if fctx.nb_files_total <= 1 || prefs.overwrite {
        return false;
    }
    if notification_level() <= display_level_cutoff {
        if prefs.remove_src_file {
            display_level(
                1,
                &format!(
                    "zstdr: Aborting... not deleting files and processing into dst: {}\n",
                    out_file_name
                ),
            );
            return true;
        }
        return false;
    }
    if out_file_name == STDOUT_MARK {
        display_level(
            2,
            "zstdr: WARNING: all input files will be processed and concatenated into stdout. \n",
        );
    } else {
        display_level(
            2,
            &format!(
                "zstdr: WARNING: all input files will be processed and concatenated into a single output file: {} \n",
                out_file_name
            ),
        );
    }
    display_level(
        2,
        "The concatenated output CANNOT regenerate the original directory tree. \n",
    );
    if prefs.remove_src_file {
        if fctx.has_stdout_output {
            display_level(
                1,
                "Aborting. Use -f if you really want to delete the files and output to stdout\n",
            );
            return true;
        }
        return require_user_confirmation(
            "This is a destructive operation. Proceed? (y/n): ",
            "Aborting...",
            "yY",
            fctx.has_stdin_input,
        );
    }
    false
}

// ---------------------------------------------------------------------------
// Public batch entry points
// ---------------------------------------------------------------------------

/// Compresses a single file. `src` may be the stdin sentinel, `dst` the
/// stdout sentinel.
pub fn compress_filename(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    dst_file_name: &str,
    src_file_name: &str,
    dict_file_name: Option<&str>,
    compression_level: i32,
) -> io::Result<()> {
    let max_src = get_file_size(Path::new(src_file_name));
    let mut ress = CompressResources::new(prefs, dict_file_name, max_src, compression_level)?;
    compress_filename_src_file(
        fctx,
        prefs,
        &mut ress,
        None,
        dst_file_name,
        src_file_name,
        compression_level,
    )
}

fn largest_file_size(srcs: &[&str]) -> Option<u64> {
    srcs.iter()
        .filter_map(|s| get_file_size(Path::new(s)))
        .max()
}

/// Compresses `srcs` in one of two modes:
/// - `out_file_name` set: every source is compressed into that single
///   destination, in list order;
/// - otherwise one destination per source, derived by appending `suffix`
///   (optionally rebased into `out_dir`).
///
/// Returns the number of files that failed; fatal setup errors abort with
/// `Err`.
pub fn compress_multiple_filenames(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    srcs: &[&str],
    out_dir: Option<&str>,
    out_file_name: Option<&str>,
    suffix: &str,
    dict_file_name: Option<&str>,
    compression_level: i32,
) -> io::Result<usize> {
    let mut ress =
        CompressResources::new(prefs, dict_file_name, largest_file_size(srcs), compression_level)?;
    let mut missed: usize = 0;

    if let Some(out_name) = out_file_name {
        // Single concatenated destination.
        if remove_multi_files_warning(fctx, prefs, out_name, 1) {
            return Ok(srcs.len());
        }
        let mut dst = open_dst_file(fctx, prefs, None, out_name, DEFAULT_FILE_PERMISSIONS)?;
        while fctx.curr_file_idx < fctx.nb_files_total {
            let src_name = srcs[fctx.curr_file_idx];
            let status = compress_filename_src_file(
                fctx,
                prefs,
                &mut ress,
                Some(&mut dst),
                out_name,
                src_name,
                compression_level,
            );
            match status {
                Ok(()) => fctx.nb_files_processed += 1,
                Err(_) => missed += 1,
            }
            fctx.curr_file_idx += 1;
        }
        dst.close().map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 29 : Write error ({}) : cannot properly close {}", e, out_name),
            )
        })?;
    } else {
        while fctx.curr_file_idx < fctx.nb_files_total {
            let src_name = srcs[fctx.curr_file_idx];
            let dst_name = determine_compressed_name(src_name, out_dir, suffix);
            let status = compress_filename_src_file(
                fctx,
                prefs,
                &mut ress,
                None,
                &dst_name,
                src_name,
                compression_level,
            );
            match status {
                Ok(()) => fctx.nb_files_processed += 1,
                Err(_) => missed += 1,
            }
            fctx.curr_file_idx += 1;
        }
        if out_dir.is_some() {
            check_filename_collisions(srcs);
        }
    }

    if fctx.nb_files_processed >= 1 && fctx.nb_files_total > 1 && fctx.total_bytes_input != 0 {
        display_level(2, &format!("\r{:79}\r", ""));
        display_level(
            2,
            &format!(
                "{:3} files compressed :{:.2}%   ({:>8} => {:>8})\n",
                fctx.nb_files_processed,
                fctx.total_bytes_output as f64 / fctx.total_bytes_input as f64 * 100.0,
                human_size(fctx.total_bytes_input),
                human_size(fctx.total_bytes_output),
            ),
        );
    }

    Ok(missed)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn quiet() {
        crate::io::prefs::set_notification_level(0);
    }

    #[test]
    fn resources_allocate_recommended_buffers() {
        quiet();
        let mut prefs = Prefs::default();
        let ress = CompressResources::new(&mut prefs, None, Some(1 << 20), 3).unwrap();
        assert_eq!(ress.src_buffer.len(), zstd::cstream_in_size());
        assert_eq!(ress.dst_buffer.len(), zstd::cstream_out_size());
        assert!(ress.dict_buffer.is_empty());
    }

    #[test]
    fn compress_filename_produces_zstd_frame() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("input.txt");
        let dst = dir.path().join("input.txt.zst");
        let payload = b"compress me through the full file gate path".repeat(100);
        std::fs::write(&src, &payload).unwrap();

        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let mut fctx = FileIoCtx::new();
        compress_filename(
            &mut fctx,
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
            3,
        )
        .unwrap();

        let out = std::fs::read(&dst).unwrap();
        assert_eq!(&out[..4], &zstd::ZSTD_MAGICNUMBER.to_le_bytes());
        assert_eq!(fctx.total_bytes_input, payload.len() as u64);
        assert!(fctx.total_bytes_output > 0);
    }

    #[test]
    fn compress_transfers_mtime_and_mode() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("input.bin");
        let dst = dir.path().join("input.bin.zst");
        std::fs::write(&src, b"stat transfer test").unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&src, std::fs::Permissions::from_mode(0o640)).unwrap();
        }
        let src_mtime = std::fs::metadata(&src).unwrap().modified().unwrap();

        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        compress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
            1,
        )
        .unwrap();

        let meta = std::fs::metadata(&dst).unwrap();
        let dt = meta
            .modified()
            .unwrap()
            .duration_since(src_mtime)
            .unwrap_or_default()
            .as_secs();
        assert!(dt <= 2, "mtime not transferred");
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            assert_eq!(meta.permissions().mode() & 0o777, 0o640);
        }
    }

    #[test]
    fn compress_rejects_directory_source() {
        quiet();
        let dir = TempDir::new().unwrap();
        let dst = dir.path().join("out.zst");
        let mut prefs = Prefs::default();
        let err = compress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            dir.path().to_str().unwrap(),
            None,
            3,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(!dst.exists());
    }

    #[test]
    fn exclude_compressed_skips_without_output() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("already.zst");
        std::fs::write(&src, b"whatever").unwrap();
        let dst = dir.path().join("already.zst.zst");

        let mut prefs = Prefs::default();
        prefs.exclude_compressed_files = true;
        compress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
            3,
        )
        .unwrap();
        assert!(!dst.exists(), "excluded source must not produce output");
    }

    #[test]
    fn remove_src_file_after_success() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("victim.txt");
        let dst = dir.path().join("victim.txt.zst");
        std::fs::write(&src, b"to be removed").unwrap();

        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        prefs.remove_src_file = true;
        compress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
            3,
        )
        .unwrap();
        assert!(!src.exists(), "--rm must delete the source on success");
        assert!(dst.exists());
    }

    #[test]
    fn multiple_filenames_per_file_destinations() {
        quiet();
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.txt");
        std::fs::write(&a, b"file a").unwrap();
        std::fs::write(&b, b"file b").unwrap();

        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let srcs = [a.to_str().unwrap(), b.to_str().unwrap()];
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = srcs.len();
        let missed = compress_multiple_filenames(
            &mut fctx,
            &mut prefs,
            &srcs,
            None,
            None,
            ".zst",
            None,
            3,
        )
        .unwrap();
        assert_eq!(missed, 0);
        assert!(dir.path().join("a.txt.zst").exists());
        assert!(dir.path().join("b.txt.zst").exists());
    }

    #[test]
    fn multiple_filenames_missing_file_is_counted_not_fatal() {
        quiet();
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("real.txt");
        std::fs::write(&a, b"real").unwrap();
        let srcs = [a.to_str().unwrap(), "/no/such/input.txt"];
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = srcs.len();
        let missed = compress_multiple_filenames(
            &mut fctx,
            &mut prefs,
            &srcs,
            None,
            None,
            ".zst",
            None,
            3,
        )
        .unwrap();
        assert_eq!(missed, 1);
        assert!(dir.path().join("real.txt.zst").exists());
    }

    #[test]
    fn concatenated_output_holds_all_frames() {
        quiet();
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"").unwrap();
        std::fs::write(&b, vec![0xFFu8; 10]).unwrap();
        let out = dir.path().join("out.zst");

        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let srcs = [a.to_str().unwrap(), b.to_str().unwrap()];
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = srcs.len();
        let missed = compress_multiple_filenames(
            &mut fctx,
            &mut prefs,
            &srcs,
            None,
            Some(out.to_str().unwrap()),
            ".zst",
            None,
            3,
        )
        .unwrap();
        assert_eq!(missed, 0);
        assert_eq!(fctx.nb_files_processed, 2);
        assert!(out.exists());
        // Two frames, back to back; both start with the zstd magic.
        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(&bytes[..4], &zstd::ZSTD_MAGICNUMBER.to_le_bytes());
    }

    #[test]
    fn incomplete_read_is_reported() {
        // A pledged size larger than the actual stream is a per-file error
        // (the codec rejects the short frame at the END directive).
        quiet();
        let mut prefs = Prefs::default();
        let mut ress = CompressResources::new(&mut prefs, None, Some(100), 1).unwrap();
        let data = vec![1u8; 100];
        let mut src: &[u8] = &data[..50]; // stream shorter than the pledge
        let mut dst = DstFile::Sink;
        let mut readsize = 0;
        let err = compress_zstd_frame(
            &FileIoCtx::new(),
            &prefs,
            &mut ress,
            &mut src,
            &mut dst,
            "short.bin",
            Some(100),
            1,
            &mut readsize,
        )
        .unwrap_err();
        assert!(err.to_string().contains("error"));
    }
}
