//! Frame demultiplexer, per-file decompression lifecycle, and the
//! decompression batch driver.
//!
//! The demultiplexer reads the first four bytes of each chained frame and
//! routes to the matching decoder:
//!
//! - Zstandard frames (and skippable frames) → [`decompress_zstd_frame`]
//! - `1F 8B` → gzip decoder
//! - `FD 37` (xz) or `5D 00` (lzma-alone) → liblzma decoder
//! - `04 22 4D 18` → LZ4 frame decoder
//! - anything else → raw pass-through when forced output goes to stdout,
//!   otherwise the file fails with "unsupported format"
//!
//! The probe bytes stay in the shared source buffer; decoders consume them
//! from there and leave any tail behind, so chained frames of different
//! formats demultiplex correctly.

use std::io::{self, Read};
use std::path::Path;
use std::time::SystemTime;

use crate::config::DEFAULT_FILE_PERMISSIONS;
use crate::io::decompress_frame::decompress_zstd_frame;
use crate::io::decompress_resources::DecompressResources;
use crate::io::file_io::{
    open_dst_file, open_src_file, read_to_capacity, remove_file, DstFile, STDIN_MARK, STDOUT_MARK,
};
use crate::io::names::{check_filename_collisions, determine_dst_name};
use crate::io::prefs::{
    display_level, notification_level, progress_setting, FileIoCtx, Prefs, ProgressSetting,
};
use crate::io::signal::ArmedDestination;
use crate::util::{is_directory, set_file_stat};
use crate::zstd::{self, ZSTD_MAGICNUMBER};

/// LZ4 frame magic number (little-endian).
const LZ4_MAGICNUMBER: u32 = 0x184D_2204;

// ---------------------------------------------------------------------------
// Demultiplexer
// ---------------------------------------------------------------------------

/// Decodes every chained frame of `src` into `dst`, switching decoder on
/// each frame's magic bytes. Returns the total decoded byte count.
fn decompress_frames(
    fctx: &mut FileIoCtx,
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    dst: &mut DstFile,
    dst_file_name: &str,
    src_file_name: &str,
) -> io::Result<u64> {
    let mut read_something = false;
    let mut filesize: u64 = 0;

    loop {
        // Ensure the 4-byte probe is loaded.
        if ress.src_buffer_loaded < 4 {
            let loaded = ress.src_buffer_loaded;
            let n = read_to_capacity(src, &mut ress.src_buffer[loaded..4])?;
            ress.src_buffer_loaded += n;
        }
        if ress.src_buffer_loaded == 0 {
            if !read_something {
                // An empty source is invalid.
                display_level(1, &format!("zstdr: {}: unexpected end of file \n", src_file_name));
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("{}: unexpected end of file", src_file_name),
                ));
            }
            break; // clean frame boundary
        }
        read_something = true;
        if ress.src_buffer_loaded < 4 {
            display_level(1, &format!("zstdr: {}: unknown header \n", src_file_name));
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: unknown header", src_file_name),
            ));
        }

        let probe: [u8; 4] = ress.src_buffer[..4].try_into().unwrap();
        let magic = u32::from_le_bytes(probe);

        if magic == ZSTD_MAGICNUMBER || zstd::is_skippable_magic(magic) {
            filesize += decompress_zstd_frame(
                fctx,
                ress,
                src,
                prefs,
                src_file_name,
                dst,
                filesize,
            )?;
        } else if probe[0] == 0x1F && probe[1] == 0x8B {
            #[cfg(feature = "gzip")]
            {
                filesize +=
                    super::decompress_alt::decompress_gz_frame(ress, src, prefs, src_file_name, dst)?;
            }
            #[cfg(not(feature = "gzip"))]
            {
                display_level(
                    1,
                    &format!("zstdr: {}: gzip file cannot be uncompressed (zstdr built without gzip support) -- ignored \n", src_file_name),
                );
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{}: gzip not supported", src_file_name),
                ));
            }
        } else if (probe[0] == 0xFD && probe[1] == 0x37) || (probe[0] == 0x5D && probe[1] == 0x00) {
            #[cfg(feature = "xz")]
            {
                let plain_lzma = probe[0] != 0xFD;
                filesize += super::decompress_alt::decompress_lzma_frame(
                    ress,
                    src,
                    prefs,
                    src_file_name,
                    dst,
                    plain_lzma,
                )?;
            }
            #[cfg(not(feature = "xz"))]
            {
                display_level(
                    1,
                    &format!("zstdr: {}: xz/lzma file cannot be uncompressed (zstdr built without xz support) -- ignored \n", src_file_name),
                );
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{}: xz/lzma not supported", src_file_name),
                ));
            }
        } else if magic == LZ4_MAGICNUMBER {
            #[cfg(feature = "lz4")]
            {
                filesize +=
                    super::decompress_alt::decompress_lz4_frame(ress, src, prefs, src_file_name, dst)?;
            }
            #[cfg(not(feature = "lz4"))]
            {
                display_level(
                    1,
                    &format!("zstdr: {}: lz4 file cannot be uncompressed (zstdr built without lz4 support) -- ignored \n", src_file_name),
                );
                return Err(io::Error::new(
                    io::ErrorKind::Unsupported,
                    format!("{}: lz4 not supported", src_file_name),
                ));
            }
        } else if prefs.overwrite && dst_file_name == STDOUT_MARK {
            // Unknown magic with forced stdout output: copy verbatim.
            filesize += super::decompress_alt::pass_through(ress, src, prefs, dst)?;
            break;
        } else {
            display_level(1, &format!("zstdr: {}: unsupported format \n", src_file_name));
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: unsupported format", src_file_name),
            ));
        }
    }

    fctx.total_bytes_output += filesize;
    display_level(2, &format!("\r{:79}\r", ""));
    // No status line in pipe mode or multi-file mode, unless verbose.
    if (notification_level() >= 2 && fctx.nb_files_total <= 1)
        || notification_level() >= 3
        || progress_setting() == ProgressSetting::Always
    {
        display_level(1, &format!("\r{:<20}: {} bytes \n", src_file_name, filesize));
    }

    Ok(filesize)
}

// ---------------------------------------------------------------------------
// Per-file lifecycle
// ---------------------------------------------------------------------------

/// Opens the destination (unless shared), arms the signal slot, decodes all
/// frames, then closes and transfers stat — removing the partial artefact on
/// failure.
fn decompress_dst_file(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    shared_dst: Option<&mut DstFile>,
    dst_file_name: &str,
    src_file_name: &str,
) -> io::Result<u64> {
    if let Some(dst) = shared_dst {
        return decompress_frames(fctx, ress, src, prefs, dst, dst_file_name, src_file_name);
    }

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

    let mut dst = open_dst_file(fctx, prefs, Some(src_file_name), dst_file_name, dst_permissions)?;
    // Armed only after a successful open; never in test mode, where no
    // artefact exists and a stale name must not be unlinked.
    let guard = (!prefs.test_mode).then(|| ArmedDestination::arm(dst_file_name));

    let result = decompress_frames(fctx, ress, src, prefs, &mut dst, dst_file_name, src_file_name);

    if let Some(guard) = guard {
        guard.disarm();
    }
    let close_result = dst.close();

    let result = match (result, close_result) {
        (Ok(n), Ok(())) => Ok(n),
        (Ok(_), Err(e)) => Err(io::Error::new(
            e.kind(),
            format!("zstdr: {}: {}", dst_file_name, e),
        )),
        (Err(e), _) => Err(e),
    };

    match &result {
        Ok(_) => {
            if let Some(meta) = &src_stat {
                if !prefs.test_mode && dst_file_name != STDOUT_MARK {
                    let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
                    let _ = set_file_stat(Path::new(dst_file_name), mtime, dst_permissions);
                }
            }
        }
        Err(_) => {
            if dst_file_name != STDOUT_MARK && !prefs.test_mode {
                // Remove the decompression artefact.
                let _ = remove_file(dst_file_name);
            }
        }
    }

    result
}

/// Opens the source, resets the loaded count, runs the destination
/// lifecycle, then handles `--rm`.
fn decompress_src_file(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    ress: &mut DecompressResources,
    shared_dst: Option<&mut DstFile>,
    dst_file_name: &str,
    src_file_name: &str,
) -> io::Result<u64> {
    if is_directory(Path::new(src_file_name)) {
        display_level(1, &format!("zstdr: {} is a directory -- ignored \n", src_file_name));
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}: is a directory", src_file_name),
        ));
    }

    let mut src = open_src_file(Some(prefs), src_file_name)?;
    ress.src_buffer_loaded = 0;

    let result = decompress_dst_file(
        fctx,
        prefs,
        ress,
        &mut *src,
        shared_dst,
        dst_file_name,
        src_file_name,
    );
    drop(src);

    if result.is_ok() && prefs.remove_src_file && src_file_name != STDIN_MARK {
        // The signal slot was cleared inside the destination lifecycle.
        remove_file(src_file_name).map_err(|e| {
            io::Error::new(e.kind(), format!("zstdr: {}: {}", src_file_name, e))
        })?;
    }
    result
}

// ---------------------------------------------------------------------------
// Public batch entry points
// ---------------------------------------------------------------------------

/// Decompresses a single file. `src` may be the stdin sentinel, `dst` the
/// stdout sentinel.
pub fn decompress_filename(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    dst_file_name: &str,
    src_file_name: &str,
    dict_file_name: Option<&str>,
) -> io::Result<u64> {
    let mut ress = DecompressResources::new(prefs, dict_file_name)?;
    decompress_src_file(fctx, prefs, &mut ress, None, dst_file_name, src_file_name)
}

/// Decompresses `srcs` in one of two modes:
/// - `out_file_name` set: every source decodes into that single destination;
/// - otherwise one destination per source, derived by stripping the
///   recognised suffix (optionally rebased into `out_dir`); an unknown
///   suffix fails that file only.
///
/// Returns the number of files that failed.
pub fn decompress_multiple_filenames(
    fctx: &mut FileIoCtx,
    prefs: &mut Prefs,
    srcs: &[&str],
    out_dir: Option<&str>,
    out_file_name: Option<&str>,
    dict_file_name: Option<&str>,
) -> io::Result<usize> {
    let mut ress = DecompressResources::new(prefs, dict_file_name)?;
    let mut missed: usize = 0;

    if let Some(out_name) = out_file_name {
        if super::compress_frame::remove_multi_files_warning(fctx, prefs, out_name, 1) {
            return Ok(srcs.len());
        }
        let mut dst =
            open_dst_file(fctx, prefs, None, out_name, DEFAULT_FILE_PERMISSIONS).map_err(|e| {
                io::Error::new(e.kind(), format!("error 19 : cannot open {} : {}", out_name, e))
            })?;
        while fctx.curr_file_idx < fctx.nb_files_total {
            let src_name = srcs[fctx.curr_file_idx];
            match decompress_src_file(fctx, prefs, &mut ress, Some(&mut dst), out_name, src_name) {
                Ok(_) => fctx.nb_files_processed += 1,
                Err(_) => missed += 1,
            }
            fctx.curr_file_idx += 1;
        }
        dst.close().map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 72 : Write error : {} : cannot properly close output file", e),
            )
        })?;
    } else {
        while fctx.curr_file_idx < fctx.nb_files_total {
            let src_name = srcs[fctx.curr_file_idx];
            let dst_name = match determine_dst_name(src_name, out_dir) {
                Some(n) => n,
                None => {
                    // Unknown suffix: skip this file, keep the batch going.
                    missed += 1;
                    fctx.curr_file_idx += 1;
                    continue;
                }
            };
            match decompress_src_file(fctx, prefs, &mut ress, None, &dst_name, src_name) {
                Ok(_) => fctx.nb_files_processed += 1,
                Err(_) => missed += 1,
            }
            fctx.curr_file_idx += 1;
        }
        if out_dir.is_some() {
            check_filename_collisions(srcs);
        }
    }

    if fctx.nb_files_processed >= 1 && fctx.nb_files_total > 1 && fctx.total_bytes_output != 0 {
        display_level(
            2,
            &format!(
                "{} files decompressed : {} bytes total \n",
                fctx.nb_files_processed, fctx.total_bytes_output
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
    use std::io::Write;
    use tempfile::TempDir;

    fn quiet() {
        crate::io::prefs::set_notification_level(0);
    }

    fn zstd_frame(data: &[u8]) -> Vec<u8> {
        use crate::zstd::{CCtx, CParam, Directive};
        let mut cctx = CCtx::try_new().unwrap();
        cctx.set_parameter(CParam::CompressionLevel(3)).unwrap();
        cctx.set_pledged_src_size(data.len() as u64).unwrap();
        let mut out = vec![0u8; zstd::cstream_out_size()];
        let mut result = Vec::new();
        let mut src_pos = 0;
        loop {
            let mut dst_pos = 0;
            let left = cctx
                .compress_stream2(&mut out, &mut dst_pos, data, &mut src_pos, Directive::End)
                .unwrap();
            result.extend_from_slice(&out[..dst_pos]);
            if left == 0 && src_pos == data.len() {
                break;
            }
        }
        result
    }

    fn decompress_file(stream: &[u8], suffix: &str) -> (io::Result<u64>, TempDir, String) {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join(format!("input{}", suffix));
        std::fs::write(&src, stream).unwrap();
        let dst = dir.path().join("output.bin");
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let r = decompress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
        );
        let dst_str = dst.to_str().unwrap().to_owned();
        (r, dir, dst_str)
    }

    #[test]
    fn single_zstd_frame_round_trips() {
        let payload: Vec<u8> = (0u8..=255).cycle().take(100_000).collect();
        let (r, _dir, dst) = decompress_file(&zstd_frame(&payload), ".zst");
        assert_eq!(r.unwrap(), payload.len() as u64);
        assert_eq!(std::fs::read(dst).unwrap(), payload);
    }

    #[test]
    fn chained_zstd_frames_concatenate() {
        let mut stream = zstd_frame(b"first ");
        stream.extend_from_slice(&zstd_frame(b"second"));
        let (r, _dir, dst) = decompress_file(&stream, ".zst");
        assert_eq!(r.unwrap(), 12);
        assert_eq!(std::fs::read(dst).unwrap(), b"first second");
    }

    #[test]
    fn skippable_frame_between_frames_is_ignored() {
        let mut stream = zstd_frame(b"data-");
        stream.extend_from_slice(&zstd::ZSTD_MAGIC_SKIPPABLE_START.to_le_bytes());
        stream.extend_from_slice(&5u32.to_le_bytes());
        stream.extend_from_slice(b"metaa");
        stream.extend_from_slice(&zstd_frame(b"more"));
        let (r, _dir, dst) = decompress_file(&stream, ".zst");
        assert_eq!(r.unwrap(), 9);
        assert_eq!(std::fs::read(dst).unwrap(), b"data-more");
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn mixed_zstd_and_gzip_frames_concatenate() {
        let mut stream = zstd_frame(b"zstd part|");
        let mut enc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(b"gzip part").unwrap();
        stream.extend_from_slice(&enc.finish().unwrap());
        stream.extend_from_slice(&zstd_frame(b"|tail"));

        let (r, _dir, dst) = decompress_file(&stream, ".zst");
        assert_eq!(r.unwrap(), 24);
        assert_eq!(std::fs::read(dst).unwrap(), b"zstd part|gzip part|tail");
    }

    #[cfg(all(feature = "gzip", feature = "xz", feature = "lz4"))]
    #[test]
    fn every_format_demultiplexes() {
        let mut stream = Vec::new();
        let mut genc =
            flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        genc.write_all(b"G").unwrap();
        stream.extend_from_slice(&genc.finish().unwrap());
        let mut xenc = xz2::write::XzEncoder::new(Vec::new(), 6);
        xenc.write_all(b"X").unwrap();
        stream.extend_from_slice(&xenc.finish().unwrap());
        let mut lenc = lz4_flex::frame::FrameEncoder::new(Vec::new());
        lenc.write_all(b"L").unwrap();
        stream.extend_from_slice(&lenc.finish().unwrap());
        stream.extend_from_slice(&zstd_frame(b"Z"));

        let (r, _dir, dst) = decompress_file(&stream, ".zst");
        assert_eq!(r.unwrap(), 4);
        assert_eq!(std::fs::read(dst).unwrap(), b"GXLZ");
    }

    #[test]
    fn unsupported_format_fails_and_removes_partial() {
        let (r, _dir, dst) = decompress_file(b"not compressed data at all", ".zst");
        assert!(r.is_err());
        assert!(!std::path::Path::new(&dst).exists());
    }

    #[test]
    fn empty_source_fails() {
        let (r, _dir, _) = decompress_file(b"", ".zst");
        assert!(r.is_err());
    }

    #[test]
    fn test_mode_creates_nothing() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("in.zst");
        std::fs::write(&src, zstd_frame(b"discarded")).unwrap();
        let dst = dir.path().join("out.bin");
        let mut prefs = Prefs::default();
        prefs.test_mode = true;
        let n = decompress_filename(
            &mut FileIoCtx::new(),
            &mut prefs,
            dst.to_str().unwrap(),
            src.to_str().unwrap(),
            None,
        )
        .unwrap();
        assert_eq!(n, 9);
        assert!(!dst.exists());
    }

    #[test]
    fn multiple_filenames_strip_suffix() {
        quiet();
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("file.bin.zst");
        std::fs::write(&src, zstd_frame(b"payload")).unwrap();
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let srcs = [src.to_str().unwrap()];
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = 1;
        let missed =
            decompress_multiple_filenames(&mut fctx, &mut prefs, &srcs, None, None, None).unwrap();
        assert_eq!(missed, 0);
        assert_eq!(
            std::fs::read(dir.path().join("file.bin")).unwrap(),
            b"payload"
        );
    }

    #[test]
    fn unknown_suffix_fails_file_not_batch() {
        quiet();
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.zst");
        std::fs::write(&good, zstd_frame(b"ok")).unwrap();
        let bad = dir.path().join("bad.weird");
        std::fs::write(&bad, b"irrelevant").unwrap();
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let srcs = [bad.to_str().unwrap(), good.to_str().unwrap()];
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = 2;
        let missed =
            decompress_multiple_filenames(&mut fctx, &mut prefs, &srcs, None, None, None).unwrap();
        assert_eq!(missed, 1);
        assert_eq!(std::fs::read(dir.path().join("good")).unwrap(), b"ok");
    }

    #[test]
    fn gzip_wrapping_zstd_is_not_recursively_decoded() {
        // x.zst.gz decompressed once must yield the zstd frame bytes.
        #[cfg(feature = "gzip")]
        {
            quiet();
            let inner = zstd_frame(b"inner payload");
            let mut enc =
                flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
            enc.write_all(&inner).unwrap();
            let outer = enc.finish().unwrap();

            let dir = TempDir::new().unwrap();
            let src = dir.path().join("x.zst.gz");
            std::fs::write(&src, &outer).unwrap();
            let mut prefs = Prefs::default();
            prefs.overwrite = true;
            let srcs = [src.to_str().unwrap()];
            let mut fctx = FileIoCtx::new();
            fctx.nb_files_total = 1;
            let missed =
                decompress_multiple_filenames(&mut fctx, &mut prefs, &srcs, None, None, None)
                    .unwrap();
            assert_eq!(missed, 0);
            // Output is x.zst and still holds the compressed zstd frame.
            let out = std::fs::read(dir.path().join("x.zst")).unwrap();
            assert_eq!(out, inner);
        }
    }

    #[test]
    fn single_destination_concatenates_outputs() {
        quiet();
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.zst");
        let b = dir.path().join("b.zst");
        std::fs::write(&a, zstd_frame(b"AAA")).unwrap();
        std::fs::write(&b, zstd_frame(b"BBB")).unwrap();
        let out = dir.path().join("joined.bin");
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let srcs = [a.to_str().unwrap(), b.to_str().unwrap()];
        let mut fctx = FileIoCtx::new();
        fctx.nb_files_total = 2;
        let missed = decompress_multiple_filenames(
            &mut fctx,
            &mut prefs,
            &srcs,
            None,
            Some(out.to_str().unwrap()),
            None,
        )
        .unwrap();
        assert_eq!(missed, 0);
        assert_eq!(std::fs::read(&out).unwrap(), b"AAABBB");
    }
}
