//! Zstandard frame decoding for the decompression engine.
//!
//! One call decodes exactly one frame (the codec also swallows skippable
//! frames here, producing zero bytes). The source buffer's loaded count is
//! maintained by memmove-compacting the unconsumed tail to offset 0 after
//! every codec call, which is what keeps the demultiplexer's magic probe
//! valid across frames.

use std::io::{self, Read};

use crate::io::decompress_resources::DecompressResources;
use crate::io::file_info::parse_frame_header;
use crate::io::file_io::DstFile;
use crate::io::prefs::{display_level, display_update, FileIoCtx, Prefs, ProgressSetting};
use crate::io::sparse::{fwrite_sparse, fwrite_sparse_end};
use crate::util::human_size;
use crate::zstd::{self, FRAMEHEADERSIZE_MAX};

/// Explains a window-too-large decoding error in actionable terms, when the
/// frame header is still parseable.
fn zstd_error_help(prefs: &Prefs, ress: &DecompressResources, err: &zstd::ZstdError, src_file_name: &str) {
    if !err.name().contains("memory") {
        return;
    }
    if let Some(fh) = parse_frame_header(&ress.src_buffer[..ress.src_buffer_loaded]) {
        let window_size = fh.window_size;
        let window_log = 64 - window_size.leading_zeros()
            - u32::from(window_size.is_power_of_two());
        display_level(
            1,
            &format!(
                "{} : Window size larger than maximum : {} > {} \n",
                src_file_name, window_size, prefs.mem_limit
            ),
        );
        if window_log <= zstd::WINDOWLOG_MAX {
            let window_mb = (window_size >> 20) + u64::from(window_size & ((1 << 20) - 1) != 0);
            display_level(
                1,
                &format!(
                    "{} : Use --long={} or --memory={}MB \n",
                    src_file_name, window_log, window_mb
                ),
            );
            return;
        }
    }
    display_level(
        1,
        &format!(
            "{} : Window log larger than maximum {}; not supported \n",
            src_file_name,
            zstd::WINDOWLOG_MAX
        ),
    );
}

/// Decodes one Zstandard frame from `src` into `dst` through the sparse
/// writer. Returns the decoded byte count of this frame;
/// `already_decoded` is only used for progress display of multi-frame
/// streams.
pub fn decompress_zstd_frame(
    fctx: &FileIoCtx,
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    src_file_name: &str,
    dst: &mut DstFile,
    already_decoded: u64,
) -> io::Result<u64> {
    let mut frame_size: u64 = 0;
    let mut stored_skips: u64 = 0;

    // Show only the tail of long names in progress lines.
    let shown_name = if src_file_name.len() > 20 {
        &src_file_name[src_file_name.len() - 20..]
    } else {
        src_file_name
    };

    ress.dctx.reset_session();

    // Header preload: the first decode call must see a complete header.
    if ress.src_buffer_loaded < FRAMEHEADERSIZE_MAX {
        let loaded = ress.src_buffer_loaded;
        let n = super::file_io::read_to_capacity(src, &mut ress.src_buffer[loaded..FRAMEHEADERSIZE_MAX])?;
        ress.src_buffer_loaded += n;
    }

    loop {
        let mut src_pos = 0usize;
        let mut dst_pos = 0usize;
        let hint = {
            let DecompressResources {
                dctx,
                src_buffer,
                src_buffer_loaded,
                dst_buffer,
            } = ress;
            dctx.decompress_stream(
                dst_buffer,
                &mut dst_pos,
                &src_buffer[..*src_buffer_loaded],
                &mut src_pos,
            )
        };
        let hint = match hint {
            Ok(h) => h,
            Err(e) => {
                display_level(
                    1,
                    &format!("{} : Decoding error (36) : {} \n", shown_name, e),
                );
                zstd_error_help(prefs, ress, &e, shown_name);
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("error 36 : {} : {}", src_file_name, e),
                ));
            }
        };

        // Write the decoded block through the sparse writer.
        stored_skips = fwrite_sparse(dst, &ress.dst_buffer[..dst_pos], prefs, stored_skips)?;
        frame_size += dst_pos as u64;

        let progress_level = if !fctx.has_stdout_output
            || crate::io::prefs::progress_setting() == ProgressSetting::Always
        {
            1
        } else {
            2
        };
        if fctx.nb_files_total > 1 {
            display_update(
                progress_level,
                &format!(
                    "\rDecompress: {:2}/{:2} files. Current: {} : {}...    ",
                    fctx.curr_file_idx + 1,
                    fctx.nb_files_total,
                    shown_name,
                    human_size(already_decoded + frame_size),
                ),
            );
        } else {
            display_update(
                progress_level,
                &format!(
                    "\r{:<20} : {}...     ",
                    shown_name,
                    human_size(already_decoded + frame_size),
                ),
            );
        }

        // Compact the unconsumed tail to the front of the source buffer.
        if src_pos > 0 {
            let loaded = ress.src_buffer_loaded;
            ress.src_buffer.copy_within(src_pos..loaded, 0);
            ress.src_buffer_loaded = loaded - src_pos;
        }

        if hint == 0 {
            break; // end of frame
        }

        // Refill: ask for what the codec wants, bounded by the buffer
        // (large skippable frames may request more).
        let to_decode = hint.min(ress.src_buffer.len());
        if ress.src_buffer_loaded < to_decode {
            let loaded = ress.src_buffer_loaded;
            let n = super::file_io::read_to_capacity(src, &mut ress.src_buffer[loaded..to_decode])?;
            if n == 0 {
                display_level(
                    1,
                    &format!("{} : Read error (39) : premature end \n", shown_name),
                );
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("error 39 : {} : premature end", src_file_name),
                ));
            }
            ress.src_buffer_loaded += n;
        }
    }

    fwrite_sparse_end(prefs, dst, stored_skips)?;
    Ok(frame_size)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::prefs::Prefs;
    use std::io::{Seek, SeekFrom};

    fn compress(data: &[u8]) -> Vec<u8> {
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

    fn decode_to_file(stream: &[u8]) -> (u64, Vec<u8>) {
        let mut prefs = Prefs::default();
        prefs.sparse_file_support = 0;
        let mut ress = DecompressResources::new(&mut prefs, None).unwrap();
        let f = tempfile::tempfile().unwrap();
        let mut check = f.try_clone().unwrap();
        let mut dst = DstFile::Regular(f);
        let mut src: &[u8] = stream;
        let n = decompress_zstd_frame(
            &FileIoCtx::new(),
            &mut ress,
            &mut src,
            &prefs,
            "test.zst",
            &mut dst,
            0,
        )
        .unwrap();
        check.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        check.read_to_end(&mut out).unwrap();
        (n, out)
    }

    #[test]
    fn decodes_single_frame() {
        let payload: Vec<u8> = (0u8..=255).cycle().take(50_000).collect();
        let stream = compress(&payload);
        let (n, out) = decode_to_file(&stream);
        assert_eq!(n, payload.len() as u64);
        assert_eq!(out, payload);
    }

    #[test]
    fn decodes_empty_frame() {
        let stream = compress(b"");
        let (n, out) = decode_to_file(&stream);
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn leaves_next_frame_bytes_loaded() {
        // Two concatenated frames: decoding the first must leave the second
        // frame's bytes (or at least its magic) in the shared buffer.
        let mut stream = compress(b"first frame");
        stream.extend_from_slice(&compress(b"second"));

        let mut prefs = Prefs::default();
        prefs.sparse_file_support = 0;
        let mut ress = DecompressResources::new(&mut prefs, None).unwrap();
        let mut dst = DstFile::Sink;
        let mut src: &[u8] = &stream;
        let fctx = FileIoCtx::new();

        let n1 =
            decompress_zstd_frame(&fctx, &mut ress, &mut src, &prefs, "t.zst", &mut dst, 0).unwrap();
        assert_eq!(n1, 11);

        // Dispatcher-style probe top-up: whatever the first decode left in
        // the buffer must line up with the second frame's start.
        if ress.src_buffer_loaded < 4 {
            let loaded = ress.src_buffer_loaded;
            let n = super::super::file_io::read_to_capacity(&mut src, &mut ress.src_buffer[loaded..4])
                .unwrap();
            ress.src_buffer_loaded += n;
        }
        assert_eq!(
            &ress.src_buffer[..4],
            &zstd::ZSTD_MAGICNUMBER.to_le_bytes()
        );

        let n2 =
            decompress_zstd_frame(&fctx, &mut ress, &mut src, &prefs, "t.zst", &mut dst, n1).unwrap();
        assert_eq!(n2, 6);
        assert_eq!(ress.src_buffer_loaded, 0);
    }

    #[test]
    fn truncated_frame_reports_premature_end() {
        let payload = vec![3u8; 200_000];
        let stream = compress(&payload);
        let cut = &stream[..stream.len() / 2];

        let mut prefs = Prefs::default();
        prefs.sparse_file_support = 0;
        let mut ress = DecompressResources::new(&mut prefs, None).unwrap();
        let mut dst = DstFile::Sink;
        let mut src: &[u8] = cut;
        let err = decompress_zstd_frame(
            &FileIoCtx::new(),
            &mut ress,
            &mut src,
            &prefs,
            "cut.zst",
            &mut dst,
            0,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn garbage_frame_reports_decoding_error() {
        let mut stream = zstd::ZSTD_MAGICNUMBER.to_le_bytes().to_vec();
        stream.extend_from_slice(&[0xFF; 40]);

        let mut prefs = Prefs::default();
        prefs.sparse_file_support = 0;
        let mut ress = DecompressResources::new(&mut prefs, None).unwrap();
        let mut dst = DstFile::Sink;
        let mut src: &[u8] = &stream;
        let err = decompress_zstd_frame(
            &FileIoCtx::new(),
            &mut ress,
            &mut src,
            &prefs,
            "bad.zst",
            &mut dst,
            0,
        )
        .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn skippable_frame_produces_zero_bytes() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&zstd::ZSTD_MAGIC_SKIPPABLE_START.to_le_bytes());
        stream.extend_from_slice(&8u32.to_le_bytes());
        stream.extend_from_slice(b"SKIPDATA");

        let (n, out) = decode_to_file(&stream);
        assert_eq!(n, 0);
        assert!(out.is_empty());
    }
}
