//! `--list`: Zstandard frame inspection without payload decoding.
//!
//! Walks a compressed file frame by frame: parses each frame header, then
//! hops over the blocks using only the 3-byte block headers, accumulating
//! sizes and counts. Skippable frames are skipped via their length field.
//! A file terminates cleanly only when EOF coincides with the stat-reported
//! size; anything else is reported as truncated.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};

use crate::io::file_io::{read_to_capacity, STDIN_MARK};
use crate::io::prefs::{display_level, notification_level};
use crate::util::{get_open_file_size, human_size};
use crate::zstd::{
    self, ContentSize, FRAMEHEADERSIZE_MAX, FRAMEHEADERSIZE_MIN, ZSTD_MAGICNUMBER,
};

// ---------------------------------------------------------------------------
// Frame-header parsing
// ---------------------------------------------------------------------------

/// The fixed-layout fields of a Zstandard frame header.
pub(crate) struct ParsedFrameHeader {
    /// Total header size including the 4-byte magic.
    pub header_size: usize,
    pub window_size: u64,
    pub has_checksum: bool,
}

/// Decodes the frame-header descriptor and window descriptor from `buf`
/// (which must start at the frame magic). Returns `None` on truncated or
/// reserved-bit-violating input.
pub(crate) fn parse_frame_header(buf: &[u8]) -> Option<ParsedFrameHeader> {
    if buf.len() < FRAMEHEADERSIZE_MIN {
        return None;
    }
    let fhd = buf[4];
    let dict_id_flag = (fhd & 3) as usize;
    let has_checksum = (fhd >> 2) & 1 == 1;
    if (fhd >> 3) & 1 == 1 {
        // Reserved bit set: not a valid frame header.
        return None;
    }
    let single_segment = (fhd >> 5) & 1 == 1;
    let fcs_flag = (fhd >> 6) as usize;

    let dict_id_size = [0usize, 1, 2, 4][dict_id_flag];
    let fcs_size = match fcs_flag {
        0 => usize::from(single_segment),
        1 => 2,
        2 => 4,
        _ => 8,
    };
    let window_descriptor_size = usize::from(!single_segment);
    let header_size = 4 + 1 + window_descriptor_size + dict_id_size + fcs_size;
    if buf.len() < header_size {
        return None;
    }

    let window_size = if single_segment {
        // No window descriptor: the window is the full content size.
        let fcs_off = 5 + dict_id_size;
        match fcs_size {
            1 => buf[fcs_off] as u64,
            2 => u16::from_le_bytes(buf[fcs_off..fcs_off + 2].try_into().unwrap()) as u64 + 256,
            4 => u32::from_le_bytes(buf[fcs_off..fcs_off + 4].try_into().unwrap()) as u64,
            _ => u64::from_le_bytes(buf[fcs_off..fcs_off + 8].try_into().unwrap()),
        }
    } else {
        let wd = buf[5];
        let exponent = (wd >> 3) as u64;
        let mantissa = (wd & 7) as u64;
        let window_base = 1u64 << (10 + exponent);
        window_base + (window_base / 8) * mantissa
    };

    Some(ParsedFrameHeader {
        header_size,
        window_size,
        has_checksum,
    })
}

// ---------------------------------------------------------------------------
// Per-file info
// ---------------------------------------------------------------------------

/// Accumulated metadata for one compressed file (or a running total).
#[derive(Clone, Copy, Debug, Default)]
pub struct FileInfo {
    pub decompressed_size: u64,
    pub compressed_size: u64,
    pub window_size: u64,
    pub num_actual_frames: u32,
    pub num_skippable_frames: u32,
    /// Set when any frame omits its content size.
    pub decomp_unavailable: bool,
    /// AND across frames: every frame carries a content checksum.
    pub uses_check: bool,
    pub nb_files: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoError {
    FrameError,
    NotZstd,
    FileError,
    TruncatedInput,
}

fn frame_error(msg: &str) -> InfoError {
    display_level(1, &format!("{} \n", msg));
    InfoError::FrameError
}

/// Walks every frame of `src_file`, accumulating counts into `info`.
fn analyze_frames(info: &mut FileInfo, src_file: &mut File) -> Result<(), InfoError> {
    let mut uses_check = true;
    loop {
        let mut header = [0u8; FRAMEHEADERSIZE_MAX];
        let num_read =
            read_to_capacity(src_file, &mut header).map_err(|_| InfoError::FrameError)?;
        if num_read < FRAMEHEADERSIZE_MIN {
            if num_read == 0 && info.compressed_size > 0 {
                let position = src_file
                    .stream_position()
                    .map_err(|_| InfoError::FrameError)?;
                if position != info.compressed_size {
                    display_level(
                        1,
                        &format!(
                            "Error: seeked to position {}, which is beyond file size of {} \n",
                            position, info.compressed_size
                        ),
                    );
                    return Err(InfoError::TruncatedInput);
                }
                break; // clean end of file
            }
            display_level(1, "Error: reached end of file with incomplete frame \n");
            return Err(InfoError::NotZstd);
        }

        let magic = u32::from_le_bytes(header[..4].try_into().unwrap());
        if magic == ZSTD_MAGICNUMBER {
            match zstd::get_frame_content_size(&header[..num_read]) {
                ContentSize::Known(size) => info.decompressed_size += size,
                ContentSize::Unknown | ContentSize::Error => info.decomp_unavailable = true,
            }
            let fh = parse_frame_header(&header[..num_read])
                .ok_or_else(|| frame_error("Error: could not decode frame header"))?;
            info.window_size = fh.window_size;
            if !fh.has_checksum {
                uses_check = false;
            }
            // Move to the end of the frame header.
            src_file
                .seek(SeekFrom::Current(fh.header_size as i64 - num_read as i64))
                .map_err(|_| frame_error("Error: could not move to end of frame header"))?;

            // Hop over every block in the frame.
            loop {
                let mut block_header = [0u8; 3];
                src_file
                    .read_exact(&mut block_header)
                    .map_err(|_| frame_error("Error while reading block header"))?;
                let bh = u32::from_le_bytes([
                    block_header[0],
                    block_header[1],
                    block_header[2],
                    0,
                ]);
                let last_block = bh & 1 == 1;
                let block_type = (bh >> 1) & 3;
                if block_type == 3 {
                    return Err(frame_error("Error: unsupported block type"));
                }
                // An RLE block stores a single byte whatever its regenerated
                // size says.
                let block_size = if block_type == 1 { 1 } else { (bh >> 3) as i64 };
                src_file
                    .seek(SeekFrom::Current(block_size))
                    .map_err(|_| frame_error("Error: could not skip to end of block"))?;
                if last_block {
                    break;
                }
            }

            if fh.has_checksum {
                src_file
                    .seek(SeekFrom::Current(4))
                    .map_err(|_| frame_error("Error: could not skip past checksum"))?;
            }
            info.num_actual_frames += 1;
        } else if zstd::is_skippable_magic(magic) {
            let frame_size = u32::from_le_bytes(header[4..8].try_into().unwrap());
            let seek = 8 + frame_size as i64 - num_read as i64;
            src_file
                .seek(SeekFrom::Current(seek))
                .map_err(|_| frame_error("Error: could not find end of skippable frame"))?;
            info.num_skippable_frames += 1;
        } else {
            return Err(InfoError::NotZstd);
        }
    }
    info.uses_check = uses_check && info.num_actual_frames > 0;
    Ok(())
}

/// Reads the frame structure of `in_file_name` into a fresh [`FileInfo`].
pub fn get_file_info(in_file_name: &str) -> Result<FileInfo, InfoError> {
    let mut src_file = match File::open(in_file_name) {
        Ok(f) => f,
        Err(_) => {
            display_level(
                1,
                &format!("Error: could not open source file {} \n", in_file_name),
            );
            return Err(InfoError::FileError);
        }
    };
    if !fs::metadata(in_file_name)
        .map(|m| m.file_type().is_file())
        .unwrap_or(false)
    {
        display_level(1, &format!("Error : {} is not a file \n", in_file_name));
        return Err(InfoError::FileError);
    }

    let mut info = FileInfo {
        compressed_size: get_open_file_size(&src_file).unwrap_or(0),
        nb_files: 1,
        ..FileInfo::default()
    };
    analyze_frames(&mut info, &mut src_file).map(|()| info)
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

fn display_info(in_file_name: &str, info: &FileInfo) {
    let check_string = if info.uses_check { "XXH64" } else { "None" };
    let ratio = if info.compressed_size == 0 {
        0.0
    } else {
        info.decompressed_size as f64 / info.compressed_size as f64
    };
    if notification_level() <= 2 {
        if !info.decomp_unavailable {
            println!(
                "{:>6}  {:>5}  {:>10}  {:>12}  {:>5.3}  {:>5}  {}",
                info.num_skippable_frames + info.num_actual_frames,
                info.num_skippable_frames,
                human_size(info.compressed_size).to_string(),
                human_size(info.decompressed_size).to_string(),
                ratio,
                check_string,
                in_file_name
            );
        } else {
            println!(
                "{:>6}  {:>5}  {:>10}  {:>12}  {:>5}  {:>5}  {}",
                info.num_skippable_frames + info.num_actual_frames,
                info.num_skippable_frames,
                human_size(info.compressed_size).to_string(),
                "",
                "",
                check_string,
                in_file_name
            );
        }
    } else {
        println!("{} ", in_file_name);
        println!("# Zstandard Frames: {}", info.num_actual_frames);
        if info.num_skippable_frames > 0 {
            println!("# Skippable Frames: {}", info.num_skippable_frames);
        }
        println!(
            "Window Size: {} ({} B)",
            human_size(info.window_size),
            info.window_size
        );
        println!(
            "Compressed Size: {} ({} B)",
            human_size(info.compressed_size),
            info.compressed_size
        );
        if !info.decomp_unavailable {
            println!(
                "Decompressed Size: {} ({} B)",
                human_size(info.decompressed_size),
                info.decompressed_size
            );
            println!("Ratio: {:.4}", ratio);
        }
        println!("Check: {}", check_string);
        println!();
    }
}

fn add_file_info(total: &FileInfo, item: &FileInfo) -> FileInfo {
    FileInfo {
        num_actual_frames: total.num_actual_frames + item.num_actual_frames,
        num_skippable_frames: total.num_skippable_frames + item.num_skippable_frames,
        compressed_size: total.compressed_size + item.compressed_size,
        decompressed_size: total.decompressed_size + item.decompressed_size,
        window_size: total.window_size.max(item.window_size),
        decomp_unavailable: total.decomp_unavailable | item.decomp_unavailable,
        uses_check: total.uses_check & item.uses_check,
        nb_files: total.nb_files + item.nb_files,
    }
}

fn list_file(total: &mut FileInfo, in_file_name: &str) -> bool {
    match get_file_info(in_file_name) {
        Ok(info) => {
            display_info(in_file_name, &info);
            *total = add_file_info(total, &info);
            false
        }
        Err(InfoError::FrameError) => {
            display_level(1, &format!("Error while parsing \"{}\" \n", in_file_name));
            true
        }
        Err(InfoError::NotZstd) => {
            println!("File \"{}\" not compressed by zstd ", in_file_name);
            if notification_level() > 2 {
                println!();
            }
            true
        }
        Err(InfoError::FileError) => {
            if notification_level() > 2 {
                println!();
            }
            true
        }
        Err(InfoError::TruncatedInput) => {
            println!("File \"{}\" is truncated ", in_file_name);
            if notification_level() > 2 {
                println!();
            }
            true
        }
    }
}

/// Lists every file in `file_names`, printing a header row, a per-file line
/// (or a detailed record at higher verbosity), and totals for multi-file
/// runs. Returns the number of files that could not be listed.
pub fn list_multiple_files(file_names: &[&str]) -> io::Result<usize> {
    for name in file_names {
        if *name == STDIN_MARK {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "zstdr: --list does not support reading from standard input",
            ));
        }
    }
    if file_names.is_empty() {
        display_level(1, "No files given \n");
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "no files given"));
    }

    if notification_level() <= 2 {
        println!("Frames  Skips  Compressed  Uncompressed  Ratio  Check  Filename");
    }

    let mut errors = 0usize;
    let mut total = FileInfo {
        uses_check: true,
        ..FileInfo::default()
    };
    for name in file_names {
        if list_file(&mut total, name) {
            errors += 1;
        }
    }

    if file_names.len() > 1 && notification_level() <= 2 {
        let check_string = if total.uses_check { "XXH64" } else { "" };
        println!("----------------------------------------------------------------- ");
        if total.decomp_unavailable {
            println!(
                "{:>6}  {:>5}  {:>10}  {:>12}  {:>5}  {:>5}  {} files",
                total.num_skippable_frames + total.num_actual_frames,
                total.num_skippable_frames,
                human_size(total.compressed_size).to_string(),
                "",
                "",
                check_string,
                total.nb_files
            );
        } else {
            let ratio = if total.compressed_size == 0 {
                0.0
            } else {
                total.decompressed_size as f64 / total.compressed_size as f64
            };
            println!(
                "{:>6}  {:>5}  {:>10}  {:>12}  {:>5.3}  {:>5}  {} files",
                total.num_skippable_frames + total.num_actual_frames,
                total.num_skippable_frames,
                human_size(total.compressed_size).to_string(),
                human_size(total.decompressed_size).to_string(),
                ratio,
                check_string,
                total.nb_files
            );
        }
    }

    Ok(errors)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn compress(data: &[u8], level: i32, checksum: bool) -> Vec<u8> {
        use crate::zstd::{CCtx, CParam, Directive};
        let mut cctx = CCtx::try_new().unwrap();
        cctx.set_parameter(CParam::CompressionLevel(level)).unwrap();
        cctx.set_parameter(CParam::ChecksumFlag(checksum)).unwrap();
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

    fn skippable_frame(payload: &[u8]) -> Vec<u8> {
        let mut f = Vec::new();
        f.extend_from_slice(&zstd::ZSTD_MAGIC_SKIPPABLE_START.to_le_bytes());
        f.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        f.extend_from_slice(payload);
        f
    }

    #[test]
    fn parse_header_of_real_frame() {
        let frame = compress(&[0x42; 4096], 3, true);
        let fh = parse_frame_header(&frame).expect("header must parse");
        assert!(fh.has_checksum);
        assert!(fh.header_size >= FRAMEHEADERSIZE_MIN);
        assert!(fh.window_size >= 1024);
    }

    #[test]
    fn single_file_with_known_size() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("one.zst");
        std::fs::write(&p, compress(&vec![7u8; 100], 3, true)).unwrap();
        let info = get_file_info(p.to_str().unwrap()).unwrap();
        assert_eq!(info.num_actual_frames, 1);
        assert_eq!(info.num_skippable_frames, 0);
        assert_eq!(info.decompressed_size, 100);
        assert!(!info.decomp_unavailable);
        assert!(info.uses_check);
    }

    #[test]
    fn two_frames_sum_content_sizes() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("two.zst");
        let mut f = File::create(&p).unwrap();
        f.write_all(&compress(&vec![1u8; 100], 3, true)).unwrap();
        f.write_all(&compress(&vec![2u8; 50], 3, true)).unwrap();
        drop(f);
        let info = get_file_info(p.to_str().unwrap()).unwrap();
        assert_eq!(info.num_actual_frames, 2);
        assert_eq!(info.decompressed_size, 150);
    }

    /// Streaming frames without a pledged size omit the content size field.
    fn compress_unknown_size(data: &[u8]) -> Vec<u8> {
        use crate::zstd::{CCtx, CParam, Directive};
        let mut cctx = CCtx::try_new().unwrap();
        cctx.set_parameter(CParam::CompressionLevel(3)).unwrap();
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

    #[test]
    fn unknown_content_size_sets_decomp_unavailable() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("mixed.zst");
        let mut f = File::create(&p).unwrap();
        f.write_all(&compress(&vec![1u8; 100], 3, true)).unwrap();
        f.write_all(&compress_unknown_size(&vec![2u8; 50])).unwrap();
        drop(f);
        let info = get_file_info(p.to_str().unwrap()).unwrap();
        assert_eq!(info.num_actual_frames, 2);
        assert!(info.decomp_unavailable);
    }

    #[test]
    fn skippable_frames_are_counted() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("skip.zst");
        let mut bytes = skippable_frame(b"metadata here");
        bytes.extend_from_slice(&compress(b"payload", 3, true));
        std::fs::write(&p, bytes).unwrap();
        let info = get_file_info(p.to_str().unwrap()).unwrap();
        assert_eq!(info.num_skippable_frames, 1);
        assert_eq!(info.num_actual_frames, 1);
    }

    #[test]
    fn no_checksum_frame_clears_uses_check() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("nocheck.zst");
        std::fs::write(&p, compress(b"data", 3, false)).unwrap();
        let info = get_file_info(p.to_str().unwrap()).unwrap();
        assert!(!info.uses_check);
    }

    #[test]
    fn non_zstd_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("plain.txt");
        std::fs::write(&p, b"this is not compressed at all, promise").unwrap();
        assert_eq!(
            get_file_info(p.to_str().unwrap()).unwrap_err(),
            InfoError::NotZstd
        );
    }

    #[test]
    fn truncated_file_is_detected() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("trunc.zst");
        let full = compress(&vec![9u8; 100_000], 3, true);
        std::fs::write(&p, &full[..full.len() - 10]).unwrap();
        let err = get_file_info(p.to_str().unwrap()).unwrap_err();
        assert!(
            err == InfoError::TruncatedInput || err == InfoError::FrameError,
            "unexpected: {err:?}"
        );
    }

    #[test]
    fn missing_file_is_a_file_error() {
        assert_eq!(
            get_file_info("/no/such/file.zst").unwrap_err(),
            InfoError::FileError
        );
    }

    #[test]
    fn list_refuses_stdin() {
        assert!(list_multiple_files(&[STDIN_MARK]).is_err());
    }

    #[test]
    fn list_counts_errors_per_file() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.zst");
        std::fs::write(&good, compress(b"fine", 3, true)).unwrap();
        let bad = dir.path().join("bad.zst");
        std::fs::write(&bad, b"garbage").unwrap();
        let errors =
            list_multiple_files(&[good.to_str().unwrap(), bad.to_str().unwrap()]).unwrap();
        assert_eq!(errors, 1);
    }
}
