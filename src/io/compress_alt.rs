//! gzip / xz / lzma / lz4 per-file compression loops.
//!
//! These share the batch's [`CompressResources`] buffers with the Zstandard
//! path, follow the same read → encode → write shape, and report progress
//! the same way. None of them participate in adaptive level control.

use std::io::{self, Read, Write};

use crate::io::compress_frame::CompressResources;
use crate::io::file_io::{read_to_capacity, DstFile};
use crate::io::prefs::display_update;

/// Counts bytes flowing into the destination so the per-file summary can
/// report the compressed size without asking the filesystem.
struct CountingWriter<'a> {
    inner: &'a mut DstFile,
    written: u64,
}

impl<'a> CountingWriter<'a> {
    fn new(inner: &'a mut DstFile) -> Self {
        CountingWriter { inner, written: 0 }
    }
}

impl Write for CountingWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

fn progress(in_size: u64, src_file_size: Option<u64>, out_size: u64) {
    let pct = out_size as f64 / in_size.max(1) as f64 * 100.0;
    match src_file_size {
        None => display_update(
            2,
            &format!("\rRead : {} MB ==> {:.2}%", in_size >> 20, pct),
        ),
        Some(total) => display_update(
            2,
            &format!(
                "\rRead : {} / {} MB ==> {:.2}%",
                in_size >> 20,
                total >> 20,
                pct
            ),
        ),
    }
}

// ---------------------------------------------------------------------------
// gzip
// ---------------------------------------------------------------------------

/// Compresses one stream to a gzip member via the deflate codec.
#[cfg(feature = "gzip")]
pub fn compress_gz_frame(
    ress: &mut CompressResources,
    src: &mut dyn Read,
    dst: &mut DstFile,
    src_file_name: &str,
    src_file_size: Option<u64>,
    compression_level: i32,
    readsize: &mut u64,
) -> io::Result<u64> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let level = compression_level.clamp(0, 9) as u32;
    let counter = CountingWriter::new(dst);
    let mut encoder = GzEncoder::new(counter, Compression::new(level));

    let mut in_file_size: u64 = 0;
    loop {
        let in_size = read_to_capacity(src, &mut ress.src_buffer)?;
        if in_size == 0 {
            break;
        }
        in_file_size += in_size as u64;
        encoder.write_all(&ress.src_buffer[..in_size]).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 72 : zstdr: {}: deflate error : {}", src_file_name, e),
            )
        })?;
        progress(in_file_size, src_file_size, encoder.get_ref().written);
    }

    let counter = encoder.finish().map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("error 79 : zstdr: {}: deflate end error : {}", src_file_name, e),
        )
    })?;
    *readsize = in_file_size;
    Ok(counter.written)
}

// ---------------------------------------------------------------------------
// xz / lzma
// ---------------------------------------------------------------------------

/// Compresses one stream with liblzma: `.xz` container, or the legacy
/// lzma-alone container when `plain_lzma` is set.
#[cfg(feature = "xz")]
#[allow(clippy::too_many_arguments)]
pub fn compress_lzma_frame(
    ress: &mut CompressResources,
    src: &mut dyn Read,
    dst: &mut DstFile,
    src_file_name: &str,
    src_file_size: Option<u64>,
    compression_level: i32,
    readsize: &mut u64,
    plain_lzma: bool,
) -> io::Result<u64> {
    use xz2::stream::{Action, Check, LzmaOptions, Status, Stream};

    let preset = compression_level.clamp(0, 9) as u32;
    let lzma_err = |stage: &str, e: xz2::stream::Error| {
        io::Error::other(format!("error 84 : zstdr: {}: {} error : {}", src_file_name, stage, e))
    };

    let mut strm = if plain_lzma {
        let opts = LzmaOptions::new_preset(preset).map_err(|e| lzma_err("lzma_preset", e))?;
        Stream::new_lzma_encoder(&opts).map_err(|e| lzma_err("lzma_alone_encoder", e))?
    } else {
        Stream::new_easy_encoder(preset, Check::Crc64).map_err(|e| lzma_err("lzma_easy_encoder", e))?
    };

    let mut in_file_size: u64 = 0;
    let mut out_file_size: u64 = 0;
    let mut action = Action::Run;
    let mut in_len = 0usize;
    let mut in_pos = 0usize;

    loop {
        if in_pos == in_len && matches!(action, Action::Run) {
            in_len = read_to_capacity(src, &mut ress.src_buffer)?;
            in_pos = 0;
            if in_len == 0 {
                action = Action::Finish;
            }
            in_file_size += in_len as u64;
        }

        let before_in = strm.total_in();
        let before_out = strm.total_out();
        let status = strm
            .process(&ress.src_buffer[in_pos..in_len], &mut ress.dst_buffer, action)
            .map_err(|e| lzma_err("lzma_code", e))?;
        in_pos += (strm.total_in() - before_in) as usize;
        let produced = (strm.total_out() - before_out) as usize;

        if produced > 0 {
            dst.write_all(&ress.dst_buffer[..produced]).map_err(|e| {
                io::Error::new(e.kind(), format!("error 85 : Write error : {}", e))
            })?;
            out_file_size += produced as u64;
        }
        progress(in_file_size, src_file_size, out_file_size);

        if matches!(status, Status::StreamEnd) {
            break;
        }
    }

    *readsize = in_file_size;
    Ok(out_file_size)
}

// ---------------------------------------------------------------------------
// lz4
// ---------------------------------------------------------------------------

/// Compresses one stream to an LZ4 frame (64 KiB linked blocks).
#[cfg(feature = "lz4")]
pub fn compress_lz4_frame(
    ress: &mut CompressResources,
    src: &mut dyn Read,
    dst: &mut DstFile,
    src_file_name: &str,
    src_file_size: Option<u64>,
    checksum_flag: bool,
    readsize: &mut u64,
) -> io::Result<u64> {
    use lz4_flex::frame::{BlockMode, BlockSize, FrameEncoder, FrameInfo};

    let info = FrameInfo::new()
        .block_size(BlockSize::Max64KB)
        .block_mode(BlockMode::Linked)
        .content_checksum(checksum_flag);
    let counter = CountingWriter::new(dst);
    let mut encoder = FrameEncoder::with_frame_info(info, counter);

    let mut in_file_size: u64 = 0;
    loop {
        let in_size = read_to_capacity(src, &mut ress.src_buffer)?;
        if in_size == 0 {
            break;
        }
        in_file_size += in_size as u64;
        encoder.write_all(&ress.src_buffer[..in_size]).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 35 : zstdr: {}: lz4 compression failed : {}", src_file_name, e),
            )
        })?;
        match src_file_size {
            None => display_update(2, &format!("\rRead : {} MB ", in_file_size >> 20)),
            Some(total) => display_update(
                2,
                &format!("\rRead : {} / {} MB ", in_file_size >> 20, total >> 20),
            ),
        }
    }

    let counter = encoder.finish().map_err(|e| {
        io::Error::other(format!(
            "error 38 : zstdr: {}: lz4 end of frame generation failed : {}",
            src_file_name, e
        ))
    })?;
    *readsize = in_file_size;
    Ok(counter.written)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::prefs::Prefs;

    fn resources() -> CompressResources {
        let mut prefs = Prefs::default();
        CompressResources::new(&mut prefs, None, None, 3).unwrap()
    }

    fn dst_pair() -> (DstFile, std::fs::File) {
        let f = tempfile::tempfile().unwrap();
        let check = f.try_clone().unwrap();
        (DstFile::Regular(f), check)
    }

    fn read_back(mut f: std::fs::File) -> Vec<u8> {
        use std::io::{Read, Seek, SeekFrom};
        f.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        f.read_to_end(&mut out).unwrap();
        out
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn gz_frame_round_trips() {
        let mut ress = resources();
        let payload = b"gzip path through the shared resources".repeat(50);
        let mut src: &[u8] = &payload;
        let (mut dst, check) = dst_pair();
        let mut readsize = 0;
        let out_size =
            compress_gz_frame(&mut ress, &mut src, &mut dst, "t.gz", None, 6, &mut readsize)
                .unwrap();
        assert_eq!(readsize, payload.len() as u64);
        let bytes = read_back(check);
        assert_eq!(out_size, bytes.len() as u64);
        assert_eq!(&bytes[..2], &[0x1F, 0x8B]);

        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, payload);
    }

    #[cfg(feature = "xz")]
    #[test]
    fn xz_frame_round_trips() {
        let mut ress = resources();
        let payload = b"xz path with explicit stream driving".repeat(50);
        let mut src: &[u8] = &payload;
        let (mut dst, check) = dst_pair();
        let mut readsize = 0;
        compress_lzma_frame(
            &mut ress, &mut src, &mut dst, "t.xz", None, 6, &mut readsize, false,
        )
        .unwrap();
        let bytes = read_back(check);
        assert_eq!(&bytes[..2], &[0xFD, 0x37]);

        let mut decoder = xz2::read::XzDecoder::new(&bytes[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, payload);
    }

    #[cfg(feature = "xz")]
    #[test]
    fn lzma_alone_frame_round_trips() {
        let mut ress = resources();
        let payload = b"legacy lzma alone container".repeat(20);
        let mut src: &[u8] = &payload;
        let (mut dst, check) = dst_pair();
        let mut readsize = 0;
        compress_lzma_frame(
            &mut ress, &mut src, &mut dst, "t.lzma", None, 6, &mut readsize, true,
        )
        .unwrap();
        let bytes = read_back(check);
        assert_eq!(bytes[0], 0x5D);

        let strm = xz2::stream::Stream::new_lzma_decoder(u64::MAX).unwrap();
        let mut decoder = xz2::read::XzDecoder::new_stream(&bytes[..], strm);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, payload);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn lz4_frame_round_trips() {
        let mut ress = resources();
        let payload = b"lz4 frame with linked blocks".repeat(50);
        let mut src: &[u8] = &payload;
        let (mut dst, check) = dst_pair();
        let mut readsize = 0;
        compress_lz4_frame(&mut ress, &mut src, &mut dst, "t.lz4", None, true, &mut readsize)
            .unwrap();
        let bytes = read_back(check);
        assert_eq!(&bytes[..4], &0x184D2204u32.to_le_bytes());

        let mut decoder = lz4_flex::frame::FrameDecoder::new(&bytes[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert_eq!(plain, payload);
    }

    #[cfg(feature = "gzip")]
    #[test]
    fn empty_input_still_emits_a_valid_member() {
        let mut ress = resources();
        let mut src: &[u8] = b"";
        let (mut dst, check) = dst_pair();
        let mut readsize = 0;
        compress_gz_frame(&mut ress, &mut src, &mut dst, "e.gz", Some(0), 6, &mut readsize)
            .unwrap();
        assert_eq!(readsize, 0);
        let bytes = read_back(check);
        let mut decoder = flate2::read::GzDecoder::new(&bytes[..]);
        let mut plain = Vec::new();
        decoder.read_to_end(&mut plain).unwrap();
        assert!(plain.is_empty());
    }
}
