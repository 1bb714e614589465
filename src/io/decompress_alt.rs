//! gzip / xz / lzma / lz4 frame decoders for the demultiplexer.
//!
//! Each decoder conforms to the shared contract: consume one frame starting
//! at the magic bytes already loaded in the source buffer, write every
//! decoded byte through the sparse writer, and leave any unconsumed tail in
//! the shared buffer for the next dispatch iteration.

use std::io::{self, Read};

use crate::io::decompress_resources::{DecompressResources, SrcFeeder};
use crate::io::file_io::DstFile;
use crate::io::prefs::{display_level, display_update, Prefs};
use crate::io::sparse::{fwrite_sparse, fwrite_sparse_end};
use crate::util::human_size;

/// Drives a `Read`-style decoder over the shared destination buffer,
/// sparse-writing each chunk. Returns the decoded byte count.
fn drain_decoder(
    decoder: &mut dyn Read,
    dst_buffer: &mut [u8],
    dst: &mut DstFile,
    prefs: &Prefs,
) -> io::Result<u64> {
    let mut out_file_size: u64 = 0;
    let mut stored_skips: u64 = 0;
    loop {
        let n = match decoder.read(dst_buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        stored_skips = fwrite_sparse(dst, &dst_buffer[..n], prefs, stored_skips)?;
        out_file_size += n as u64;
        display_update(2, &format!("\rDecompressed : {}  ", human_size(out_file_size)));
    }
    fwrite_sparse_end(prefs, dst, stored_skips)?;
    Ok(out_file_size)
}

// ---------------------------------------------------------------------------
// gzip
// ---------------------------------------------------------------------------

/// Decodes one gzip member. Concatenated members come back through the
/// demultiplexer one at a time, so plain (single-member) decoding is used.
#[cfg(feature = "gzip")]
pub fn decompress_gz_frame(
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    src_file_name: &str,
    dst: &mut DstFile,
) -> io::Result<u64> {
    let DecompressResources {
        src_buffer,
        src_buffer_loaded,
        dst_buffer,
        ..
    } = ress;
    let feeder = SrcFeeder::new(src_buffer, src_buffer_loaded, src);
    let mut decoder = flate2::bufread::GzDecoder::new(feeder);

    let result = drain_decoder(&mut decoder, dst_buffer, dst, prefs);
    decoder.into_inner().finish();

    result.map_err(|e| {
        display_level(1, &format!("zstdr: {}: inflate error : {} \n", src_file_name, e));
        io::Error::new(e.kind(), format!("{}: gz decoding error : {}", src_file_name, e))
    })
}

// ---------------------------------------------------------------------------
// xz / lzma
// ---------------------------------------------------------------------------

/// Decodes one xz stream, or one lzma-alone stream when `plain_lzma` is set,
/// by driving liblzma directly over the shared buffers.
#[cfg(feature = "xz")]
pub fn decompress_lzma_frame(
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    src_file_name: &str,
    dst: &mut DstFile,
    plain_lzma: bool,
) -> io::Result<u64> {
    use xz2::stream::{Action, Status, Stream};

    let mut strm = if plain_lzma {
        Stream::new_lzma_decoder(u64::MAX)
    } else {
        Stream::new_stream_decoder(u64::MAX, 0)
    }
    .map_err(|e| {
        display_level(
            1,
            &format!(
                "zstdr: {}: {} error : {} \n",
                src_file_name,
                if plain_lzma { "lzma_alone_decoder" } else { "lzma_stream_decoder" },
                e
            ),
        );
        io::Error::other(format!("{}: lzma decoder init : {}", src_file_name, e))
    })?;

    let mut out_file_size: u64 = 0;
    let mut stored_skips: u64 = 0;
    let mut action = Action::Run;
    let mut in_pos = 0usize;

    loop {
        if in_pos == ress.src_buffer_loaded && matches!(action, Action::Run) {
            ress.src_buffer_loaded =
                super::file_io::read_to_capacity(src, &mut ress.src_buffer)?;
            in_pos = 0;
            if ress.src_buffer_loaded == 0 {
                action = Action::Finish;
            }
        }

        let before_in = strm.total_in();
        let before_out = strm.total_out();
        let status = {
            let DecompressResources {
                src_buffer,
                src_buffer_loaded,
                dst_buffer,
                ..
            } = ress;
            strm.process(&src_buffer[in_pos..*src_buffer_loaded], dst_buffer, action)
        }
        .map_err(|e| {
            display_level(
                1,
                &format!("zstdr: {}: lzma_code decoding error : {} \n", src_file_name, e),
            );
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{}: lzma decoding error : {}", src_file_name, e),
            )
        })?;
        in_pos += (strm.total_in() - before_in) as usize;
        let produced = (strm.total_out() - before_out) as usize;

        if produced > 0 {
            stored_skips = fwrite_sparse(dst, &ress.dst_buffer[..produced], prefs, stored_skips)?;
            out_file_size += produced as u64;
            display_update(2, &format!("\rDecompressed : {}  ", human_size(out_file_size)));
        }

        if matches!(status, Status::StreamEnd) {
            break;
        }
        if matches!(action, Action::Finish) && produced == 0 {
            display_level(1, &format!("zstdr: {}: premature lzma end \n", src_file_name));
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("{}: premature lzma end", src_file_name),
            ));
        }
    }

    // Preserve the unconsumed tail for the next dispatch iteration.
    let loaded = ress.src_buffer_loaded;
    if in_pos > 0 && in_pos < loaded {
        ress.src_buffer.copy_within(in_pos..loaded, 0);
    }
    ress.src_buffer_loaded = loaded - in_pos;

    fwrite_sparse_end(prefs, dst, stored_skips)?;
    Ok(out_file_size)
}

// ---------------------------------------------------------------------------
// lz4
// ---------------------------------------------------------------------------

/// Decodes one LZ4 frame.
#[cfg(feature = "lz4")]
pub fn decompress_lz4_frame(
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    src_file_name: &str,
    dst: &mut DstFile,
) -> io::Result<u64> {
    let DecompressResources {
        src_buffer,
        src_buffer_loaded,
        dst_buffer,
        ..
    } = ress;
    let feeder = SrcFeeder::new(src_buffer, src_buffer_loaded, src);
    let mut decoder = lz4_flex::frame::FrameDecoder::new(feeder);

    let result = drain_decoder(&mut decoder, dst_buffer, dst, prefs);
    decoder.into_inner().finish();

    result.map_err(|e| {
        display_level(
            1,
            &format!("zstdr: {}: lz4 decompression error : {} \n", src_file_name, e),
        );
        io::Error::new(
            e.kind(),
            format!("{}: lz4 decoding error : {}", src_file_name, e),
        )
    })
}

// ---------------------------------------------------------------------------
// Raw pass-through
// ---------------------------------------------------------------------------

/// Copies the source verbatim to `dst` (gzip `-df` compatibility): first the
/// bytes already loaded in the source buffer, then the rest of the stream,
/// all through the sparse writer.
pub fn pass_through(
    ress: &mut DecompressResources,
    src: &mut dyn Read,
    prefs: &Prefs,
    dst: &mut DstFile,
) -> io::Result<u64> {
    use std::io::Write;

    let block_size = (64 * 1024).min(ress.src_buffer.len());
    let mut total: u64 = ress.src_buffer_loaded as u64;
    let mut stored_skips: u64 = 0;

    dst.write_all(&ress.src_buffer[..ress.src_buffer_loaded])
        .map_err(|e| {
            display_level(1, &format!("Pass-through write error : {} \n", e));
            e
        })?;
    ress.src_buffer_loaded = 0;

    loop {
        let n = super::file_io::read_to_capacity(src, &mut ress.src_buffer[..block_size])?;
        if n == 0 {
            break;
        }
        stored_skips = fwrite_sparse(dst, &ress.src_buffer[..n], prefs, stored_skips)?;
        total += n as u64;
    }
    fwrite_sparse_end(prefs, dst, stored_skips)?;
    Ok(total)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
