//! Decompression context, shared buffers, and the source-feeder adapter.
//!
//! [`DecompressResources`] owns the streaming decode context and a source
//! buffer with a *loaded byte count*: a high-water mark that survives across
//! frames so the demultiplexer's magic-byte probe is never lost between
//! decoders.
//!
//! [`SrcFeeder`] exposes that buffer plus the underlying reader as a
//! [`BufRead`], letting decoders that consume a `Read` (gzip, lz4) draw from
//! the shared buffer first; whatever they leave unconsumed is compacted back
//! to offset 0 so the next dispatch iteration sees it.

use std::io::{self, BufRead, Read};
use std::path::Path;

use crate::io::file_io::load_dict_buffer;
use crate::io::prefs::{Prefs, GB};
use crate::util::get_file_size;
use crate::zstd::{self, DCtx, DParam};

/// Smallest power of two not below `v`, as a log2.
fn ceil_log2(v: u64) -> u32 {
    64 - v.saturating_sub(1).leading_zeros()
}

/// Raises the decompression memory limit so a patch-from dictionary fits in
/// the window.
pub(crate) fn adjust_mem_limit_for_patch_from(
    prefs: &mut Prefs,
    dict_size: u64,
) -> io::Result<()> {
    let max_size = (prefs.mem_limit as u64).max(dict_size);
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

/// Decompression resources allocated once per batch and reused across files.
pub struct DecompressResources {
    pub dctx: DCtx,
    /// Source buffer sized by the codec's recommended streaming input size.
    pub src_buffer: Vec<u8>,
    /// Bytes currently valid at the front of `src_buffer`. Survives across
    /// frames; reset to 0 when a new source file opens.
    pub src_buffer_loaded: usize,
    /// Destination buffer sized by the codec's recommended output size.
    pub dst_buffer: Vec<u8>,
}

impl DecompressResources {
    pub fn new(prefs: &mut Prefs, dict_file_name: Option<&str>) -> io::Result<Self> {
        if prefs.patch_from_mode {
            let dict_size = dict_file_name
                .and_then(|n| get_file_size(Path::new(n)))
                .unwrap_or(0);
            adjust_mem_limit_for_patch_from(prefs, dict_size)?;
        }

        let mut dctx = DCtx::try_new()
            .ok_or_else(|| io::Error::other("error 60 : can't create decompression context"))?;

        let zerr = |e: zstd::ZstdError| io::Error::other(format!("error 61 : {}", e));
        if prefs.mem_limit > 0 {
            dctx.set_parameter(DParam::WindowLogMax(ceil_log2(prefs.mem_limit as u64)))
                .map_err(zerr)?;
        }
        dctx.set_parameter(DParam::ForceIgnoreChecksum(!prefs.checksum_flag))
            .map_err(zerr)?;

        let dict_buffer = load_dict_buffer(prefs, dict_file_name)?;
        if !dict_buffer.is_empty() {
            dctx.load_dictionary(&dict_buffer).map_err(zerr)?;
        }

        Ok(DecompressResources {
            dctx,
            src_buffer: vec![0u8; zstd::dstream_in_size()],
            src_buffer_loaded: 0,
            dst_buffer: vec![0u8; zstd::dstream_out_size()],
        })
    }
}

// ---------------------------------------------------------------------------
// SrcFeeder
// ---------------------------------------------------------------------------

/// Serves already-loaded bytes from the shared source buffer, then tops up
/// from the underlying reader — refilling through the same buffer so any
/// unconsumed tail stays available to the demultiplexer.
///
/// Call [`finish`](Self::finish) when the decoder is done: leftovers are
/// moved to offset 0 and the loaded count updated.
pub struct SrcFeeder<'a> {
    buf: &'a mut [u8],
    loaded: &'a mut usize,
    pos: usize,
    src: &'a mut dyn Read,
}

impl<'a> SrcFeeder<'a> {
    pub fn new(buf: &'a mut [u8], loaded: &'a mut usize, src: &'a mut dyn Read) -> Self {
        debug_assert!(*loaded <= buf.len());
        SrcFeeder {
            buf,
            loaded,
            pos: 0,
            src,
        }
    }

    /// Compacts unconsumed bytes to the front of the shared buffer.
    pub fn finish(self) {
        let pos = self.pos;
        let loaded = *self.loaded;
        if pos > 0 {
            self.buf.copy_within(pos..loaded, 0);
            *self.loaded = loaded - pos;
        }
    }
}

impl BufRead for SrcFeeder<'_> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos == *self.loaded {
            self.pos = 0;
            *self.loaded = loop {
                match self.src.read(self.buf) {
                    Ok(n) => break n,
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                    Err(e) => return Err(e),
                }
            };
        }
        Ok(&self.buf[self.pos..*self.loaded])
    }

    fn consume(&mut self, amt: usize) {
        self.pos = (self.pos + amt).min(*self.loaded);
    }
}

impl Read for SrcFeeder<'_> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let n = available.len().min(out.len());
        out[..n].copy_from_slice(&available[..n]);
        self.consume(n);
        Ok(n)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resources_allocate_recommended_buffers() {
        let mut prefs = Prefs::default();
        let ress = DecompressResources::new(&mut prefs, None).unwrap();
        assert_eq!(ress.src_buffer.len(), zstd::dstream_in_size());
        assert_eq!(ress.dst_buffer.len(), zstd::dstream_out_size());
        assert_eq!(ress.src_buffer_loaded, 0);
    }

    #[test]
    fn feeder_serves_loaded_bytes_before_reader() {
        let mut buf = vec![0u8; 16];
        buf[..4].copy_from_slice(b"HEAD");
        let mut loaded = 4usize;
        let mut tail: &[u8] = b"TAIL";
        let mut feeder = SrcFeeder::new(&mut buf, &mut loaded, &mut tail);

        let mut out = Vec::new();
        feeder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"HEADTAIL");
    }

    #[test]
    fn feeder_finish_compacts_leftovers() {
        let mut buf = vec![0u8; 16];
        buf[..8].copy_from_slice(b"ABCDEFGH");
        let mut loaded = 8usize;
        let mut empty: &[u8] = b"";
        let mut feeder = SrcFeeder::new(&mut buf, &mut loaded, &mut empty);

        let mut head = [0u8; 3];
        feeder.read_exact(&mut head).unwrap();
        assert_eq!(&head, b"ABC");
        feeder.finish();

        assert_eq!(loaded, 5);
        assert_eq!(&buf[..5], b"DEFGH");
    }

    #[test]
    fn feeder_refills_through_shared_buffer() {
        let mut buf = vec![0u8; 4];
        let mut loaded = 0usize;
        let mut src: &[u8] = b"0123456789";
        let mut feeder = SrcFeeder::new(&mut buf, &mut loaded, &mut src);

        let mut out = Vec::new();
        feeder.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"0123456789");
    }

    #[test]
    fn feeder_finish_without_consumption_keeps_everything() {
        let mut buf = vec![0u8; 8];
        buf[..4].copy_from_slice(b"KEEP");
        let mut loaded = 4usize;
        let mut empty: &[u8] = b"";
        let feeder = SrcFeeder::new(&mut buf, &mut loaded, &mut empty);
        feeder.finish();
        assert_eq!(loaded, 4);
        assert_eq!(&buf[..4], b"KEEP");
    }

    #[test]
    fn mem_limit_raised_for_patch_from() {
        let mut prefs = Prefs::default();
        prefs.patch_from_mode = true;
        prefs.mem_limit = 1024;
        adjust_mem_limit_for_patch_from(&mut prefs, 1 << 20).unwrap();
        assert_eq!(prefs.mem_limit, 1 << 20);
    }

    #[test]
    fn ceil_log2_values() {
        assert_eq!(ceil_log2(1), 0);
        assert_eq!(ceil_log2(2), 1);
        assert_eq!(ceil_log2(3), 2);
        assert_eq!(ceil_log2(1 << 20), 20);
        assert_eq!(ceil_log2((1 << 20) + 1), 21);
    }
}
