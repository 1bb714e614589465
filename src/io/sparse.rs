//! Sparse file writes.
//!
//! [`fwrite_sparse`] scans decompressed output for runs of zero bytes and
//! advances the destination's file position instead of writing them, creating
//! holes on filesystems that support them. The pending skip distance is
//! returned to the caller, threaded through every call of one file, and
//! finally handed to [`fwrite_sparse_end`], which materialises the last byte
//! so the logical EOF is correct (a trailing seek alone does not extend a
//! file).

use std::io::{self, Write};
use std::mem;

use crate::io::file_io::DstFile;
use crate::io::prefs::Prefs;

/// Upper bound for pending skips before an interim seek is issued, keeping
/// the counter far from overflow.
const SKIP_FLUSH_THRESHOLD: u64 = 1 << 30;

/// Size of a native word in bytes; zero scanning works on word lanes.
const WORD: usize = mem::size_of::<usize>();

/// Zero-scan segment size in bytes (checked every 32 KiB).
pub const SPARSE_SEGMENT_SIZE: usize = 32 * 1024;

/// Writes `buf` to `file`, eliding leading-zero runs as seeks.
///
/// Returns the updated pending-skip counter, which the caller must pass back
/// on the next call and ultimately hand to [`fwrite_sparse_end`]. In test
/// mode nothing is written and the counter stays 0; with sparse support off
/// the buffer is written verbatim.
pub fn fwrite_sparse(
    file: &mut DstFile,
    buf: &[u8],
    prefs: &Prefs,
    stored_skips: u64,
) -> io::Result<u64> {
    if prefs.test_mode {
        return Ok(0);
    }

    if prefs.sparse_file_support == 0 {
        // Normal write.
        file.write_all(buf).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 70 : Write error : cannot write decoded block : {}", e),
            )
        })?;
        return Ok(0);
    }

    let mut stored_skips = stored_skips;

    if stored_skips > SKIP_FLUSH_THRESHOLD {
        file.seek_cur(SKIP_FLUSH_THRESHOLD as i64)
            .map_err(|_| io::Error::other("error 91 : 1 GB skip error (sparse file support)"))?;
        stored_skips -= SKIP_FLUSH_THRESHOLD;
    }

    let seg_words = SPARSE_SEGMENT_SIZE / WORD;
    let total_words = buf.len() / WORD;
    let mut word_pos = 0usize;

    // Word-aligned portion, one segment at a time.
    while word_pos < total_words {
        let seg = seg_words.min(total_words - word_pos);

        // Count leading zero words in this segment.
        let mut nb_zero_words = 0usize;
        while nb_zero_words < seg {
            let start = (word_pos + nb_zero_words) * WORD;
            let word = usize::from_ne_bytes(buf[start..start + WORD].try_into().unwrap());
            if word != 0 {
                break;
            }
            nb_zero_words += 1;
        }
        stored_skips += (nb_zero_words * WORD) as u64;

        if nb_zero_words != seg {
            // Segment contains data: materialise the accumulated hole, then
            // write from the first non-zero word to the segment end.
            file.seek_cur(stored_skips as i64)
                .map_err(|_| io::Error::other("error 92 : Sparse skip error ; try --no-sparse"))?;
            stored_skips = 0;
            let write_start = (word_pos + nb_zero_words) * WORD;
            let write_end = (word_pos + seg) * WORD;
            file.write_all(&buf[write_start..write_end]).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!("error 93 : Write error : cannot write decoded block : {}", e),
                )
            })?;
        }
        word_pos += seg;
    }

    // Trailing bytes that do not fill a word; implies end of block.
    let rest = &buf[total_words * WORD..];
    if !rest.is_empty() {
        let nb_zero_bytes = rest.iter().take_while(|&&b| b == 0).count();
        stored_skips += nb_zero_bytes as u64;
        if nb_zero_bytes != rest.len() {
            file.seek_cur(stored_skips as i64)
                .map_err(|_| io::Error::other("error 92 : Sparse skip error ; try --no-sparse"))?;
            stored_skips = 0;
            file.write_all(&rest[nb_zero_bytes..]).map_err(|e| {
                io::Error::new(
                    e.kind(),
                    format!(
                        "error 95 : Write error : cannot write end of decoded block : {}",
                        e
                    ),
                )
            })?;
        }
    }

    Ok(stored_skips)
}

/// Finalises a sparse write sequence.
///
/// A non-zero pending counter means the file ends in elided zeros: seek
/// `counter - 1` forward and write one explicit zero byte, so the filesystem
/// reports the full logical length.
pub fn fwrite_sparse_end(prefs: &Prefs, file: &mut DstFile, stored_skips: u64) -> io::Result<()> {
    if prefs.test_mode {
        debug_assert_eq!(stored_skips, 0);
        return Ok(());
    }
    if stored_skips > 0 {
        file.seek_cur(stored_skips as i64 - 1)
            .map_err(|_| io::Error::other("error 69 : Final skip error (sparse file support)"))?;
        file.write_all(&[0u8]).map_err(|e| {
            io::Error::new(
                e.kind(),
                format!("error 69 : Write error : cannot write last zero : {}", e),
            )
        })?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom};

    fn sparse_prefs() -> Prefs {
        let mut p = Prefs::default();
        p.sparse_file_support = 2;
        p
    }

    /// Returns (DstFile, verification handle) over one anonymous temp file.
    fn dst_pair() -> (DstFile, std::fs::File) {
        let f = tempfile::tempfile().unwrap();
        let check = f.try_clone().unwrap();
        (DstFile::Regular(f), check)
    }

    #[test]
    fn plain_data_passes_through() {
        let (mut dst, mut check) = dst_pair();
        let data: Vec<u8> = (1u8..=32).collect();
        let skips = fwrite_sparse(&mut dst, &data, &sparse_prefs(), 0).unwrap();
        assert_eq!(skips, 0);
        check.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        check.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn all_zeros_accumulate_without_writing() {
        let (mut dst, mut check) = dst_pair();
        let zeros = vec![0u8; 4096];
        let skips = fwrite_sparse(&mut dst, &zeros, &sparse_prefs(), 0).unwrap();
        assert_eq!(skips, 4096);
        assert_eq!(check.seek(SeekFrom::End(0)).unwrap(), 0, "no bytes on disk yet");
    }

    #[test]
    fn finish_materialises_trailing_zeros() {
        let prefs = sparse_prefs();
        let (mut dst, mut check) = dst_pair();
        let zeros = vec![0u8; 1000];
        let skips = fwrite_sparse(&mut dst, &zeros, &prefs, 0).unwrap();
        fwrite_sparse_end(&prefs, &mut dst, skips).unwrap();
        assert_eq!(check.seek(SeekFrom::End(0)).unwrap(), 1000);
    }

    #[test]
    fn zeros_then_data_round_trips() {
        let prefs = sparse_prefs();
        let (mut dst, mut check) = dst_pair();
        let mut data = vec![0u8; 3 * WORD];
        data.extend_from_slice(&[7u8; 24]);
        let skips = fwrite_sparse(&mut dst, &data, &prefs, 0).unwrap();
        assert_eq!(skips, 0);
        fwrite_sparse_end(&prefs, &mut dst, skips).unwrap();
        check.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        check.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn hole_in_the_middle_round_trips() {
        let prefs = sparse_prefs();
        let (mut dst, mut check) = dst_pair();
        let mut data = Vec::new();
        data.extend_from_slice(&[0xAB; 100]);
        data.extend_from_slice(&vec![0u8; 64 * 1024]); // spans two segments
        data.extend_from_slice(&[0xCD; 100]);
        let mut skips = 0;
        for chunk in data.chunks(8 * 1024) {
            skips = fwrite_sparse(&mut dst, chunk, &prefs, skips).unwrap();
        }
        fwrite_sparse_end(&prefs, &mut dst, skips).unwrap();
        check.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        check.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn trailing_partial_word_handled_bytewise() {
        let prefs = sparse_prefs();
        let (mut dst, mut check) = dst_pair();
        // Length deliberately not a multiple of WORD; last bytes zero.
        let mut data = vec![1u8; WORD + 3];
        data[WORD] = 0;
        data[WORD + 1] = 0;
        data[WORD + 2] = 0;
        let skips = fwrite_sparse(&mut dst, &data, &prefs, 0).unwrap();
        assert_eq!(skips, 3);
        fwrite_sparse_end(&prefs, &mut dst, skips).unwrap();
        check.seek(SeekFrom::Start(0)).unwrap();
        let mut out = Vec::new();
        check.read_to_end(&mut out).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn sparse_off_writes_everything() {
        let mut prefs = Prefs::default();
        prefs.sparse_file_support = 0;
        let (mut dst, mut check) = dst_pair();
        let zeros = vec![0u8; 512];
        let skips = fwrite_sparse(&mut dst, &zeros, &prefs, 0).unwrap();
        assert_eq!(skips, 0);
        assert_eq!(check.seek(SeekFrom::End(0)).unwrap(), 512);
    }

    #[test]
    fn test_mode_discards_everything() {
        let mut prefs = Prefs::default();
        prefs.test_mode = true;
        let mut dst = DstFile::Sink;
        let skips = fwrite_sparse(&mut dst, &[0u8; 64], &prefs, 0).unwrap();
        assert_eq!(skips, 0);
        fwrite_sparse_end(&prefs, &mut dst, skips).unwrap();
    }

    #[test]
    fn end_with_no_skips_is_noop() {
        let prefs = sparse_prefs();
        let (mut dst, mut check) = dst_pair();
        fwrite_sparse_end(&prefs, &mut dst, 0).unwrap();
        assert_eq!(check.seek(SeekFrom::End(0)).unwrap(), 0);
    }
}
