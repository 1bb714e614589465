//! Destination-name derivation and filename checks.
//!
//! Pure string handling plus `stat`-free inspection: suffix append for
//! compression, suffix strip (with the short tar-variant rule) for
//! decompression, optional output-directory rebase, duplicate-basename
//! warnings, and the compressed-suffix table behind `--exclude-compressed`.

use crate::config::{
    GZ_EXTENSION, LZ4_EXTENSION, LZMA_EXTENSION, TAR_EXTENSION, TGZ_EXTENSION, TLZ4_EXTENSION,
    TXZ_EXTENSION, TZSTD_EXTENSION, XZ_EXTENSION, ZSTD_ALT_EXTENSION, ZSTD_EXTENSION,
};
use crate::io::prefs::display_level;

/// Returns `true` if `suffix` is recognised on decompression, honouring the
/// enabled format features.
pub fn is_decompress_suffix(suffix: &str) -> bool {
    match suffix {
        ZSTD_EXTENSION | TZSTD_EXTENSION | ZSTD_ALT_EXTENSION => true,
        GZ_EXTENSION | TGZ_EXTENSION => cfg!(feature = "gzip"),
        LZMA_EXTENSION | XZ_EXTENSION | TXZ_EXTENSION => cfg!(feature = "xz"),
        LZ4_EXTENSION | TLZ4_EXTENSION => cfg!(feature = "lz4"),
        _ => false,
    }
}

/// Suffix list shown in the unknown-suffix diagnostic.
fn suffix_list_str() -> String {
    let mut s = format!(
        "{}/{}/{}",
        ZSTD_EXTENSION, TZSTD_EXTENSION, ZSTD_ALT_EXTENSION
    );
    if cfg!(feature = "gzip") {
        s.push_str(&format!("/{}/{}", GZ_EXTENSION, TGZ_EXTENSION));
    }
    if cfg!(feature = "xz") {
        s.push_str(&format!(
            "/{}/{}/{}",
            LZMA_EXTENSION, XZ_EXTENSION, TXZ_EXTENSION
        ));
    }
    if cfg!(feature = "lz4") {
        s.push_str(&format!("/{}/{}", LZ4_EXTENSION, TLZ4_EXTENSION));
    }
    s
}

/// Suffixes treated as "already compressed" by `--exclude-compressed`.
/// Unlike [`is_decompress_suffix`], this list is independent of the enabled
/// formats: exclusion is about not re-compressing, not about decodability.
pub const COMPRESSED_FILE_EXTENSIONS: &[&str] = &[
    ZSTD_EXTENSION,
    TZSTD_EXTENSION,
    GZ_EXTENSION,
    TGZ_EXTENSION,
    LZMA_EXTENSION,
    XZ_EXTENSION,
    TXZ_EXTENSION,
    LZ4_EXTENSION,
    TLZ4_EXTENSION,
];

/// Host path separator used when splicing paths together.
#[cfg(windows)]
const PATH_SEP: char = '\\';
#[cfg(not(windows))]
const PATH_SEP: char = '/';

/// Returns the basename of `path`.
///
/// Splits on the host separator; on Windows additionally on `/`, since mixed
/// separators are common there (mingw, msys2).
pub fn extract_filename(path: &str) -> &str {
    let after_host = match path.rfind(PATH_SEP) {
        Some(i) => &path[i + 1..],
        None => path,
    };
    #[cfg(windows)]
    {
        match after_host.rfind('/') {
            Some(i) => &after_host[i + 1..],
            None => after_host,
        }
    }
    #[cfg(not(windows))]
    after_host
}

/// Rebases the basename of `path` into `out_dir`, inserting a separator
/// unless `out_dir` already ends with one.
pub fn create_filename_from_out_dir(path: &str, out_dir: &str) -> String {
    let filename = extract_filename(path);
    if out_dir.ends_with(PATH_SEP) || (cfg!(windows) && out_dir.ends_with('/')) {
        format!("{}{}", out_dir, filename)
    } else {
        format!("{}{}{}", out_dir, PATH_SEP, filename)
    }
}

/// Builds the destination name for compressing `src`: optional out-dir
/// rebase, then `suffix` appended. Cannot fail.
pub fn determine_compressed_name(src: &str, out_dir: Option<&str>, suffix: &str) -> String {
    match out_dir {
        Some(dir) => format!("{}{}", create_filename_from_out_dir(src, dir), suffix),
        None => format!("{}{}", src, suffix),
    }
}

/// Builds the destination name for decompressing `src`.
///
/// The trailing suffix must be recognised (see [`is_decompress_suffix`]);
/// suffixes whose first letter after the dot is `t` (short tar variants) map
/// to a `.tar` destination, all others are stripped. Returns `None` (with a
/// diagnostic) when the suffix is not recognised; the caller skips that file
/// only.
pub fn determine_dst_name(src: &str, out_dir: Option<&str>) -> Option<String> {
    let dot = match src.rfind('.') {
        Some(i) => i,
        None => {
            warn_unknown_suffix(src);
            return None;
        }
    };
    let src_suffix = &src[dot..];
    if dot == 0 || !is_decompress_suffix(src_suffix) {
        warn_unknown_suffix(src);
        return None;
    }
    let dst_suffix = if src_suffix.as_bytes()[1] == b't' {
        TAR_EXTENSION
    } else {
        ""
    };

    let rebased;
    let (stem_source, stem_end) = match out_dir {
        Some(dir) => {
            rebased = create_filename_from_out_dir(src, dir);
            let end = rebased.len() - src_suffix.len();
            (rebased.as_str(), end)
        }
        None => (src, dot),
    };
    Some(format!("{}{}", &stem_source[..stem_end], dst_suffix))
}

fn warn_unknown_suffix(src: &str) {
    display_level(
        1,
        &format!(
            "zstdr: {}: unknown suffix ({} expected). \
             Can't derive the output file name. \
             Specify it with -o dstFileName. Ignoring.\n",
            src,
            suffix_list_str()
        ),
    );
}

/// Returns `true` when `path` carries one of the compressed-file suffixes.
pub fn is_compressed_file(path: &str) -> bool {
    COMPRESSED_FILE_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(ext))
}

/// Warns (does not fail) when two sources share a basename and would collide
/// in a shared output directory.
pub fn check_filename_collisions(sources: &[&str]) {
    if sources.len() < 2 {
        return;
    }
    let mut basenames: Vec<&str> = sources.iter().map(|s| extract_filename(s)).collect();
    basenames.sort_unstable();
    for pair in basenames.windows(2) {
        if pair[0] == pair[1] {
            display_level(
                2,
                &format!("WARNING: Two files have same filename: {}\n", pair[0]),
            );
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_filename_basic() {
        assert_eq!(extract_filename("dir/sub/file.txt"), "file.txt");
        assert_eq!(extract_filename("file.txt"), "file.txt");
        assert_eq!(extract_filename("dir/"), "");
    }

    #[test]
    fn compressed_name_appends_suffix() {
        assert_eq!(
            determine_compressed_name("data.bin", None, ".zst"),
            "data.bin.zst"
        );
    }

    #[test]
    fn compressed_name_rebases_into_out_dir() {
        assert_eq!(
            determine_compressed_name("a/b/data.bin", Some("out"), ".zst"),
            format!("out{}data.bin.zst", std::path::MAIN_SEPARATOR)
        );
        // Trailing separator on the out dir is not doubled.
        let dir = format!("out{}", std::path::MAIN_SEPARATOR);
        assert_eq!(
            determine_compressed_name("data.bin", Some(&dir), ".zst"),
            format!("out{}data.bin.zst", std::path::MAIN_SEPARATOR)
        );
    }

    #[test]
    fn dst_name_strips_known_suffix() {
        assert_eq!(determine_dst_name("file.zst", None).unwrap(), "file");
        assert_eq!(determine_dst_name("a/b.bin.zst", None).unwrap(), "a/b.bin");
    }

    #[test]
    fn dst_name_tar_variants() {
        assert_eq!(determine_dst_name("x.tzst", None).unwrap(), "x.tar");
        #[cfg(feature = "gzip")]
        assert_eq!(determine_dst_name("x.tgz", None).unwrap(), "x.tar");
        #[cfg(feature = "xz")]
        assert_eq!(determine_dst_name("x.txz", None).unwrap(), "x.tar");
        #[cfg(feature = "lz4")]
        assert_eq!(determine_dst_name("x.tlz4", None).unwrap(), "x.tar");
    }

    #[test]
    fn dst_name_rejects_unknown_suffix() {
        assert!(determine_dst_name("file.bin", None).is_none());
        assert!(determine_dst_name("file", None).is_none());
        assert!(determine_dst_name(".zst", None).is_none());
    }

    #[test]
    fn dst_name_rebases_into_out_dir() {
        assert_eq!(
            determine_dst_name("a/b/file.zst", Some("out")).unwrap(),
            format!("out{}file", std::path::MAIN_SEPARATOR)
        );
    }

    #[test]
    fn exclude_compressed_matches_table() {
        assert!(is_compressed_file("backup.tar.zst"));
        assert!(is_compressed_file("a.gz"));
        assert!(is_compressed_file("a.lzma"));
        assert!(!is_compressed_file("a.txt"));
        assert!(!is_compressed_file("zst"));
    }

    #[test]
    fn collision_check_does_not_panic() {
        // Warnings only; just exercise both branches.
        check_filename_collisions(&["a/x.bin", "b/x.bin", "c/y.bin"]);
        check_filename_collisions(&["only.one"]);
        check_filename_collisions(&[]);
    }
}
