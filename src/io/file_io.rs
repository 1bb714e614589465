//! File gate: source and destination opening with policy.
//!
//! Entry points used by the engines and batch drivers:
//!
//! - [`open_src_file`] — resolves a path to a boxed [`Read`], handling the
//!   `"stdin"` sentinel and refusing non-regular sources (FIFOs are
//!   accepted, block devices only with `allow_block_devices`).
//! - [`open_dst_file`] — resolves a path to a [`DstFile`], handling the
//!   `"stdout"` sentinel, the self-overwrite check (inode identity, not
//!   string equality), the overwrite prompt, and mode-bit application.
//! - [`remove_file`] — unlink that refuses non-regular targets.
//! - [`load_dict_buffer`] — reads a dictionary file up to a size cap.
//!
//! Sentinel string constants ([`STDIN_MARK`], [`STDOUT_MARK`], [`NUL_MARK`])
//! are matched by exact string comparison.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::Path;

use crate::io::prefs::{display_level, notification_level, FileIoCtx, Prefs, MB};
use crate::util::{get_file_size, is_reg_file, is_same_file};

// ---------------------------------------------------------------------------
// Sentinel strings
// ---------------------------------------------------------------------------

/// Sentinel: read from standard input.
pub const STDIN_MARK: &str = "stdin";

/// Sentinel: write to standard output.
pub const STDOUT_MARK: &str = "stdout";

/// Sentinel: the null device.
#[cfg(windows)]
pub const NUL_MARK: &str = "nul";
#[cfg(not(windows))]
pub const NUL_MARK: &str = "/dev/null";

/// Upper bound on a dictionary loaded outside patch-from mode.
pub const DICTSIZE_MAX: usize = 32 * MB;

#[cfg(windows)]
fn set_binary_mode(fd: i32) {
    // SAFETY: switching std handles to binary mode is always valid.
    unsafe {
        libc::_setmode(fd, libc::O_BINARY);
    }
}

// ---------------------------------------------------------------------------
// read_to_capacity
// ---------------------------------------------------------------------------

/// Fills `buf` from `reader` until full or EOF, retrying on interruption.
/// This is the `fread` contract the streaming loops rely on: a short return
/// means end of stream, never a transient short read.
pub fn read_to_capacity(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..]) {
            Ok(0) => break,
            Ok(n) => total += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(total)
}

// ---------------------------------------------------------------------------
// remove_file
// ---------------------------------------------------------------------------

/// Unlinks `path`, refusing to touch non-regular files.
///
/// On Windows, read-only files are made writable first so the unlink can
/// succeed.
pub fn remove_file(path: &str) -> io::Result<()> {
    let meta = match fs::metadata(path) {
        Ok(m) => m,
        Err(e) => {
            display_level(
                2,
                &format!("zstdr: Failed to stat {} while trying to remove it\n", path),
            );
            return Err(e);
        }
    };
    if !meta.file_type().is_file() {
        display_level(
            2,
            &format!("zstdr: Refusing to remove non-regular file {}\n", path),
        );
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{}: not a regular file", path),
        ));
    }
    #[cfg(windows)]
    {
        let mut perms = meta.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            let _ = fs::set_permissions(path, perms);
        }
    }
    fs::remove_file(path)
}

// ---------------------------------------------------------------------------
// User confirmation
// ---------------------------------------------------------------------------

/// Prompts on stderr and reads one line from stdin. Returns `true` when the
/// operation must be refused: either stdin is already claimed as a data
/// source, or the answer does not start with an accepted character.
pub fn require_user_confirmation(
    prompt: &str,
    abort_msg: &str,
    accepted: &str,
    has_stdin_input: bool,
) -> bool {
    if has_stdin_input {
        // stdin carries data; no terminal to ask on.
        display_level(1, "stdin is an input - not proceeding.\n");
        return true;
    }
    eprint!("{}", prompt);
    let _ = io::stderr().flush();
    let mut line = String::new();
    if io::stdin().read_line(&mut line).is_err() {
        display_level(1, abort_msg);
        return true;
    }
    let first = line.trim_start().chars().next().unwrap_or('\0');
    if !accepted.contains(first) {
        display_level(1, abort_msg);
        return true;
    }
    false
}

// ---------------------------------------------------------------------------
// Source gate
// ---------------------------------------------------------------------------

/// Opens a source for reading.
///
/// Accepts regular files and FIFOs; block devices only when
/// `prefs.allow_block_devices` is set; everything else is refused with a
/// warning. The `"stdin"` sentinel returns standard input.
pub fn open_src_file(prefs: Option<&Prefs>, src_file_name: &str) -> io::Result<Box<dyn Read>> {
    if src_file_name == STDIN_MARK {
        display_level(4, "Using stdin for input \n");
        #[cfg(windows)]
        set_binary_mode(0);
        return Ok(Box::new(io::stdin()));
    }

    let allow_block_devices = prefs.map(|p| p.allow_block_devices).unwrap_or(false);

    #[cfg(unix)]
    {
        use nix::sys::stat::{stat, SFlag};
        let st = stat(src_file_name).map_err(|e| {
            display_level(
                1,
                &format!("zstdr: can't stat {} : {} -- ignored \n", src_file_name, e),
            );
            io::Error::from_raw_os_error(e as i32)
        })?;
        let fmt = SFlag::from_bits_truncate(st.st_mode) & SFlag::S_IFMT;
        let acceptable = fmt == SFlag::S_IFREG
            || fmt == SFlag::S_IFIFO
            || (allow_block_devices && fmt == SFlag::S_IFBLK);
        if !acceptable {
            display_level(
                1,
                &format!("zstdr: {} is not a regular file -- ignored \n", src_file_name),
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}: not a regular file", src_file_name),
            ));
        }
    }
    #[cfg(not(unix))]
    {
        let meta = fs::metadata(src_file_name).map_err(|e| {
            display_level(
                1,
                &format!("zstdr: can't stat {} : {} -- ignored \n", src_file_name, e),
            );
            e
        })?;
        if !meta.file_type().is_file() {
            display_level(
                1,
                &format!("zstdr: {} is not a regular file -- ignored \n", src_file_name),
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}: not a regular file", src_file_name),
            ));
        }
    }

    let f = File::open(src_file_name).map_err(|e| {
        display_level(1, &format!("zstdr: {}: {} \n", src_file_name, e));
        e
    })?;
    Ok(Box::new(f))
}

// ---------------------------------------------------------------------------
// Destination handle
// ---------------------------------------------------------------------------

/// A write-capable destination produced by [`open_dst_file`].
///
/// The sparse writer needs relative seeks, which only make sense on the
/// regular-file variant; `seek_cur` is unreachable for the others because
/// sparse mode is forced off for them.
#[derive(Debug)]
pub enum DstFile {
    Regular(File),
    Stdout(io::Stdout),
    /// Test mode: every byte is accepted and discarded.
    Sink,
}

impl DstFile {
    pub fn is_stdout(&self) -> bool {
        matches!(self, DstFile::Stdout(_))
    }

    pub fn is_sink(&self) -> bool {
        matches!(self, DstFile::Sink)
    }

    /// Advances the file position by `offset` bytes (sparse hole).
    pub fn seek_cur(&mut self, offset: i64) -> io::Result<()> {
        if offset == 0 {
            return Ok(());
        }
        match self {
            DstFile::Regular(f) => {
                use std::io::Seek;
                f.seek(io::SeekFrom::Current(offset))?;
                Ok(())
            }
            _ => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                "seek on non-seekable destination",
            )),
        }
    }

    /// Flushes and releases the handle, surfacing close-time write errors.
    pub fn close(self) -> io::Result<()> {
        match self {
            DstFile::Regular(mut f) => f.flush(),
            DstFile::Stdout(mut s) => s.flush(),
            DstFile::Sink => Ok(()),
        }
    }
}

impl Write for DstFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            DstFile::Regular(f) => f.write(buf),
            DstFile::Stdout(s) => s.write(buf),
            DstFile::Sink => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            DstFile::Regular(f) => f.flush(),
            DstFile::Stdout(s) => s.flush(),
            DstFile::Sink => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Destination gate
// ---------------------------------------------------------------------------

/// Opens a destination for writing with the requested permission bits.
///
/// Policy, in order:
/// - test mode never creates a file (discard sink);
/// - the `"stdout"` sentinel returns standard output and downgrades sparse
///   mode `auto → off`;
/// - a destination that resolves to the same file as `src_file_name` is
///   refused;
/// - an existing regular file is only replaced with `overwrite` set, or
///   after an interactive confirmation when verbosity permits; it is
///   unlinked before the new file is created.
pub fn open_dst_file(
    fctx: &FileIoCtx,
    prefs: &mut Prefs,
    src_file_name: Option<&str>,
    dst_file_name: &str,
    mode: u32,
) -> io::Result<DstFile> {
    if prefs.test_mode {
        return Ok(DstFile::Sink);
    }

    if dst_file_name == STDOUT_MARK {
        display_level(4, "Using stdout for output \n");
        #[cfg(windows)]
        set_binary_mode(1);
        if prefs.sparse_file_support == 1 {
            prefs.sparse_file_support = 0;
            display_level(
                4,
                "Sparse File Support is automatically disabled on stdout ; try --sparse \n",
            );
        }
        return Ok(DstFile::Stdout(io::stdout()));
    }

    // Never let the output clobber its own input.
    if let Some(src) = src_file_name {
        if is_same_file(src, dst_file_name) {
            display_level(
                1,
                "zstdr: Refusing to open an output file which will overwrite the input file \n",
            );
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{}: same file as source", dst_file_name),
            ));
        }
    }

    // Auto mode resolves to the platform's sparse capability.
    if prefs.sparse_file_support == 1 && cfg!(not(has_sparse_files)) {
        prefs.sparse_file_support = 0;
    }

    if is_reg_file(Path::new(dst_file_name)) {
        // stat on Windows reports `NUL`/`nul` as a regular file, so this
        // branch guards the sentinel explicitly everywhere else.
        #[cfg(not(windows))]
        if dst_file_name == NUL_MARK {
            return Err(io::Error::other(format!(
                "error 40 : {} is unexpectedly categorized as a regular file",
                dst_file_name
            )));
        }

        if !prefs.overwrite {
            if notification_level() <= 1 {
                // No interaction possible.
                display_level(
                    1,
                    &format!("zstdr: {} already exists; not overwritten  \n", dst_file_name),
                );
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}: already exists", dst_file_name),
                ));
            }
            eprint!("zstdr: {} already exists; ", dst_file_name);
            if require_user_confirmation(
                "overwrite (y/n) ? ",
                "Not overwritten  \n",
                "yY",
                fctx.has_stdin_input,
            ) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{}: not overwritten", dst_file_name),
                ));
            }
        }
        // Unlink before recreate so an interrupted run never leaves a
        // half-truncated original behind under a fresh inode's name.
        let _ = remove_file(dst_file_name);
    }

    let mut opts = OpenOptions::new();
    opts.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.mode(mode);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let f = opts.open(dst_file_name).map_err(|e| {
        display_level(1, &format!("zstdr: {}: {}\n", dst_file_name, e));
        e
    })?;
    Ok(DstFile::Regular(f))
}

// ---------------------------------------------------------------------------
// Dictionary loading
// ---------------------------------------------------------------------------

/// Loads the dictionary file into a fresh buffer.
///
/// `None` yields an empty buffer. The size cap is the decompression memory
/// limit in patch-from mode, [`DICTSIZE_MAX`] otherwise; exceeding it is a
/// hard error that aborts the batch.
pub fn load_dict_buffer(prefs: &Prefs, dict_file_name: Option<&str>) -> io::Result<Vec<u8>> {
    let file_name = match dict_file_name {
        Some(n) if !n.is_empty() => n,
        _ => return Ok(Vec::new()),
    };
    display_level(4, &format!("Loading {} as dictionary \n", file_name));

    let file_size = get_file_size(Path::new(file_name)).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "error 32 : This file format is not supported : Dictionary file {}",
                file_name
            ),
        )
    })?;

    let dict_size_max = if prefs.patch_from_mode {
        prefs.mem_limit as u64
    } else {
        DICTSIZE_MAX as u64
    };
    if file_size > dict_size_max {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "error 32 : Dictionary file {} is too large (> {} bytes)",
                file_name, dict_size_max
            ),
        ));
    }

    let mut buf = Vec::with_capacity(file_size as usize);
    File::open(file_name)?.read_to_end(&mut buf)?;
    if buf.len() as u64 != file_size {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("error 35 : Error reading dictionary file {}", file_name),
        ));
    }
    Ok(buf)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn sentinel_constants() {
        assert_eq!(STDIN_MARK, "stdin");
        assert_eq!(STDOUT_MARK, "stdout");
        #[cfg(not(windows))]
        assert_eq!(NUL_MARK, "/dev/null");
    }

    #[test]
    fn open_src_rejects_missing_and_directory() {
        assert!(open_src_file(None, "/no/such/source").is_err());
        let dir = TempDir::new().unwrap();
        assert!(open_src_file(None, dir.path().to_str().unwrap()).is_err());
    }

    #[test]
    fn open_src_accepts_regular_file() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("src.bin");
        std::fs::write(&p, b"abc").unwrap();
        let mut r = open_src_file(None, p.to_str().unwrap()).unwrap();
        let mut out = Vec::new();
        r.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
    }

    #[test]
    fn open_dst_stdout_disables_auto_sparse() {
        let mut prefs = Prefs::default();
        assert_eq!(prefs.sparse_file_support, 1);
        let dst = open_dst_file(&FileIoCtx::new(), &mut prefs, None, STDOUT_MARK, 0o644).unwrap();
        assert!(dst.is_stdout());
        assert_eq!(prefs.sparse_file_support, 0);
    }

    #[test]
    fn open_dst_test_mode_is_sink() {
        let mut prefs = Prefs::default();
        prefs.test_mode = true;
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("out.zst");
        let dst =
            open_dst_file(&FileIoCtx::new(), &mut prefs, None, p.to_str().unwrap(), 0o644).unwrap();
        assert!(dst.is_sink());
        assert!(!p.exists(), "test mode must not create the destination");
    }

    #[test]
    fn open_dst_refuses_self_overwrite() {
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("same.bin");
        std::fs::write(&p, b"content").unwrap();
        let s = p.to_str().unwrap();
        let err = open_dst_file(&FileIoCtx::new(), &mut prefs, Some(s), s, 0o644).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        // Original must be untouched.
        assert_eq!(std::fs::read(&p).unwrap(), b"content");
    }

    #[test]
    fn open_dst_existing_without_overwrite_quiet_refuses() {
        crate::io::prefs::set_notification_level(0);
        let mut prefs = Prefs::default();
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("out.zst");
        std::fs::write(&p, b"old").unwrap();
        let err = open_dst_file(&FileIoCtx::new(), &mut prefs, None, p.to_str().unwrap(), 0o644)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&p).unwrap(), b"old");
        crate::io::prefs::set_notification_level(2);
    }

    #[test]
    fn open_dst_overwrite_force_replaces() {
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("out.zst");
        std::fs::write(&p, b"old").unwrap();
        let mut dst =
            open_dst_file(&FileIoCtx::new(), &mut prefs, None, p.to_str().unwrap(), 0o644).unwrap();
        dst.write_all(b"new").unwrap();
        dst.close().unwrap();
        assert_eq!(std::fs::read(&p).unwrap(), b"new");
    }

    #[cfg(unix)]
    #[test]
    fn open_dst_applies_mode_bits() {
        use std::os::unix::fs::PermissionsExt;
        let mut prefs = Prefs::default();
        prefs.overwrite = true;
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("moded.zst");
        let dst =
            open_dst_file(&FileIoCtx::new(), &mut prefs, None, p.to_str().unwrap(), 0o600).unwrap();
        dst.close().unwrap();
        let mode = std::fs::metadata(&p).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn remove_file_refuses_directory() {
        let dir = TempDir::new().unwrap();
        assert!(remove_file(dir.path().to_str().unwrap()).is_err());
        assert!(dir.path().exists());
    }

    #[test]
    fn dict_buffer_empty_when_absent() {
        let prefs = Prefs::default();
        assert!(load_dict_buffer(&prefs, None).unwrap().is_empty());
        assert!(load_dict_buffer(&prefs, Some("")).unwrap().is_empty());
    }

    #[test]
    fn dict_buffer_reads_content() {
        let prefs = Prefs::default();
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("dict.bin");
        std::fs::write(&p, b"dictionary bytes").unwrap();
        let buf = load_dict_buffer(&prefs, Some(p.to_str().unwrap())).unwrap();
        assert_eq!(buf, b"dictionary bytes");
    }

    #[test]
    fn dict_buffer_oversize_in_patch_mode_errors() {
        let mut prefs = Prefs::default();
        prefs.patch_from_mode = true;
        prefs.mem_limit = 4; // tiny cap
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("dict.bin");
        std::fs::write(&p, b"more than four").unwrap();
        assert!(load_dict_buffer(&prefs, Some(p.to_str().unwrap())).is_err());
    }
}
