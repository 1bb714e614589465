//! Command-line argument parsing for the `zstdr` binary.
//!
//! Deliberately thin: flags are translated into [`Prefs`] fields and a small
//! [`ParsedArgs`] bundle; every policy decision lives in the `io` layer.
//! Operation dispatch happens in `main.rs`.

use crate::config::{
    CLEVEL_DEFAULT, GZ_EXTENSION, LZ4_EXTENSION, LZMA_EXTENSION, XZ_EXTENSION, ZSTD_EXTENSION,
};
use crate::io::prefs::{CompressionFormat, Prefs, ProgressSetting};

/// Top-level operation selected by flags (or filename-based auto-detection).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpMode {
    Auto,
    Compress,
    Decompress,
    Test,
    List,
}

/// Everything the dispatcher needs, produced by [`parse_args`].
pub struct ParsedArgs {
    pub prefs: Prefs,
    pub op_mode: OpMode,
    pub c_level: i32,
    pub display_level: i32,
    pub progress: Option<ProgressSetting>,
    pub force_stdout: bool,
    pub ultra: bool,
    pub in_file_names: Vec<String>,
    pub output_filename: Option<String>,
    pub dictionary_filename: Option<String>,
    pub out_dir: Option<String>,
    pub exe_name: String,
    pub exit_early: bool,
}

/// Default suffix appended for the selected output format.
pub fn format_suffix(format: CompressionFormat) -> &'static str {
    match format {
        CompressionFormat::Zstd => ZSTD_EXTENSION,
        CompressionFormat::Gzip => GZ_EXTENSION,
        CompressionFormat::Xz => XZ_EXTENSION,
        CompressionFormat::Lzma => LZMA_EXTENSION,
        CompressionFormat::Lz4 => LZ4_EXTENSION,
    }
}

/// Infers an initial mode from the binary's name (`unzstd`, `zstdcat`).
pub fn detect_alias(argv0: &str) -> (OpMode, bool) {
    let exe = argv0.rsplit(['/', '\\']).next().unwrap_or(argv0);
    if exe.contains("zstdcat") || exe.contains("zcat") {
        (OpMode::Decompress, true) // decompress to stdout
    } else if exe.contains("unzstd") {
        (OpMode::Decompress, false)
    } else {
        (OpMode::Auto, false)
    }
}

/// Parses a leading unsigned decimal, returning the value and the rest.
fn read_u32(s: &str) -> Option<(u32, &str)> {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    s[..end].parse().ok().map(|v| (v, &s[end..]))
}

/// Parses a size with an optional `K`/`M`/`G` binary multiplier.
fn read_size(s: &str) -> Option<u64> {
    let (value, rest) = read_u32(s)?;
    let mult: u64 = match rest {
        "" => 1,
        "K" | "KB" | "KiB" | "k" => 1 << 10,
        "M" | "MB" | "MiB" | "m" => 1 << 20,
        "G" | "GB" | "GiB" | "g" => 1 << 30,
        _ => return None,
    };
    Some(value as u64 * mult)
}

/// Reads the initial compression level from `ZSTD_CLEVEL`.
fn init_c_level() -> i32 {
    if let Ok(env) = std::env::var("ZSTD_CLEVEL") {
        let (neg, digits) = match env.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, env.as_str()),
        };
        if let Some((v, "")) = read_u32(digits) {
            return if neg { -(v as i32) } else { v as i32 };
        }
        eprintln!("Ignore environment variable setting ZSTD_CLEVEL={}: not a valid integer value", env);
    }
    CLEVEL_DEFAULT
}

/// Reads the default worker count from `ZSTD_NBTHREADS`.
fn init_nb_threads() -> Option<u32> {
    if let Ok(env) = std::env::var("ZSTD_NBTHREADS") {
        if let Some((v, "")) = read_u32(&env) {
            return Some(v);
        }
        eprintln!("Ignore environment variable setting ZSTD_NBTHREADS={}: not a valid unsigned value", env);
    }
    None
}

pub fn print_usage(exe_name: &str) {
    eprintln!("Usage : ");
    eprintln!("      {} [arg] [input] [output] ", exe_name);
    eprintln!();
    eprintln!("input   : a filename, or 'stdin'");
    eprintln!("Arguments : ");
    eprintln!(" -#     : compression level (1-19, default: {}) ", CLEVEL_DEFAULT);
    eprintln!(" -d     : decompression ");
    eprintln!(" -D DICT: use DICT as dictionary ");
    eprintln!(" -o FILE: result stored into FILE ");
    eprintln!(" -f     : overwrite output without prompting, also (de)compress links ");
    eprintln!(" --rm   : remove source file(s) after successful de/compression ");
    eprintln!(" -k     : preserve source file(s) (default) ");
    eprintln!(" -t     : test compressed file integrity ");
    eprintln!(" -l     : print information about zstd compressed files ");
    eprintln!(" -q     : suppress warnings; specify twice to suppress errors too ");
    eprintln!(" -v     : verbose mode; specify multiple times to increase verbosity ");
    eprintln!(" -c     : write to standard output ");
    eprintln!(" -T#    : spawn # compression threads ");
    eprintln!(" -h/-H  : display help/long help and exit ");
}

fn print_advanced_usage(exe_name: &str) {
    print_usage(exe_name);
    eprintln!();
    eprintln!("Advanced arguments : ");
    eprintln!(" -V     : display Version number and exit ");
    eprintln!(" --adapt: dynamically adapt compression level to I/O conditions ");
    eprintln!(" --sparse / --no-sparse : sparse-mode file writes (default: enabled on file output) ");
    eprintln!(" --format=zstd|gzip|xz|lzma|lz4 : select an output format ");
    eprintln!(" --long[=#]: enable long distance matching with given window log (default: 27) ");
    eprintln!(" --patch-from=FILE : use FILE as the reference point for patch compression ");
    eprintln!(" --stream-size=# : specify size of streaming input from stdin ");
    eprintln!(" --size-hint=# : optimize compression parameters for streaming input of given size ");
    eprintln!(" --memory=# : memory usage limit for decompression ");
    eprintln!(" --[no-]check : integrity check (default: enabled) ");
    eprintln!(" --[no-]content-size : header includes original size (default: enabled) ");
    eprintln!(" --rsyncable : compress using a rsync-friendly method ");
    eprintln!(" --exclude-compressed: only compress files that are not already compressed ");
    eprintln!(" --output-dir=DIR : write output file(s) into DIR ");
    eprintln!(" --[no-]progress : forcibly show/hide the progress counter ");
    eprintln!(" --ultra : enable levels beyond 19, up to the codec maximum ");
}

/// Full argument-parsing loop.
pub fn parse_args(argv: &[String], init: (OpMode, bool)) -> Result<ParsedArgs, String> {
    let exe_name = argv
        .first()
        .map(|s| s.clone())
        .unwrap_or_else(|| "zstdr".to_owned());
    let mut args = ParsedArgs {
        prefs: Prefs::new(),
        op_mode: init.0,
        c_level: init_c_level(),
        display_level: 2,
        progress: None,
        force_stdout: init.1,
        ultra: false,
        in_file_names: Vec::new(),
        output_filename: if init.1 {
            Some(crate::io::STDOUT_MARK.to_owned())
        } else {
            None
        },
        dictionary_filename: None,
        out_dir: None,
        exe_name,
        exit_early: false,
    };
    if let Some(t) = init_nb_threads() {
        args.prefs.set_nb_workers(t);
    }

    let mut adaptive = false;
    let mut iter = argv.iter().skip(1).peekable();
    while let Some(arg) = iter.next() {
        let arg = arg.as_str();

        if let Some(long) = arg.strip_prefix("--") {
            let (name, value) = match long.split_once('=') {
                Some((n, v)) => (n, Some(v)),
                None => (long, None),
            };
            match (name, value) {
                ("help", _) => {
                    print_advanced_usage(&args.exe_name);
                    args.exit_early = true;
                    return Ok(args);
                }
                ("version", _) => {
                    eprintln!("*** zstdr v{} ***", crate::ZSTDR_VERSION_STRING);
                    args.exit_early = true;
                    return Ok(args);
                }
                ("compress", _) => args.op_mode = OpMode::Compress,
                ("decompress", _) | ("uncompress", _) => args.op_mode = OpMode::Decompress,
                ("test", _) => args.op_mode = OpMode::Test,
                ("list", _) => args.op_mode = OpMode::List,
                ("force", _) => args.prefs.overwrite = true,
                ("quiet", _) => args.display_level -= 1,
                ("verbose", _) => args.display_level += 1,
                ("stdout", _) => {
                    args.force_stdout = true;
                    args.output_filename = Some(crate::io::STDOUT_MARK.to_owned());
                }
                ("keep", _) => args.prefs.remove_src_file = false,
                ("rm", _) => args.prefs.remove_src_file = true,
                ("sparse", _) => args.prefs.set_sparse_write(2),
                ("no-sparse", _) => args.prefs.set_sparse_write(0),
                ("check", _) => args.prefs.checksum_flag = true,
                ("no-check", _) => args.prefs.checksum_flag = false,
                ("content-size", _) => args.prefs.content_size = true,
                ("no-content-size", _) => args.prefs.content_size = false,
                ("rsyncable", _) => args
                    .prefs
                    .set_rsyncable(true)
                    .map_err(|e| e.to_string())?,
                ("exclude-compressed", _) => args.prefs.exclude_compressed_files = true,
                ("no-progress", _) => args.progress = Some(ProgressSetting::Never),
                ("progress", _) => args.progress = Some(ProgressSetting::Always),
                ("ultra", _) => args.ultra = true,
                ("adapt", None) => adaptive = true,
                ("adapt", Some(v)) => {
                    adaptive = true;
                    for part in v.split(',') {
                        if let Some(m) = part.strip_prefix("min=") {
                            let (n, _) = read_u32(m).ok_or("invalid --adapt min")?;
                            args.prefs.set_adapt_min(n as i32);
                        } else if let Some(m) = part.strip_prefix("max=") {
                            let (n, _) = read_u32(m).ok_or("invalid --adapt max")?;
                            args.prefs.set_adapt_max(n as i32);
                        } else {
                            return Err(format!("invalid --adapt argument: {}", part));
                        }
                    }
                }
                ("threads", Some(v)) => {
                    let (n, _) = read_u32(v).ok_or("invalid --threads value")?;
                    let n = if n == 0 {
                        crate::io::default_nb_workers()
                    } else {
                        n
                    };
                    args.prefs.set_nb_workers(n);
                }
                ("format", Some(v)) => {
                    args.prefs.compression_type = match v {
                        "zstd" => CompressionFormat::Zstd,
                        "gzip" => CompressionFormat::Gzip,
                        "xz" => CompressionFormat::Xz,
                        "lzma" => CompressionFormat::Lzma,
                        "lz4" => CompressionFormat::Lz4,
                        _ => return Err(format!("unknown format: {}", v)),
                    }
                }
                ("long", v) => {
                    args.prefs.ldm_flag = true;
                    let window_log = match v {
                        Some(s) => read_u32(s).ok_or("invalid --long value")?.0,
                        None => 27,
                    };
                    args.prefs.compr_params.window_log = window_log;
                    // Decompression of long-window frames needs the limit
                    // raised to match.
                    args.prefs.mem_limit = args.prefs.mem_limit.max(1u32 << window_log.min(31));
                }
                ("patch-from", Some(v)) => {
                    args.prefs.patch_from_mode = true;
                    args.dictionary_filename = Some(v.to_owned());
                }
                ("stream-size", Some(v)) => {
                    args.prefs.stream_src_size = read_size(v).ok_or("invalid --stream-size")?;
                }
                ("size-hint", Some(v)) => {
                    args.prefs.src_size_hint =
                        read_size(v).ok_or("invalid --size-hint")? as u32;
                }
                ("memory", Some(v)) => {
                    args.prefs.mem_limit = read_size(v).ok_or("invalid --memory")? as u32;
                }
                ("block-size", Some(v)) => {
                    let size = read_size(v).ok_or("invalid --block-size")?;
                    args.prefs.set_block_size(size as u32);
                }
                ("output-dir", Some(v)) => args.out_dir = Some(v.to_owned()),
                _ => return Err(format!("unknown option: --{}", long)),
            }
            continue;
        }

        if let Some(mut cluster) = arg.strip_prefix('-') {
            if cluster.is_empty() {
                // A lone "-" names stdin.
                args.in_file_names.push(crate::io::STDIN_MARK.to_owned());
                continue;
            }
            while !cluster.is_empty() {
                let c = cluster.as_bytes()[0] as char;
                cluster = &cluster[1..];
                match c {
                    'z' => args.op_mode = OpMode::Compress,
                    'd' => args.op_mode = OpMode::Decompress,
                    't' => args.op_mode = OpMode::Test,
                    'l' => args.op_mode = OpMode::List,
                    'f' => args.prefs.overwrite = true,
                    'k' => args.prefs.remove_src_file = false,
                    'q' => args.display_level -= 1,
                    'v' => args.display_level += 1,
                    'c' => {
                        args.force_stdout = true;
                        args.output_filename = Some(crate::io::STDOUT_MARK.to_owned());
                    }
                    'h' => {
                        print_usage(&args.exe_name);
                        args.exit_early = true;
                        return Ok(args);
                    }
                    'H' => {
                        print_advanced_usage(&args.exe_name);
                        args.exit_early = true;
                        return Ok(args);
                    }
                    'V' => {
                        eprintln!("*** zstdr v{} ***", crate::ZSTDR_VERSION_STRING);
                        args.exit_early = true;
                        return Ok(args);
                    }
                    'T' => {
                        let (n, rest) = read_u32(cluster)
                            .ok_or_else(|| "missing value after -T".to_owned())?;
                        // 0 means "use all reasonable cores".
                        let n = if n == 0 {
                            crate::io::default_nb_workers()
                        } else {
                            n
                        };
                        args.prefs.set_nb_workers(n);
                        cluster = rest;
                    }
                    'o' => {
                        let value = if !cluster.is_empty() {
                            let v = cluster.to_owned();
                            cluster = "";
                            v
                        } else {
                            iter.next()
                                .ok_or_else(|| "missing filename after -o".to_owned())?
                                .clone()
                        };
                        args.output_filename = Some(value);
                    }
                    'D' => {
                        let value = if !cluster.is_empty() {
                            let v = cluster.to_owned();
                            cluster = "";
                            v
                        } else {
                            iter.next()
                                .ok_or_else(|| "missing filename after -D".to_owned())?
                                .clone()
                        };
                        args.dictionary_filename = Some(value);
                    }
                    '0'..='9' => {
                        let digits = format!("{}{}", c, cluster);
                        let (level, rest) = read_u32(&digits).unwrap();
                        args.c_level = level as i32;
                        let consumed = digits.len() - rest.len() - 1;
                        cluster = &cluster[consumed..];
                    }
                    _ => return Err(format!("unknown option: -{}", c)),
                }
            }
            continue;
        }

        args.in_file_names.push(arg.to_owned());
    }

    if adaptive {
        args.prefs
            .set_adaptive_mode(true)
            .map_err(|e| e.to_string())?;
    }

    // Levels above 19 need --ultra; clamp otherwise.
    let max_level = if args.ultra { crate::zstd::max_c_level() } else { 19 };
    if args.c_level > max_level {
        args.c_level = max_level;
    }

    Ok(args)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
