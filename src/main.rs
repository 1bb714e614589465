//! Binary entry point for the `zstdr` command-line tool.
//!
//! Flow: alias detection from `argv[0]`, argument parsing, console-safety
//! checks, automatic output-name resolution, then dispatch to the I/O layer
//! (compress, decompress, list). All resources are released by RAII; exit
//! code 0 on success, 1 on any failure, 2 from the interrupt handler.

use std::io::IsTerminal;

use zstdr::cli::{detect_alias, format_suffix, parse_args, print_usage, OpMode, ParsedArgs};
use zstdr::io::names::determine_dst_name;
use zstdr::io::{
    compress_filename, compress_multiple_filenames, decompress_filename,
    decompress_multiple_filenames, list_multiple_files, set_notification_level,
    set_progress_setting, FileIoCtx, Prefs, STDIN_MARK, STDOUT_MARK,
};

fn run(args: ParsedArgs) -> i32 {
    let mut prefs: Prefs = args.prefs;
    let mut op_mode = args.op_mode;
    let c_level = args.c_level;
    let force_stdout = args.force_stdout;
    let mut in_file_names = args.in_file_names;
    let mut output_filename = args.output_filename;
    let dictionary_filename = args.dictionary_filename;
    let out_dir = args.out_dir;

    set_notification_level(args.display_level);
    if let Some(p) = args.progress {
        set_progress_setting(p);
    }

    // Test mode is decompression with a discarded output.
    if op_mode == OpMode::Test {
        prefs.test_mode = true;
        op_mode = OpMode::Decompress;
    }

    // Default input is stdin; refuse to read binary data from a console.
    if in_file_names.is_empty() {
        in_file_names.push(STDIN_MARK.to_owned());
    }
    if in_file_names.iter().any(|n| n == STDIN_MARK) && std::io::stdin().is_terminal() {
        eprintln!("zstdr: refusing to read from a console");
        return 1;
    }
    // Reading stdin implies writing stdout unless told otherwise.
    if in_file_names == [STDIN_MARK] && output_filename.is_none() {
        output_filename = Some(STDOUT_MARK.to_owned());
    }

    let multiple_inputs = in_file_names.len() > 1;

    // Auto mode: a recognised compressed suffix means decompress.
    if op_mode == OpMode::Auto {
        let looks_compressed = in_file_names[0]
            .rfind('.')
            .map(|i| zstdr::io::names::is_decompress_suffix(&in_file_names[0][i..]))
            .unwrap_or(false);
        op_mode = if looks_compressed {
            OpMode::Decompress
        } else {
            OpMode::Compress
        };
    }

    // Refuse to splash compressed bytes onto a terminal without -c.
    if output_filename.as_deref() == Some(STDOUT_MARK)
        && op_mode != OpMode::List
        && std::io::stdout().is_terminal()
        && !force_stdout
    {
        eprintln!("zstdr: refusing to write to console without -c");
        return 1;
    }
    if output_filename.as_deref() == Some(STDOUT_MARK) && args.display_level == 2 {
        set_notification_level(1);
    }

    let mut fctx = FileIoCtx::new();
    fctx.nb_files_total = in_file_names.len();
    {
        let refs: Vec<&str> = in_file_names.iter().map(|s| s.as_str()).collect();
        fctx.determine_has_stdin_input(&refs);
    }
    fctx.has_stdout_output = output_filename.as_deref() == Some(STDOUT_MARK);

    let srcs: Vec<&str> = in_file_names.iter().map(|s| s.as_str()).collect();
    let dict = dictionary_filename.as_deref();

    match op_mode {
        OpMode::List => match list_multiple_files(&srcs) {
            Ok(0) => 0,
            Ok(_) => 1,
            Err(e) => {
                eprintln!("{}", e);
                1
            }
        },
        OpMode::Decompress => {
            if multiple_inputs || (output_filename.is_none() && out_dir.is_some()) {
                match decompress_multiple_filenames(
                    &mut fctx,
                    &mut prefs,
                    &srcs,
                    out_dir.as_deref(),
                    output_filename.as_deref(),
                    dict,
                ) {
                    Ok(0) => 0,
                    Ok(_) => 1,
                    Err(e) => {
                        eprintln!("zstdr: {}", e);
                        1
                    }
                }
            } else {
                // Single input: derive the output name when none was given.
                let dst = match output_filename {
                    Some(ref name) => name.clone(),
                    None => match determine_dst_name(&in_file_names[0], out_dir.as_deref()) {
                        Some(n) => n,
                        None => {
                            print_usage(&args.exe_name);
                            return 1;
                        }
                    },
                };
                match decompress_filename(&mut fctx, &mut prefs, &dst, &in_file_names[0], dict) {
                    Ok(_) => 0,
                    Err(e) => {
                        eprintln!("zstdr: {}", e);
                        1
                    }
                }
            }
        }
        _ => {
            // Compress (default).
            let suffix = format_suffix(prefs.compression_type);
            if multiple_inputs || output_filename.is_none() && out_dir.is_some() {
                match compress_multiple_filenames(
                    &mut fctx,
                    &mut prefs,
                    &srcs,
                    out_dir.as_deref(),
                    output_filename.as_deref(),
                    suffix,
                    dict,
                    c_level,
                ) {
                    Ok(0) => 0,
                    Ok(_) => 1,
                    Err(e) => {
                        eprintln!("zstdr: {}", e);
                        1
                    }
                }
            } else {
                let dst = output_filename
                    .unwrap_or_else(|| format!("{}{}", in_file_names[0], suffix));
                match compress_filename(&mut fctx, &mut prefs, &dst, &in_file_names[0], dict, c_level)
                {
                    Ok(()) => 0,
                    Err(e) => {
                        eprintln!("zstdr: {}", e);
                        1
                    }
                }
            }
        }
    }
}

fn main() {
    let argv: Vec<String> = std::env::args().collect();
    let init = detect_alias(argv.first().map(|s| s.as_str()).unwrap_or("zstdr"));

    let args = match parse_args(&argv, init) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("zstdr: {}", e);
            std::process::exit(1);
        }
    };
    if args.exit_early {
        std::process::exit(0);
    }

    std::process::exit(run(args));
}
