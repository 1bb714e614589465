//! `zstdr` — a Rust implementation of the `zstd` command-line tool's file
//! I/O layer, with the Zstandard codec supplied by statically linked
//! libzstd.
//!
//! # Crate layout
//!
//! | Module   | Contents |
//! |----------|----------|
//! | `io`     | File-level I/O: compress / decompress single and multiple files, `--list`, sparse writes, signal cleanup. |
//! | `zstd`   | Safe wrappers over the libzstd streaming API (`zstd-sys`). |
//! | `cli`    | Command-line argument parsing and dispatch. |
//! | `config` | Compile-time configuration constants. |
//! | `util`   | File metadata and size-formatting utilities. |
//! | `timefn` | Monotonic high-resolution timer. |
//!
//! Optional codecs ride behind cargo features: `gzip` (flate2), `xz`
//! (liblzma via xz2), `lz4` (lz4_flex). All three are on by default.

pub mod cli;
pub mod config;
pub mod io;
pub mod timefn;
pub mod util;
pub mod zstd;

/// Version string reported by `-V`.
pub const ZSTDR_VERSION_STRING: &str = env!("CARGO_PKG_VERSION");
