// build.rs — platform detection for the zstdr programs layer.
//
// Emits `cargo:rustc-cfg=has_sparse_files` on Unix targets. On POSIX systems
// sparse files need no preparation: seeking past EOF and writing creates
// holes natively. On Windows an explicit FSCTL_SET_SPARSE ioctl would be
// required, which this build does not perform; the sparse path degrades to
// plain writes there.
fn main() {
    println!("cargo:rustc-check-cfg=cfg(has_sparse_files)");
    if std::env::var("CARGO_CFG_UNIX").is_ok() {
        println!("cargo:rustc-cfg=has_sparse_files");
    }
}
