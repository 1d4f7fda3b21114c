// build.rs — docsnip-pdfium
//
// Handles the optional `bundled` feature: when active and `PDFIUM_BUNDLE_LIB`
// is set, copies the platform pdfium shared library into Cargo's output
// directory and generates a tiny Rust source file that embeds the bytes with
// `include_bytes!`. When the env var is absent the generated file carries
// `None` and the runtime download path takes over, so a plain `cargo build`
// always succeeds.

use std::path::PathBuf;

fn main() {
    // Rerun this script only when relevant inputs change.
    println!("cargo:rerun-if-env-changed=PDFIUM_BUNDLE_LIB");
    println!("cargo:rerun-if-env-changed=CARGO_FEATURE_BUNDLED");

    // Nothing to do unless the `bundled` feature has been activated.
    if std::env::var("CARGO_FEATURE_BUNDLED").is_err() {
        return;
    }

    let out_dir = PathBuf::from(std::env::var("OUT_DIR").expect("OUT_DIR not set"));
    let bundled_rs = out_dir.join("bundled.rs");

    // ── Locate the source library ─────────────────────────────────────────
    let lib_src = match std::env::var("PDFIUM_BUNDLE_LIB") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => {
            println!(
                "cargo:warning=docsnip-pdfium: `bundled` active but PDFIUM_BUNDLE_LIB \
                 is not set; falling back to runtime download"
            );
            write_generated(
                &bundled_rs,
                "pub static PDFIUM_BYTES: Option<&[u8]> = None;\n",
            );
            return;
        }
    };

    if !lib_src.exists() {
        panic!(
            "docsnip-pdfium: PDFIUM_BUNDLE_LIB points to a file that does not exist: {}",
            lib_src.display()
        );
    }

    // ── Copy into OUT_DIR with a fixed, platform-neutral name ─────────────
    let lib_dest = out_dir.join("bundled_pdfium_lib");

    std::fs::copy(&lib_src, &lib_dest).unwrap_or_else(|e| {
        panic!(
            "docsnip-pdfium: failed to copy {} → {}: {}",
            lib_src.display(),
            lib_dest.display(),
            e
        )
    });

    // ── Generate bundled.rs ───────────────────────────────────────────────
    // We generate a tiny Rust source file rather than using `include_bytes!`
    // directly in lib.rs because the path argument to `include_bytes!` must
    // be a string literal known at the macro expansion site.  Writing the
    // macro invocation into a generated file and using `include!()` is the
    // standard Cargo pattern for this.
    write_generated(
        &bundled_rs,
        "pub static PDFIUM_BYTES: Option<&[u8]> = Some(include_bytes!(\"bundled_pdfium_lib\"));\n",
    );

    // Inform Cargo that bundled.rs should trigger a rebuild when changed.
    println!("cargo:rerun-if-changed={}", lib_dest.display());
}

fn write_generated(path: &PathBuf, code: &str) {
    std::fs::write(path, code).unwrap_or_else(|e| {
        panic!("docsnip-pdfium: failed to write {}: {}", path.display(), e)
    });
}
