//! Build script for the audio session library.
//!
//! Links the Windows libraries behind COM activation and token handling.

fn main() {
    // Only run on Windows
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() != Ok("windows") {
        return;
    }

    println!("cargo:rustc-link-lib=ole32");
    println!("cargo:rustc-link-lib=advapi32");
    println!("cargo:rerun-if-changed=build.rs");
}
