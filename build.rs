// SPDX-License-Identifier: MIT
// © 2025–2026 Christopher Liu

use std::env;
use std::fs;
use std::path::PathBuf;

fn main() {
    // Put the memory layout where the cortex-m-rt linker script can find it
    let out = PathBuf::from(env::var_os("OUT_DIR").expect("OUT_DIR not set"));
    fs::copy("memory.x", out.join("memory.x")).expect("Failed to copy memory.x");
    println!("cargo:rustc-link-search={}", out.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}
