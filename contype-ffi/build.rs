use std::env;
use std::path::PathBuf;

use cbindgen::{Builder, Config, Language, Style};

const HEADER: &str = "contype_ffi.h";

fn main() {
    let crate_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR not set"));

    let config = Config {
        language: Language::C,
        include_guard: Some("CONTYPE_FFI_H".to_string()),
        style: Style::Type,
        cpp_compat: true,
        documentation: true,
        header: Some("/* Generated by cbindgen from contype-ffi. Do not edit. */".to_string()),
        ..Config::default()
    };

    match Builder::new().with_crate(&crate_dir).with_config(config).generate() {
        Ok(bindings) => {
            bindings.write_to_file(crate_dir.join(HEADER));
        }
        Err(e) => println!("cargo:warning=skipping {}: {}", HEADER, e),
    }

    println!("cargo:rerun-if-changed=src/lib.rs");
    println!("cargo:rerun-if-changed=build.rs");
}
