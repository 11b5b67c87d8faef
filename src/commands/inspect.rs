//! `modelrt inspect` subcommand

use std::path::Path;

use modelrt_runtime::{inspect_binary, AdapterRegistry, BinaryFormat, StoredBinary};

use super::{fail, print_json, read_file};

pub fn run(binary: &Path, format: BinaryFormat) {
    tracing::debug!(path = %binary.display(), format = %format, "Inspecting model binary");

    let stored = StoredBinary::new(read_file(binary), format);
    match inspect_binary(&AdapterRegistry::with_defaults(), &stored) {
        Ok(signature) => print_json(&signature),
        Err(e) => fail(&e),
    }
}
