//! Build script for the `api-shared` crate.
//!
//! ## Purpose
//! Generates Rust protobuf types from `er.proto` and emits a file-descriptor set.
//!
//! ## Intended use
//! The generated server types are used by `api-grpc` and the client types by callers and tests.
//! The descriptor set is used for gRPC reflection.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = env!("CARGO_MANIFEST_DIR");
    let proto_file = std::path::Path::new(manifest_dir).join("er.proto");
    let proto_include_root = std::path::Path::new(manifest_dir);

    // Prefer the vendored protoc so builds do not need a system installation.
    let protoc_path = protoc_bin_vendored::protoc_bin_path()
        .map_err(|e| format!("failed to locate vendored protoc: {e}"))?;
    std::env::set_var("PROTOC", protoc_path);

    println!("cargo:rerun-if-changed={}", proto_file.display());
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .file_descriptor_set_path(
            std::path::Path::new(&std::env::var("OUT_DIR")?).join("proto_descriptor.bin"),
        )
        .compile_protos(std::slice::from_ref(&proto_file), &[proto_include_root])?;

    Ok(())
}
