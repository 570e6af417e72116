//! # API Shared
//!
//! Shared definitions for the ER watch API.
//!
//! Contains:
//! - Protobuf-generated types (`pb` module)
//! - The `HealthService` behind the health RPC
//! - API key validation (`auth`)
//! - The encoded file descriptor set for gRPC reflection
//!
//! Used by `api-grpc` and the `er-run` binary.

// Re-export the generated protobuf module. The generated code will be placed
// into OUT_DIR at build time by the build script.
pub mod pb {
    tonic::include_proto!("er.v1");
}

pub mod auth;
pub mod health;

pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("proto_descriptor");

pub use health::HealthService;
pub use pb::*;
