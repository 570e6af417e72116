//! # API gRPC
//!
//! gRPC server implementation for the ER watch.
//!
//! Handles:
//! - The `ErWatch` service, backed by an `er-core` [`er_core::PatientFeed`]
//! - Per-call stream loops and their shutdown behaviour
//! - gRPC-specific concerns (API-key interceptor, status mapping, pb conversion)
//!
//! Uses `api-shared` for the generated types.

#![warn(rust_2018_idioms)]

pub mod auth;
pub mod convert;
pub mod service;
pub mod stream;

pub use api_shared::pb;
pub use auth::ApiKeyInterceptor;
pub use service::ErWatchService;
pub use stream::StreamState;
