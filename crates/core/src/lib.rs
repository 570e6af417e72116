//! # ER Core
//!
//! Change detection and streaming engine for the emergency-room patient board.
//!
//! The ER log table has no change feed. This crate turns periodic snapshots of it into
//! insert/update/delete events:
//! - [`source`] reads rows in the rolling window ([`window`]), from PostgreSQL or memory
//! - [`reducer`] keeps the latest row per hospital number
//! - [`diff`] classifies what changed since the previous tick
//! - [`publisher`] fans tick batches out to every subscriber's own queue
//! - [`poller`] drives the above on a fixed interval
//! - [`status`] folds raw statuses into categories and emits only on change
//!
//! **No API concerns**: gRPC services, status codes and wire types belong in `api-grpc` and
//! `api-shared`.

pub mod config;
pub mod constants;
pub mod diff;
pub mod error;
pub mod feed;
pub mod patient;
pub mod poller;
pub mod postgres;
pub mod publisher;
pub mod reducer;
pub mod render;
pub mod source;
pub mod status;
pub mod window;

pub use config::WatchConfig;
pub use diff::{diff_snapshots, ChangeEvent, ChangeKind};
pub use error::{ErError, ErResult};
pub use feed::PatientFeed;
pub use patient::PatientRecord;
pub use poller::{PatientDiffLoop, TickOutcome};
pub use postgres::{create_pool, PgSnapshotSource};
pub use publisher::{Publisher, Subscription, SubscriptionId, TickBatch};
pub use reducer::{reduce_latest, ReducedSnapshot};
pub use source::{InMemorySource, SnapshotSource};
pub use status::{StatusAggregator, StatusCounts};
pub use window::TimeWindow;
