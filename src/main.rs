use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tonic::transport::Server;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_grpc::pb::er_watch_server::ErWatchServer;
use api_grpc::{ApiKeyInterceptor, ErWatchService};
use api_shared::{FILE_DESCRIPTOR_SET, auth::api_key_from_env_value};
use er_core::config::{
    poll_interval_from_env_value, subscriber_capacity_from_env_value, utc_offset_from_env_value,
};
use er_core::{InMemorySource, PatientFeed, PgSnapshotSource, SnapshotSource, WatchConfig};

const DEFAULT_ADDR: &str = "0.0.0.0:50051";
const DEFAULT_DB_POOL_SIZE: u32 = 5;

/// Main entry point for the ER watch server
///
/// Starts the patient poll loop and the gRPC server, and runs both until Ctrl-C.
///
/// # Environment Variables
/// - `ER_ADDR`: gRPC server address (default: "0.0.0.0:50051")
/// - `ER_DATABASE_URL`: PostgreSQL URL of the ER database
/// - `ER_FIXTURE_FILE`: JSON patient rows served from memory when no database URL is set
/// - `ER_DB_POOL_SIZE`: maximum pooled connections (default: 5)
/// - `ER_POLL_INTERVAL_SECS`: seconds between polls (default: 5)
/// - `ER_SUBSCRIBER_CAPACITY`: queued tick batches per stream subscriber (default: 64)
/// - `ER_UTC_OFFSET`: the site's UTC offset, e.g. "+07:00" (default: host offset)
/// - `API_KEY`: when set, every call must carry it in `x-api-key`
/// - `ER_ENABLE_REFLECTION`: register gRPC reflection when "true"
///
/// # Returns
/// * `Ok(())` - If the server ran and shut down cleanly
/// * `Err(anyhow::Error)` - If configuration, the data source, or the server failed
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("er=info".parse()?)
                .add_directive("api_grpc=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr: SocketAddr = std::env::var("ER_ADDR")
        .unwrap_or_else(|_| DEFAULT_ADDR.into())
        .parse()
        .context("ER_ADDR must be a socket address")?;

    let config = WatchConfig::new(
        poll_interval_from_env_value(std::env::var("ER_POLL_INTERVAL_SECS").ok())?,
        subscriber_capacity_from_env_value(std::env::var("ER_SUBSCRIBER_CAPACITY").ok())?,
        utc_offset_from_env_value(std::env::var("ER_UTC_OFFSET").ok())?,
    )?;
    let api_key = api_key_from_env_value(std::env::var("API_KEY").ok());
    let reflection = std::env::var("ER_ENABLE_REFLECTION")
        .map(|v| v.trim().eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let source = snapshot_source().await?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for shutdown signal");
        }
        tracing::info!("-- Shutdown requested");
        signal_token.cancel();
    });

    let feed = PatientFeed::new(source, config.clone());
    let poll = feed.start(shutdown.clone());

    let interceptor = ApiKeyInterceptor::new(api_key);
    if !interceptor.is_enabled() {
        tracing::warn!("API_KEY not set; gRPC calls are unauthenticated");
    }

    let reflection_service = if reflection {
        Some(
            tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
                .build_v1()?,
        )
    } else {
        None
    };

    tracing::info!(
        interval_secs = config.poll_interval().as_secs(),
        utc_offset = %config.utc_offset(),
        "++ Starting ER watch gRPC on {}",
        addr
    );

    let server_token = shutdown.clone();
    Server::builder()
        .add_service(ErWatchServer::with_interceptor(
            ErWatchService::new(feed, shutdown.clone()),
            interceptor,
        ))
        .add_optional_service(reflection_service)
        .serve_with_shutdown(addr, async move { server_token.cancelled().await })
        .await?;

    shutdown.cancel();
    poll.await?;
    tracing::info!("-- ER watch stopped");

    Ok(())
}

/// Pick the snapshot source: the ER database when `ER_DATABASE_URL` is set, otherwise the rows in
/// `ER_FIXTURE_FILE`.
async fn snapshot_source() -> anyhow::Result<Arc<dyn SnapshotSource>> {
    if let Ok(url) = std::env::var("ER_DATABASE_URL") {
        let pool_size = match std::env::var("ER_DB_POOL_SIZE") {
            Ok(v) => v
                .trim()
                .parse::<u32>()
                .context("ER_DB_POOL_SIZE must be a positive integer")?,
            Err(_) => DEFAULT_DB_POOL_SIZE,
        };
        let pool = er_core::create_pool(&url, pool_size).await?;
        return Ok(Arc::new(PgSnapshotSource::new(pool)));
    }

    if let Ok(path) = std::env::var("ER_FIXTURE_FILE") {
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read ER_FIXTURE_FILE {path}"))?;
        let source = InMemorySource::from_json(&json)?;
        tracing::info!("++ Serving ER patients from fixture {}", path);
        return Ok(Arc::new(source));
    }

    anyhow::bail!("set ER_DATABASE_URL or ER_FIXTURE_FILE")
}
