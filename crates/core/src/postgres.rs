//! PostgreSQL snapshot source.
//!
//! Reads the `er_patient_logs` table written by the ER registration system. Every query takes a
//! connection from the pool for its own duration only, so concurrent reads (poll loop, RPC
//! reads, aggregator streams) never share a session.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDateTime, NaiveTime};
use sqlx_core::pool::PoolOptions;
use sqlx_core::query_as::query_as;
use sqlx_postgres::{PgPool, Postgres};
use tracing::{debug, info, instrument};

use crate::constants::PATIENT_LOG_TABLE;
use crate::patient::PatientRecord;
use crate::source::SnapshotSource;
use crate::window::TimeWindow;
use crate::ErResult;

/// Type alias for PostgreSQL pool options.
pub type PgPoolOptions = PoolOptions<Postgres>;

/// Row shape of a window query, in `SELECT` column order.
type LogRow = (
    i32,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<NaiveTime>,
    Option<String>,
    Option<String>,
    Option<NaiveDateTime>,
);

/// Creates a connection pool for the ER database.
#[instrument(skip(url), fields(url = %mask_password(url)))]
pub async fn create_pool(url: &str, pool_size: u32) -> ErResult<PgPool> {
    info!(pool_size, "Creating ER database connection pool");

    let pool = PgPoolOptions::new()
        .max_connections(pool_size.max(1))
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;

    debug!("ER database connection pool created");
    Ok(pool)
}

/// Snapshot source over a PostgreSQL pool.
#[derive(Debug, Clone)]
pub struct PgSnapshotSource {
    pool: PgPool,
}

impl PgSnapshotSource {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SnapshotSource for PgSnapshotSource {
    #[instrument(skip(self), fields(start = %window.start(), end = %window.end()))]
    async fn fetch_window(&self, window: &TimeWindow) -> ErResult<Vec<PatientRecord>> {
        let sql = format!(
            "SELECT id, hn, fname, lname, pname, enter_er_time, emergency_type, \
             current_status, status_updated_at \
             FROM {PATIENT_LOG_TABLE} \
             WHERE status_updated_at >= $1 AND status_updated_at < $2"
        );

        let rows: Vec<LogRow> = query_as::<Postgres, LogRow>(&sql)
            .bind(window.start())
            .bind(window.end())
            .fetch_all(&self.pool)
            .await?;

        debug!(rows = rows.len(), "fetched ER log window");
        Ok(rows.into_iter().map(record_from_row).collect())
    }

    #[instrument(skip(self), fields(start = %window.start(), end = %window.end()))]
    async fn count_statuses(&self, window: &TimeWindow) -> ErResult<Vec<(String, i64)>> {
        let sql = format!(
            "SELECT COALESCE(current_status, ''), COUNT(*) \
             FROM {PATIENT_LOG_TABLE} \
             WHERE status_updated_at >= $1 AND status_updated_at < $2 \
             GROUP BY COALESCE(current_status, '')"
        );

        let rows: Vec<(String, i64)> = query_as::<Postgres, (String, i64)>(&sql)
            .bind(window.start())
            .bind(window.end())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}

fn record_from_row(row: LogRow) -> PatientRecord {
    let (
        id,
        hn,
        fname,
        lname,
        pname,
        enter_er_time,
        emergency_type,
        current_status,
        status_updated_at,
    ) = row;

    PatientRecord {
        id,
        hn: hn.unwrap_or_default(),
        fname: fname.unwrap_or_default(),
        lname: lname.unwrap_or_default(),
        pname: pname.unwrap_or_default(),
        enter_er_time,
        emergency_type: emergency_type.unwrap_or_default(),
        current_status: current_status.unwrap_or_default(),
        status_updated_at,
    }
}

/// Masks the password in a database URL for logging.
fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
            if colon_pos > scheme_end {
                return format!("{}:****{}", &url[..colon_pos], &url[at_pos..]);
            }
        }
    }
    url.to_string()
}
