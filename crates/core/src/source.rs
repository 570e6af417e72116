//! Snapshot source abstraction.
//!
//! The ER log table has no change feed of its own; the core only ever reads it. Backends:
//! - [`crate::postgres::PgSnapshotSource`] for production
//! - [`InMemorySource`] for tests, demos and fixture-driven local runs

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::patient::PatientRecord;
use crate::window::TimeWindow;
use crate::{ErError, ErResult};

/// Read access to the ER patient log.
///
/// Implementations must be cheap to call concurrently: the poll loop, every `GetErPatients`
/// call, every stream attach and every status-count stream read independently.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// All rows whose status-update timestamp lies in `window`. May contain several rows per
    /// hospital number.
    async fn fetch_window(&self, window: &TimeWindow) -> ErResult<Vec<PatientRecord>>;

    /// Row counts per raw status string over `window`. A missing status is reported as `""`.
    async fn count_statuses(&self, window: &TimeWindow) -> ErResult<Vec<(String, i64)>>;
}

/// In-process snapshot source backed by a row list.
#[derive(Debug, Default)]
pub struct InMemorySource {
    rows: RwLock<Vec<PatientRecord>>,
    failing: AtomicBool,
    reads: AtomicU64,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<PatientRecord>) -> Self {
        Self {
            rows: RwLock::new(rows),
            ..Self::default()
        }
    }

    /// Load rows from a JSON array of patient records.
    pub fn from_json(json: &str) -> ErResult<Self> {
        let rows: Vec<PatientRecord> =
            serde_json::from_str(json).map_err(ErError::Deserialization)?;
        Ok(Self::with_rows(rows))
    }

    /// Append a log row, as the ER system does on every status change.
    pub async fn push(&self, row: PatientRecord) {
        self.rows.write().await.push(row);
    }

    /// Remove every row for `hn`. Returns how many rows were removed.
    pub async fn remove_hn(&self, hn: &str) -> usize {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.hn != hn);
        before - rows.len()
    }

    /// Make subsequent reads fail until switched back, simulating an unavailable database.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    /// Number of read calls served, failed ones included.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn begin_read(&self) -> ErResult<()> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        if self.failing.load(Ordering::Acquire) {
            return Err(ErError::Source("in-memory source marked unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotSource for InMemorySource {
    async fn fetch_window(&self, window: &TimeWindow) -> ErResult<Vec<PatientRecord>> {
        self.begin_read()?;
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|r| window.contains(r.status_updated_at))
            .cloned()
            .collect())
    }

    async fn count_statuses(&self, window: &TimeWindow) -> ErResult<Vec<(String, i64)>> {
        self.begin_read()?;
        let rows = self.rows.read().await;
        let mut counts: BTreeMap<String, i64> = BTreeMap::new();
        for row in rows.iter().filter(|r| window.contains(r.status_updated_at)) {
            *counts.entry(row.current_status.clone()).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
