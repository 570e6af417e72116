//! Status category counts and change-only emission.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::constants::{CATEGORY_UNKNOWN, STATUS_CATEGORIES};
use crate::source::SnapshotSource;
use crate::window::TimeWindow;
use crate::ErResult;

/// Map a raw status string to its category label.
///
/// Matching ignores case and surrounding whitespace. Blank or unrecognised statuses land in
/// [`CATEGORY_UNKNOWN`].
pub fn categorize(raw_status: &str) -> &'static str {
    let status = raw_status.trim().to_lowercase();
    STATUS_CATEGORIES
        .iter()
        .find(|(_, statuses)| statuses.iter().any(|s| *s == status))
        .map_or(CATEGORY_UNKNOWN, |(label, _)| *label)
}

/// Row counts per status category for one window read.
///
/// Equality only looks at the emitted categories; the unknown bucket is carried for logging.
#[derive(Debug, Clone, Default)]
pub struct StatusCounts {
    categories: BTreeMap<String, i64>,
    unknown: i64,
}

impl StatusCounts {
    /// Fold raw `(status, count)` pairs into categories. Every category is present, zero if
    /// nothing matched it.
    pub fn from_raw_counts(raw: impl IntoIterator<Item = (String, i64)>) -> Self {
        let mut categories: BTreeMap<String, i64> = STATUS_CATEGORIES
            .iter()
            .map(|(label, _)| ((*label).to_string(), 0))
            .collect();
        let mut unknown = 0;

        for (status, count) in raw {
            match categorize(&status) {
                CATEGORY_UNKNOWN => unknown += count,
                label => *categories.entry(label.to_string()).or_default() += count,
            }
        }

        Self {
            categories,
            unknown,
        }
    }

    /// The emitted category counts, keyed by label.
    pub fn categories(&self) -> &BTreeMap<String, i64> {
        &self.categories
    }

    pub fn get(&self, label: &str) -> i64 {
        self.categories.get(label).copied().unwrap_or(0)
    }

    /// Rows whose status matched no category.
    pub fn unknown(&self) -> i64 {
        self.unknown
    }
}

impl PartialEq for StatusCounts {
    fn eq(&self, other: &Self) -> bool {
        self.categories == other.categories
    }
}

impl Eq for StatusCounts {}

/// Per-stream count watcher. Remembers the last snapshot it handed out.
pub struct StatusAggregator {
    source: Arc<dyn SnapshotSource>,
    last_sent: Option<StatusCounts>,
}

impl StatusAggregator {
    pub fn new(source: Arc<dyn SnapshotSource>) -> Self {
        Self {
            source,
            last_sent: None,
        }
    }

    /// Read the counts for the window anchored at `today`.
    pub async fn read(&self, today: NaiveDate) -> ErResult<StatusCounts> {
        let raw = self
            .source
            .count_statuses(&TimeWindow::for_day(today))
            .await?;
        Ok(StatusCounts::from_raw_counts(raw))
    }

    /// The snapshot sent on attach. Always returned, and remembered as the last sent.
    ///
    /// # Errors
    ///
    /// Propagates the source error; the caller fails the stream.
    pub async fn first(&mut self, today: NaiveDate) -> ErResult<StatusCounts> {
        let counts = self.read(today).await?;
        self.last_sent = Some(counts.clone());
        Ok(counts)
    }

    /// Read again and return the counts only if they differ from the last sent ones.
    ///
    /// A failed read is logged and treated as "nothing to send".
    pub async fn poll(&mut self, today: NaiveDate) -> Option<StatusCounts> {
        match self.read(today).await {
            Ok(counts) => self.observe(counts),
            Err(e) => {
                warn!(error = %e, "status count read failed; skipping tick");
                None
            }
        }
    }

    /// Compare `counts` with the last sent snapshot. Returns it, and records it, when it differs.
    pub fn observe(&mut self, counts: StatusCounts) -> Option<StatusCounts> {
        if self.last_sent.as_ref() == Some(&counts) {
            return None;
        }
        debug!(
            categories = ?counts.categories(),
            unknown = counts.unknown(),
            "status counts changed"
        );
        self.last_sent = Some(counts.clone());
        Some(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CATEGORY_COMPLETED, CATEGORY_IN_TREATMENT, CATEGORY_WAITING};
    use crate::patient::fixtures::{at, record, today};
    use crate::source::InMemorySource;

    fn raw(pairs: &[(&str, i64)]) -> Vec<(String, i64)> {
        pairs.iter().map(|(s, n)| (s.to_string(), *n)).collect()
    }

    #[test]
    fn test_categorize_ignores_case_and_whitespace() {
        assert_eq!(categorize("Waiting"), CATEGORY_WAITING);
        assert_eq!(categorize("  TRIAGE "), CATEGORY_WAITING);
        assert_eq!(categorize("In Treatment"), CATEGORY_IN_TREATMENT);
        assert_eq!(categorize("discharged"), CATEGORY_COMPLETED);
        assert_eq!(categorize(""), CATEGORY_UNKNOWN);
        assert_eq!(categorize("lost"), CATEGORY_UNKNOWN);
    }

    #[test]
    fn test_from_raw_counts_folds_into_categories() {
        let counts = StatusCounts::from_raw_counts(raw(&[
            ("waiting", 2),
            ("Registered", 1),
            ("examining", 3),
            ("admitted", 1),
            ("", 4),
        ]));

        assert_eq!(counts.get(CATEGORY_WAITING), 3);
        assert_eq!(counts.get(CATEGORY_IN_TREATMENT), 3);
        assert_eq!(counts.get(CATEGORY_COMPLETED), 1);
        assert_eq!(counts.unknown(), 4);
        assert!(!counts.categories().contains_key(CATEGORY_UNKNOWN));
    }

    #[test]
    fn test_empty_input_has_every_category_at_zero() {
        let counts = StatusCounts::from_raw_counts(Vec::new());
        assert_eq!(counts.categories().len(), 3);
        assert!(counts.categories().values().all(|n| *n == 0));
    }

    #[test]
    fn test_unknown_bucket_does_not_affect_equality() {
        let a = StatusCounts::from_raw_counts(raw(&[("waiting", 1)]));
        let b = StatusCounts::from_raw_counts(raw(&[("waiting", 1), ("mystery", 9)]));
        assert_eq!(a, b);
    }

    #[test]
    fn test_observe_emits_only_on_change() {
        let source = Arc::new(InMemorySource::new());
        let mut aggregator = StatusAggregator::new(source);

        let first = StatusCounts::from_raw_counts(raw(&[("waiting", 1)]));
        assert!(aggregator.observe(first.clone()).is_some());
        assert!(aggregator.observe(first).is_none());

        let changed = StatusCounts::from_raw_counts(raw(&[("waiting", 1), ("examining", 1)]));
        let sent = aggregator.observe(changed).unwrap();
        assert_eq!(sent.get(CATEGORY_IN_TREATMENT), 1);
        assert_eq!(sent.categories().len(), 3);
    }

    #[tokio::test]
    async fn test_identical_ticks_then_one_change() {
        let source = Arc::new(InMemorySource::with_rows(vec![record(
            1, "P1", "waiting", at(9, 0, 0),
        )]));
        let mut aggregator = StatusAggregator::new(source.clone());

        let first = aggregator.first(today()).await.unwrap();
        assert_eq!(first.get(CATEGORY_WAITING), 1);
        assert!(aggregator.poll(today()).await.is_none());
        assert!(aggregator.poll(today()).await.is_none());

        source.push(record(2, "P2", "examining", at(9, 5, 0))).await;
        let next = aggregator.poll(today()).await.unwrap();
        assert_eq!(next.get(CATEGORY_WAITING), 1);
        assert_eq!(next.get(CATEGORY_IN_TREATMENT), 1);
        assert!(aggregator.poll(today()).await.is_none());
    }

    #[tokio::test]
    async fn test_failed_read_is_skipped() {
        let source = Arc::new(InMemorySource::new());
        let mut aggregator = StatusAggregator::new(source.clone());
        aggregator.first(today()).await.unwrap();

        source.set_failing(true);
        assert!(aggregator.poll(today()).await.is_none());
        assert!(aggregator.first(today()).await.is_err());
    }
}
