//! Periodic snapshot poll and change detection.
//!
//! A single loop per process reads the window, reduces it, diffs it against the previous tick's
//! snapshot and hands any changes to the [`Publisher`]. The baseline only ever moves forward on a
//! fully successful tick.
//!
//! The baseline starts empty, so the first successful tick reports every patient as inserted. A
//! subscriber whose initial batch was read before that tick still learns about anything that
//! changed in between; the others see a harmless duplicate.

use std::sync::Arc;

use chrono::NaiveDate;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchConfig;
use crate::diff::diff_snapshots;
use crate::publisher::{Publisher, TickBatch};
use crate::reducer::{reduce_latest, ReducedSnapshot};
use crate::source::SnapshotSource;
use crate::window::TimeWindow;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Changes were found and offered to subscribers.
    Published { events: usize, delivered: usize },
    /// The snapshot matched the baseline.
    Unchanged,
    /// The read failed; the baseline was left untouched.
    Skipped,
}

/// Owns the change-detection baseline.
pub struct PatientDiffLoop {
    source: Arc<dyn SnapshotSource>,
    publisher: Arc<Publisher>,
    baseline: ReducedSnapshot,
    ticks: u64,
}

impl PatientDiffLoop {
    pub fn new(source: Arc<dyn SnapshotSource>, publisher: Arc<Publisher>) -> Self {
        Self {
            source,
            publisher,
            baseline: ReducedSnapshot::new(),
            ticks: 0,
        }
    }

    /// The snapshot the next tick will be compared with. Empty until the first successful read.
    pub fn baseline(&self) -> &ReducedSnapshot {
        &self.baseline
    }

    /// Run one poll against the window anchored at `today`.
    pub async fn tick(&mut self, today: NaiveDate) -> TickOutcome {
        let window = TimeWindow::for_day(today);

        let rows = match self.source.fetch_window(&window).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "snapshot read failed; keeping previous baseline");
                return TickOutcome::Skipped;
            }
        };

        let current = reduce_latest(rows);
        self.ticks += 1;

        if self.ticks == 1 {
            info!(patients = current.len(), "first patient snapshot read");
        }

        let events = diff_snapshots(&self.baseline, &current);
        self.baseline = current;
        if events.is_empty() {
            return TickOutcome::Unchanged;
        }

        let count = events.len();
        let delivered = self.publisher.publish(TickBatch {
            tick: self.ticks,
            events,
        });
        debug!(tick = self.ticks, events = count, delivered, "published patient changes");

        TickOutcome::Published {
            events: count,
            delivered,
        }
    }

    /// Tick every `config.poll_interval()` until `shutdown` fires.
    ///
    /// When the loop ends, for whatever reason, the publisher is closed so attached streams are
    /// not left waiting on a feed that will never speak again.
    pub async fn run(mut self, config: WatchConfig, shutdown: CancellationToken) {
        let _close = CloseOnExit(Arc::clone(&self.publisher));

        let mut interval = time::interval(config.poll_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = config.poll_interval().as_secs(),
            "patient poll loop started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let outcome = tokio::select! {
                _ = shutdown.cancelled() => break,
                outcome = self.tick(config.today()) => outcome,
            };
            debug!(?outcome, "patient poll tick finished");
        }

        info!("patient poll loop stopped");
    }

    /// Spawn [`Self::run`] on the current runtime.
    pub fn spawn(self, config: WatchConfig, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(config, shutdown))
    }
}

struct CloseOnExit(Arc<Publisher>);

impl Drop for CloseOnExit {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::FixedOffset;

    use super::*;
    use crate::diff::{ChangeEvent, ChangeKind};
    use crate::patient::fixtures::{at, record, today};
    use crate::patient::PatientRecord;
    use crate::source::InMemorySource;
    use crate::ErError;

    fn setup(
        rows: Vec<PatientRecord>,
    ) -> (Arc<InMemorySource>, Arc<Publisher>, PatientDiffLoop) {
        let source = Arc::new(InMemorySource::with_rows(rows));
        let publisher = Publisher::new(8);
        let poll = PatientDiffLoop::new(source.clone(), publisher.clone());
        (source, publisher, poll)
    }

    #[tokio::test]
    async fn test_first_tick_reports_every_patient_as_inserted() {
        let (_source, publisher, mut poll) = setup(vec![
            record(1, "P1", "waiting", at(9, 0, 0)),
            record(2, "P2", "triage", at(9, 1, 0)),
        ]);
        let mut sub = publisher.subscribe();

        assert_eq!(
            poll.tick(today()).await,
            TickOutcome::Published {
                events: 2,
                delivered: 1
            }
        );
        assert_eq!(poll.tick(today()).await, TickOutcome::Unchanged);

        let batch = sub.recv().await.unwrap();
        let kinds: Vec<_> = batch
            .events
            .iter()
            .map(|e| (e.kind().unwrap(), e.hn().unwrap().to_string()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::Inserted, "P1".to_string()),
                (ChangeKind::Inserted, "P2".to_string()),
            ]
        );

        publisher.close();
        assert!(matches!(sub.recv().await, Err(ErError::FeedClosed)));
    }

    #[tokio::test]
    async fn test_subscriber_attached_before_first_read_sees_later_change() {
        let (source, publisher, mut poll) = setup(vec![record(1, "P1", "waiting", at(9, 0, 0))]);

        source.set_failing(true);
        assert_eq!(poll.tick(today()).await, TickOutcome::Skipped);
        source.set_failing(false);

        // Attach the way a stream does: register, then read the initial batch.
        let mut sub = publisher.subscribe();
        let initial = reduce_latest(
            source
                .fetch_window(&TimeWindow::for_day(today()))
                .await
                .unwrap(),
        );
        assert_eq!(initial.get("P1").unwrap().current_status, "waiting");

        source.push(record(2, "P1", "examining", at(9, 5, 0))).await;
        assert!(matches!(
            poll.tick(today()).await,
            TickOutcome::Published { delivered: 1, .. }
        ));
        assert_eq!(poll.tick(today()).await, TickOutcome::Unchanged);

        let batch = sub.recv().await.unwrap();
        let latest = batch
            .events
            .iter()
            .find(|e| e.hn() == Some("P1"))
            .unwrap();
        match latest {
            ChangeEvent::Inserted(r) | ChangeEvent::Updated(r) => {
                assert_eq!(r.current_status, "examining")
            }
            other => panic!("expected P1 to be reported, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_status_change_publishes_update() {
        let (source, publisher, mut poll) = setup(vec![record(1, "P1", "waiting", at(0, 0, 10))]);
        poll.tick(today()).await;
        let mut sub = publisher.subscribe();

        source.push(record(2, "P1", "examining", at(0, 0, 20))).await;
        assert_eq!(
            poll.tick(today()).await,
            TickOutcome::Published {
                events: 1,
                delivered: 1
            }
        );

        let batch = sub.recv().await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].kind(), Some(ChangeKind::Updated));
        match &batch.events[0] {
            ChangeEvent::Updated(r) => assert_eq!(r.current_status, "examining"),
            other => panic!("expected update, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_failed_read_keeps_baseline() {
        let (source, publisher, mut poll) = setup(vec![record(1, "P1", "waiting", at(9, 0, 0))]);
        poll.tick(today()).await;
        let mut sub = publisher.subscribe();
        let before = poll.baseline().clone();

        source.set_failing(true);
        source.push(record(2, "P2", "waiting", at(9, 5, 0))).await;
        assert_eq!(poll.tick(today()).await, TickOutcome::Skipped);
        assert_eq!(poll.baseline(), &before);

        // Once the source recovers, the change is reported against the old baseline.
        source.set_failing(false);
        assert!(matches!(
            poll.tick(today()).await,
            TickOutcome::Published { events: 1, .. }
        ));
        let batch = sub.recv().await.unwrap();
        assert_eq!(batch.events[0].hn(), Some("P2"));
        assert_eq!(batch.events[0].kind(), Some(ChangeKind::Inserted));
    }

    #[tokio::test]
    async fn test_failed_first_read_leaves_baseline_empty() {
        let (source, _publisher, mut poll) = setup(vec![record(1, "P1", "waiting", at(9, 0, 0))]);
        source.set_failing(true);
        assert_eq!(poll.tick(today()).await, TickOutcome::Skipped);
        assert!(poll.baseline().is_empty());
    }

    #[tokio::test]
    async fn test_leaving_window_publishes_delete() {
        let (source, publisher, mut poll) = setup(vec![
            record(1, "P1", "waiting", at(9, 0, 0)),
            record(2, "P2", "waiting", at(9, 0, 0)),
        ]);
        poll.tick(today()).await;
        let mut sub = publisher.subscribe();

        source.remove_hn("P1").await;
        poll.tick(today()).await;

        let batch = sub.recv().await.unwrap();
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].kind(), Some(ChangeKind::Deleted));
        assert_eq!(batch.events[0].hn(), Some("P1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown_and_closes_feed() {
        let (_source, publisher, poll) = setup(vec![record(1, "P1", "waiting", at(9, 0, 0))]);
        let mut sub = publisher.subscribe();
        let config = WatchConfig::new(
            Duration::from_secs(5),
            8,
            FixedOffset::east_opt(0).unwrap(),
        )
        .unwrap();
        let shutdown = CancellationToken::new();

        let handle = poll.spawn(config, shutdown.clone());
        time::sleep(Duration::from_secs(12)).await;
        shutdown.cancel();
        handle.await.unwrap();

        assert!(publisher.is_closed());
        assert!(matches!(sub.recv().await, Err(ErError::FeedClosed)));
    }
}
