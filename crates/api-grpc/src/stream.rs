//! Per-call send loops behind the two streaming RPCs.
//!
//! Each loop owns its response channel. It stops as soon as the client goes away or the server
//! shuts down, and never holds up the poll loop or another stream.

use api_shared::pb::{ErPatientUpdate, StatusCountsRes};
use chrono::FixedOffset;
use er_core::{
    ChangeEvent, ReducedSnapshot, StatusAggregator, StatusCounts, Subscription, WatchConfig,
};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tonic::Status;
use tracing::{debug, error, info};

use crate::convert::{counts_to_pb, event_to_update};

/// Lifecycle of one patient subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Attaching,
    InitialBatchSent,
    Streaming,
    /// The client left or the server is stopping.
    Closed,
    /// The event feed ended underneath the subscriber.
    Errored,
}

/// Sends the initial batch, then every live event, to one client.
pub struct PatientStream {
    subscription: Subscription,
    offset: FixedOffset,
    shutdown: CancellationToken,
    state: StreamState,
}

impl PatientStream {
    pub fn new(
        subscription: Subscription,
        offset: FixedOffset,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            subscription,
            offset,
            shutdown,
            state: StreamState::Attaching,
        }
    }

    /// Drive the subscription to completion. Returns the terminal state.
    pub async fn run(
        mut self,
        snapshot: ReducedSnapshot,
        tx: mpsc::Sender<Result<ErPatientUpdate, Status>>,
    ) -> StreamState {
        let id = self.subscription.id();
        info!(subscription = %id, patients = snapshot.len(), "patient stream attached");

        let initial = event_to_update(
            &ChangeEvent::InitialBatch(snapshot.to_records()),
            self.offset,
        );
        if !deliver(&tx, &self.shutdown, Ok(initial)).await {
            return self.finish(StreamState::Closed);
        }
        self.state = StreamState::InitialBatchSent;

        loop {
            let next = tokio::select! {
                _ = tx.closed() => return self.finish(StreamState::Closed),
                _ = self.shutdown.cancelled() => return self.finish(StreamState::Closed),
                next = self.subscription.recv() => next,
            };

            let batch = match next {
                Ok(batch) => batch,
                Err(_) if self.shutdown.is_cancelled() => {
                    return self.finish(StreamState::Closed);
                }
                Err(e) => {
                    error!(subscription = %id, error = %e, "patient feed ended under a live stream");
                    // Best effort; the client may already be gone.
                    let _ = tx.try_send(Err(Status::internal("Patient event feed closed")));
                    return self.finish(StreamState::Errored);
                }
            };

            self.state = StreamState::Streaming;
            debug!(
                subscription = %id,
                tick = batch.tick,
                events = batch.events.len(),
                "forwarding batch"
            );
            for event in &batch.events {
                let update = event_to_update(event, self.offset);
                if !deliver(&tx, &self.shutdown, Ok(update)).await {
                    return self.finish(StreamState::Closed);
                }
            }
        }
    }

    fn finish(self, state: StreamState) -> StreamState {
        self.subscription.unsubscribe();
        info!(
            subscription = %self.subscription.id(),
            last = ?self.state,
            end = ?state,
            "patient stream detached"
        );
        state
    }
}

/// Sends the first status counts immediately, then only changed ones.
pub struct StatusStream {
    aggregator: StatusAggregator,
    config: WatchConfig,
    shutdown: CancellationToken,
}

impl StatusStream {
    pub fn new(
        aggregator: StatusAggregator,
        config: WatchConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            aggregator,
            config,
            shutdown,
        }
    }

    pub async fn run(
        mut self,
        first: StatusCounts,
        tx: mpsc::Sender<Result<StatusCountsRes, Status>>,
    ) {
        info!("status count stream attached");
        if !deliver(&tx, &self.shutdown, Ok(counts_to_pb(&first))).await {
            info!("status count stream detached");
            return;
        }

        let period = self.config.poll_interval();
        let mut interval = time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = self.shutdown.cancelled() => break,
                _ = interval.tick() => {}
            }

            let changed = tokio::select! {
                _ = tx.closed() => break,
                _ = self.shutdown.cancelled() => break,
                changed = self.aggregator.poll(self.config.today()) => changed,
            };

            if let Some(counts) = changed {
                if !deliver(&tx, &self.shutdown, Ok(counts_to_pb(&counts))).await {
                    break;
                }
            }
        }

        info!("status count stream detached");
    }
}

/// Capacity of each response channel handed to tonic.
pub const RESPONSE_BUFFER: usize = 16;

async fn deliver<T>(
    tx: &mpsc::Sender<Result<T, Status>>,
    shutdown: &CancellationToken,
    message: Result<T, Status>,
) -> bool {
    tokio::select! {
        sent = tx.send(message) => sent.is_ok(),
        _ = shutdown.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use api_shared::pb::UpdateType;
    use chrono::NaiveDate;
    use er_core::{PatientRecord, Publisher, TickBatch};
    use tokio::task::JoinHandle;

    use super::*;

    fn discharged(hn: &str) -> PatientRecord {
        PatientRecord {
            id: 1,
            hn: hn.to_string(),
            fname: "Malee".into(),
            lname: "Suksan".into(),
            pname: "Ms.".into(),
            enter_er_time: None,
            emergency_type: "urgent".into(),
            current_status: "discharged".into(),
            status_updated_at: NaiveDate::from_ymd_opt(2024, 3, 15)
                .and_then(|d| d.and_hms_opt(9, 30, 0)),
        }
    }

    struct Running {
        publisher: Arc<Publisher>,
        shutdown: CancellationToken,
        rx: mpsc::Receiver<Result<ErPatientUpdate, Status>>,
        handle: JoinHandle<StreamState>,
    }

    async fn start() -> Running {
        let publisher = Publisher::new(4);
        let shutdown = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(RESPONSE_BUFFER);
        let stream = PatientStream::new(
            publisher.subscribe(),
            FixedOffset::east_opt(0).unwrap(),
            shutdown.clone(),
        );
        let handle = tokio::spawn(stream.run(ReducedSnapshot::new(), tx));

        let initial = rx.recv().await.unwrap().unwrap();
        assert_eq!(initial.update_type, UpdateType::Unknown as i32);
        assert!(initial.initial_patients.is_empty());

        Running {
            publisher,
            shutdown,
            rx,
            handle,
        }
    }

    #[tokio::test]
    async fn test_client_leaving_ends_closed_and_unsubscribes() {
        let Running {
            publisher,
            rx,
            handle,
            ..
        } = start().await;
        assert_eq!(publisher.subscriber_count(), 1);

        drop(rx);
        assert_eq!(handle.await.unwrap(), StreamState::Closed);
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_ends_closed() {
        let Running {
            shutdown,
            mut rx,
            handle,
            ..
        } = start().await;

        shutdown.cancel();
        assert_eq!(handle.await.unwrap(), StreamState::Closed);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_feed_closing_ends_errored_with_internal() {
        let Running {
            publisher,
            mut rx,
            handle,
            ..
        } = start().await;

        publisher.publish(TickBatch {
            tick: 1,
            events: vec![ChangeEvent::Deleted(discharged("HN9"))],
        });
        let deleted = rx.recv().await.unwrap().unwrap();
        assert_eq!(deleted.update_type, UpdateType::Deleted as i32);
        assert_eq!(deleted.updated_patient.unwrap().hn, "HN9");

        publisher.close();
        assert_eq!(handle.await.unwrap(), StreamState::Errored);

        let err = rx.recv().await.unwrap().unwrap_err();
        assert_eq!(err.code(), tonic::Code::Internal);
        assert!(rx.recv().await.is_none());
    }
}
