//! The patient feed: one source, one poll loop, many subscribers.
//!
//! `PatientFeed` is what the RPC layer holds. It is cheap to clone and every clone refers to the
//! same publisher, so the server can hand it to each request handler.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::WatchConfig;
use crate::poller::PatientDiffLoop;
use crate::publisher::{Publisher, Subscription};
use crate::reducer::{reduce_latest, ReducedSnapshot};
use crate::source::SnapshotSource;
use crate::status::StatusAggregator;
use crate::window::TimeWindow;
use crate::ErResult;

#[derive(Clone)]
pub struct PatientFeed {
    source: Arc<dyn SnapshotSource>,
    publisher: Arc<Publisher>,
    config: WatchConfig,
}

impl PatientFeed {
    pub fn new(source: Arc<dyn SnapshotSource>, config: WatchConfig) -> Self {
        let publisher = Publisher::new(config.subscriber_capacity());
        Self {
            source,
            publisher,
            config,
        }
    }

    /// Spawn the poll loop. It runs until `shutdown` is cancelled.
    pub fn start(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            capacity = self.config.subscriber_capacity(),
            "starting patient feed"
        );
        PatientDiffLoop::new(Arc::clone(&self.source), Arc::clone(&self.publisher))
            .spawn(self.config.clone(), shutdown)
    }

    /// A fresh, reduced read of the current window.
    pub async fn snapshot(&self) -> ErResult<ReducedSnapshot> {
        let window = TimeWindow::for_day(self.config.today());
        let rows = self.source.fetch_window(&window).await?;
        Ok(reduce_latest(rows))
    }

    /// Register a subscriber, then read the snapshot it starts from.
    ///
    /// Registering first means a change landing between the two steps may show up both in the
    /// snapshot and as a live event, but is never lost. On error the subscription is dropped.
    pub async fn attach(&self) -> ErResult<(ReducedSnapshot, Subscription)> {
        let subscription = self.publisher.subscribe();
        let snapshot = self.snapshot().await?;
        Ok((snapshot, subscription))
    }

    /// A new count watcher over the same source.
    pub fn status_aggregator(&self) -> StatusAggregator {
        StatusAggregator::new(Arc::clone(&self.source))
    }

    pub fn publisher(&self) -> &Arc<Publisher> {
        &self.publisher
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }
}
