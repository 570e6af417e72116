use api_shared::pb::{
    er_watch_server::ErWatch, ErPatientUpdate, GetErPatientsReq, GetErPatientsRes, HealthReq,
    HealthRes, StatusCountsRes, StreamErPatientsReq, StreamStatusCountsReq,
};
use api_shared::HealthService;
use er_core::PatientFeed;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};
use tracing::error;

use crate::convert::patient_to_pb;
use crate::stream::{PatientStream, StatusStream, RESPONSE_BUFFER};

/// The `er.v1.ErWatch` service.
///
/// Every clone shares the same feed, so request handlers all see one poll loop and one set of
/// subscribers.
#[derive(Clone)]
pub struct ErWatchService {
    feed: PatientFeed,
    shutdown: CancellationToken,
}

impl ErWatchService {
    /// `shutdown` ends every open stream when cancelled.
    pub fn new(feed: PatientFeed, shutdown: CancellationToken) -> Self {
        Self { feed, shutdown }
    }
}

#[tonic::async_trait]
impl ErWatch for ErWatchService {
    async fn health(&self, _req: Request<HealthReq>) -> Result<Response<HealthRes>, Status> {
        let health_res = HealthService::check_health();
        Ok(Response::new(health_res))
    }

    async fn get_er_patients(
        &self,
        _req: Request<GetErPatientsReq>,
    ) -> Result<Response<GetErPatientsRes>, Status> {
        let snapshot = self.feed.snapshot().await.map_err(|e| {
            error!(error = %e, "failed to read ER patients");
            Status::internal("Error retrieving ER patients")
        })?;

        let offset = self.feed.config().utc_offset();
        let patients = snapshot
            .iter()
            .map(|(_, record)| patient_to_pb(record, offset))
            .collect();
        Ok(Response::new(GetErPatientsRes { patients }))
    }

    type StreamErPatientsStream = ReceiverStream<Result<ErPatientUpdate, Status>>;

    async fn stream_er_patients(
        &self,
        _req: Request<StreamErPatientsReq>,
    ) -> Result<Response<Self::StreamErPatientsStream>, Status> {
        let (snapshot, subscription) = self.feed.attach().await.map_err(|e| {
            error!(error = %e, "failed to attach ER patient stream");
            Status::internal("Error retrieving ER patients")
        })?;

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let session = PatientStream::new(
            subscription,
            self.feed.config().utc_offset(),
            self.shutdown.clone(),
        );
        tokio::spawn(session.run(snapshot, tx));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    type StreamStatusCountsStream = ReceiverStream<Result<StatusCountsRes, Status>>;

    async fn stream_status_counts(
        &self,
        _req: Request<StreamStatusCountsReq>,
    ) -> Result<Response<Self::StreamStatusCountsStream>, Status> {
        let config = self.feed.config().clone();
        let mut aggregator = self.feed.status_aggregator();
        let first = aggregator.first(config.today()).await.map_err(|e| {
            error!(error = %e, "failed to read ER status counts");
            Status::internal("Error retrieving ER status counts")
        })?;

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let session = StatusStream::new(aggregator, config, self.shutdown.clone());
        tokio::spawn(session.run(first, tx));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
