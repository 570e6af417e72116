use crate::pb::HealthRes;

/// Simple health service for the ER watch API
///
/// Reports liveness of the process only. It does not touch the snapshot source, so a
/// database outage does not fail the health check while the poll loop keeps retrying.
pub struct HealthService;

impl HealthService {
    /// Static method to check health without creating an instance
    ///
    /// # Returns
    /// A `HealthRes` indicating the service is healthy.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "ER watch is alive".into(),
        }
    }
}
