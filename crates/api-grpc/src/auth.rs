use std::sync::Arc;

use api_shared::auth::{self, API_KEY_HEADER};
use tonic::service::Interceptor;
use tonic::{Request, Status};

/// Authentication interceptor for gRPC requests.
///
/// Holds the key resolved at startup. Without a key every request passes.
#[derive(Clone, Debug, Default)]
pub struct ApiKeyInterceptor {
    expected: Option<Arc<str>>,
}

impl ApiKeyInterceptor {
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected.map(Arc::from),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.expected.is_some()
    }
}

impl Interceptor for ApiKeyInterceptor {
    fn call(&mut self, req: Request<()>) -> Result<Request<()>, Status> {
        let Some(expected) = self.expected.as_deref() else {
            return Ok(req);
        };

        let provided = req
            .metadata()
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok());
        auth::validate_api_key(provided, expected)?;

        Ok(req)
    }
}
