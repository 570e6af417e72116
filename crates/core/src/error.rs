#[derive(Debug, thiserror::Error)]
pub enum ErError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("snapshot source read failed: {0}")]
    Source(String),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("failed to deserialize patient rows: {0}")]
    Deserialization(serde_json::Error),
    #[error("patient event feed closed")]
    FeedClosed,
}

impl From<sqlx_core::error::Error> for ErError {
    fn from(err: sqlx_core::error::Error) -> Self {
        Self::Source(err.to_string())
    }
}

pub type ErResult<T> = std::result::Result<T, ErError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_message() {
        let err = ErError::Source("connection refused".into());
        let msg = err.to_string();
        assert!(msg.contains("snapshot source read failed"));
        assert!(msg.contains("connection refused"));
    }

    #[test]
    fn test_sqlx_error_maps_to_source() {
        let err: ErError = sqlx_core::error::Error::PoolTimedOut.into();
        assert!(matches!(err, ErError::Source(_)));
    }
}
