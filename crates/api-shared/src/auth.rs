/// Metadata key carrying the client's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Resolve the configured API key from an optional environment value.
///
/// An unset or blank value means authentication is disabled.
pub fn api_key_from_env_value(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validates the provided API key against the key configured at startup.
///
/// Returns `Ok(())` if the key matches, or `unauthenticated` if it is missing or wrong.
#[allow(clippy::result_large_err)]
pub fn validate_api_key(provided_key: Option<&str>, expected_key: &str) -> Result<(), tonic::Status> {
    let provided_key = provided_key
        .ok_or_else(|| tonic::Status::unauthenticated("Missing x-api-key header"))?;

    if provided_key == expected_key {
        Ok(())
    } else {
        Err(tonic::Status::unauthenticated("Invalid API key"))
    }
}
