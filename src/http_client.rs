use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Shared outbound client. Every provider and image-search call is bounded by `timeout`.
pub fn build_client(timeout: Duration) -> AppResult<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))
}

/// Classifies a transport failure on a provider call. Timeouts and connection
/// failures are retryable; anything else is treated as a rejection.
pub fn provider_error(context: &str, e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() {
        AppError::ProviderUnavailable(format!("{}: {}", context, e))
    } else {
        AppError::UpstreamAuth(format!("{}: {}", context, e))
    }
}

/// Reads a JSON body from a provider response, turning non-2xx into an upstream rejection.
pub async fn provider_json<T: DeserializeOwned>(
    context: &str,
    response: reqwest::Response,
) -> AppResult<T> {
    let status = response.status();
    if status.is_server_error() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::ProviderUnavailable(format!(
            "{}: status={}, body={}",
            context, status, body
        )));
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::UpstreamAuth(format!(
            "{}: status={}, body={}",
            context, status, body
        )));
    }
    response
        .json()
        .await
        .map_err(|e| AppError::UpstreamAuth(format!("{}: invalid response: {}", context, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_provider_unavailable() {
        let client = build_client(Duration::from_millis(500)).unwrap();
        // Port 9 (discard) on localhost is not expected to be listening.
        let err = client
            .get("http://127.0.0.1:9/unreachable")
            .send()
            .await
            .unwrap_err();
        let mapped = provider_error("probe", err);
        assert!(matches!(mapped, AppError::ProviderUnavailable(_)));
    }
}
