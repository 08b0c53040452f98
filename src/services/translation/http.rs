// Shared HTTP plumbing for remote translation APIs

use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tracing::{error, warn};

use crate::core::errors::{TranslationError, TranslationResult};

/// Retry configuration for transient failures (timeouts, connect errors, 5xx, 429)
const MAX_RETRIES: u32 = 2;
const INITIAL_RETRY_DELAY_MS: u64 = 1000;
const MAX_RETRY_DELAY_MS: u64 = 8000;

pub fn build_client(timeout_secs: u64) -> TranslationResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .pool_max_idle_per_host(5)
        .pool_idle_timeout(Duration::from_secs(90))
        .connect_timeout(Duration::from_secs(10))
        .build()?;
    Ok(client)
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Send a request, retrying transient failures with exponential backoff.
///
/// Returns the body of a 2xx response. Other statuses become `ApiError` carrying the body.
pub async fn send_with_retry(request: RequestBuilder, label: &str) -> TranslationResult<String> {
    let mut retry_delay_ms = INITIAL_RETRY_DELAY_MS;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            warn!("{}: retry attempt {} after {}ms delay", label, attempt, retry_delay_ms);
            tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
            retry_delay_ms = (retry_delay_ms * 2).min(MAX_RETRY_DELAY_MS);
        }

        let Some(this_try) = request.try_clone() else {
            return Err(TranslationError::ApiError(format!(
                "{}: request body cannot be replayed",
                label
            )));
        };

        let response = match this_try.send().await {
            Ok(resp) => resp,
            Err(e) => {
                let retryable = e.is_timeout() || e.is_connect();
                error!(
                    "{}: request failed (attempt {}): {} (retryable: {})",
                    label,
                    attempt + 1,
                    e,
                    retryable
                );
                if retryable && attempt < MAX_RETRIES {
                    continue;
                }
                return Err(e.into());
            }
        };

        let status = response.status();
        if is_retryable_status(status) && attempt < MAX_RETRIES {
            let error_text = response.text().await.unwrap_or_default();
            error!("{}: server error {} (attempt {}): {}", label, status, attempt + 1, error_text);
            continue;
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(TranslationError::ApiError(format!("{} - {}", status, body)));
        }
        return Ok(body);
    }

    Err(TranslationError::ApiError(format!(
        "{}: retries exhausted",
        label
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::OK));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = build_client(2).unwrap();
        // Port 9 on loopback refuses connections
        let request = client.post("http://127.0.0.1:9/translate").body("{}");
        let err = send_with_retry(request, "test").await.unwrap_err();
        assert!(matches!(err, TranslationError::NetworkError(_)));
    }
}
