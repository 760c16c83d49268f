//! Exponential-backoff retry for outbound HTTP calls.
//!
//! Shared by the LLM provider and the tool adapters. Retries transient
//! statuses (429, 5xx, 408) and network errors; client errors (400, 401,
//! 403, 404) fail immediately.

use anyhow::Result;
use reqwest::{Response, StatusCode};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first).
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(15),
            backoff_factor: 2.0,
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Run `operation` until it succeeds, fails with a non-retryable status, or
/// `max_attempts` is exhausted. Returns the successful response or the last
/// error.
pub async fn send_with_retry<F, Fut>(
    config: &RetryConfig,
    label: &str,
    operation: F,
) -> Result<Response>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<Response>>,
{
    let mut delay = config.initial_delay;
    let mut last_error = None;

    for attempt in 1..=config.max_attempts {
        match operation().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    if attempt > 1 {
                        tracing::info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(response);
                }

                let body = response.text().await.unwrap_or_default();
                if !is_retryable_status(status) {
                    anyhow::bail!("{} returned {}: {}", label, status, body);
                }
                tracing::warn!(
                    "{} returned {} on attempt {}/{}",
                    label,
                    status,
                    attempt,
                    config.max_attempts
                );
                last_error = Some(format!("{} ({})", label, status));
            }
            Err(e) => {
                tracing::warn!(
                    "{} network error on attempt {}/{}: {}",
                    label,
                    attempt,
                    config.max_attempts,
                    e
                );
                last_error = Some(format!("{}: {}", label, e));
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(delay).await;
            delay = Duration::from_secs_f64(
                (delay.as_secs_f64() * config.backoff_factor).min(config.max_delay.as_secs_f64()),
            );
        }
    }

    anyhow::bail!(
        "{} failed after {} attempts: {}",
        label,
        config.max_attempts,
        last_error.unwrap_or_else(|| "unknown".to_string())
    )
}
