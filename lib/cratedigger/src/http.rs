use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use reqwest::{header, Client, Response};
use serde::de::DeserializeOwned;
use tokio::{sync::Mutex, time::sleep};
use tracing::{debug, info, warn};

use crate::error::{DiggerError, Result};

/// Timeout for individual provider requests (15 seconds)
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Maximum attempts for transient errors
const MAX_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds)
const BASE_DELAY_MS: u64 = 500;

/// Maximum backoff delay cap (milliseconds)
const MAX_BACKOFF_MS: u64 = 5000;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_backoff: Duration,
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRIES,
            base_delay: Duration::from_millis(BASE_DELAY_MS),
            max_backoff: Duration::from_millis(MAX_BACKOFF_MS),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// Single attempt, still bounded by the request timeout.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_delay.saturating_mul(2u32.saturating_pow(attempt));
        delay.min(self.max_backoff)
    }
}

/// Retries an async operation with exponential backoff and a per-attempt timeout.
/// Only transient errors are retried, see [`DiggerError::is_retryable`].
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 0..attempts {
        let result = tokio::time::timeout(policy.request_timeout, operation()).await;

        let error = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => e,
            Err(_) => DiggerError::Timeout {
                operation: operation_name.to_string(),
            },
        };

        if !error.is_retryable() {
            warn!("{} failed with non-retryable error: {}", operation_name, error);
            return Err(error);
        }

        if attempt + 1 < attempts {
            let delay = policy.backoff(attempt);
            warn!(
                "{} failed (attempt {}/{}), retrying in {}ms: {}",
                operation_name,
                attempt + 1,
                attempts,
                delay.as_millis(),
                error
            );
            sleep(delay).await;
        }
        last_error = Some(error);
    }

    Err(last_error.unwrap_or_else(|| DiggerError::Timeout {
        operation: operation_name.to_string(),
    }))
}

/// Decode a JSON body, mapping non-success statuses to [`DiggerError::Api`].
pub async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        let text = response.text().await?;
        let body = if text.trim().is_empty() { "null" } else { &text };
        serde_json::from_str(body).map_err(|e| DiggerError::Api {
            status: status.as_u16(),
            message: format!("JSON parse error: {e}"),
        })
    } else {
        Err(error_from_response(response).await)
    }
}

pub async fn error_from_response(response: Response) -> DiggerError {
    let status = response.status();
    let text = response
        .text()
        .await
        .unwrap_or_else(|_| "Could not read error body".to_string());
    DiggerError::Api {
        status: status.as_u16(),
        message: text,
    }
}

/// Client for HTML and RSS endpoints that reject non-browser agents.
pub fn browser_client() -> Result<Client> {
    let mut headers = header::HeaderMap::new();
    headers.insert(
        header::ACCEPT,
        header::HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        ),
    );
    headers.insert(
        header::ACCEPT_LANGUAGE,
        header::HeaderValue::from_static("en-US,en;q=0.5"),
    );
    Ok(Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .default_headers(headers)
        .build()?)
}

/// GET a page as text with retries.
pub async fn fetch_text(client: &Client, url: &str, policy: &RetryPolicy) -> Result<String> {
    with_retry(&format!("GET {url}"), policy, move || async move {
        debug!("Request: GET {}", url);
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }
        Ok(response.text().await?)
    })
    .await
}

/// Sliding-window limiter shared by clones of one adapter.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    timestamps: Arc<Mutex<Vec<DateTime<Utc>>>>,
    max_per_window: usize,
    window: chrono::Duration,
}

impl RateLimiter {
    pub fn new(max_per_window: usize, window_seconds: i64) -> Self {
        Self {
            timestamps: Arc::new(Mutex::new(Vec::new())),
            max_per_window: max_per_window.max(1),
            window: chrono::Duration::seconds(window_seconds),
        }
    }

    pub async fn acquire(&self) {
        let mut timestamps = self.timestamps.lock().await;
        let now = Utc::now();
        let window_start = now - self.window;
        timestamps.retain(|&ts| ts > window_start);
        if timestamps.len() >= self.max_per_window {
            if let Some(&oldest) = timestamps.first() {
                let wait = (oldest + self.window) - now;
                if wait > chrono::Duration::zero() {
                    info!(
                        "Rate limit reached ({}/{}), waiting for {:.1}s",
                        timestamps.len(),
                        self.max_per_window,
                        wait.as_seconds_f64()
                    );
                    sleep(Duration::from_millis(wait.num_milliseconds().max(0) as u64)).await;
                }
            }
            timestamps.remove(0);
        }
        timestamps.push(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            base_delay: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            request_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = with_retry("op", &fast_policy(3), move || async move {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(DiggerError::Api {
                    status: 503,
                    message: "busy".into(),
                })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_on_client_errors() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: Result<()> = with_retry("op", &fast_policy(3), move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(DiggerError::Api {
                status: 404,
                message: "missing".into(),
            })
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(10), Duration::from_millis(5000));
    }

    #[tokio::test]
    async fn rate_limiter_allows_burst_within_window() {
        let limiter = RateLimiter::new(3, 60);
        let start = std::time::Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
