use crate::core::config::RetryConfig;
use anyhow::Error;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retries an async operation with exponential backoff
///
/// # Parameters
/// - `operation`: Closure returning a future
/// - `policy`: Total attempts and the delay before the second attempt; the
///   delay doubles after every failed attempt
///
/// # Returns
/// Either the successful result or the error of the last attempt
pub async fn with_retry<F, Fut, T>(mut operation: F, policy: &RetryConfig) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, reqwest::Error>>,
{
    let attempts = policy.attempts.max(1);
    let mut delay = Duration::from_millis(policy.base_delay_ms);
    let mut attempt = 1;
    loop {
        match operation().await.map_err(anyhow::Error::from) {
            Ok(val) => return Ok(val),
            Err(err) => {
                if attempt >= attempts {
                    return Err(err.context(format!("gave up after {attempts} attempts")));
                }
                debug!(
                    "Attempt {}/{} failed: {}. Retrying in {:?}...",
                    attempt, attempts, err, delay
                );
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }
    }
}

/// HTTP client shared by the providers, with a per-request timeout.
pub fn http_client(policy: &RetryConfig) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent("fundcache/1.0")
        .timeout(policy.timeout())
        .build()
}
