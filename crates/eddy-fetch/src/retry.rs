//! HTTP execution with hard timeouts and exponential backoff.
//!
//! A 429 is always retried, honouring a `Retry-After` header when the server
//! sends one. Other failures are returned immediately unless the policy opts
//! into retrying transient ones (5xx, timeouts, connect errors).

use std::time::Duration;

use eddy_core::constants::{DEFAULT_MAX_RETRIES, QUERY_TIMEOUT, RETRY_BASE_DELAY, RETRY_CAP_DELAY};
use eddy_core::error::FetchError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Longest response body kept in a [`FetchError::Status`].
const ERROR_BODY_LIMIT: usize = 512;

/// Retry behaviour of an [`HttpFetcher`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub cap_delay: Duration,
    /// Also retry 5xx, timeouts and transport failures, not just 429.
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: RETRY_BASE_DELAY,
            cap_delay: RETRY_CAP_DELAY,
            retry_transient: false,
        }
    }
}

impl RetryPolicy {
    /// Default policy that also retries transient failures.
    pub fn transient() -> Self {
        Self {
            retry_transient: true,
            ..Self::default()
        }
    }

    /// Wait before retry number `attempt` (0-based): `base × 2^attempt`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(31));
        self.base_delay.saturating_mul(factor).min(self.cap_delay)
    }

    /// Wait after a 429, raised to the server's `Retry-After` when larger.
    pub fn rate_limit_wait(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        match retry_after {
            Some(hint) => backoff.max(hint).min(self.cap_delay),
            None => backoff,
        }
    }
}

/// `Retry-After` in whole seconds. HTTP-date values are ignored.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Shared HTTP client for every read-side source.
///
/// Cloning is cheap; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Result<Self, FetchError> {
        Self::with_timeout(policy, QUERY_TIMEOUT)
    }

    pub fn with_timeout(policy: RetryPolicy, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("build http client: {e}"),
            })?;
        Ok(Self {
            client,
            policy,
            timeout,
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// GET `url` with query parameters and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        self.execute(url, || self.client.get(url).query(query)).await
    }

    /// POST a JSON body to `url` and decode the JSON response.
    pub async fn post_json<T: DeserializeOwned>(&self, url: &str, body: &Value) -> Result<T, FetchError> {
        self.execute(url, || self.client.post(url).json(body)).await
    }

    /// Send the request built by `build`, retrying per the policy.
    async fn execute<T, F>(&self, url: &str, build: F) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let policy = self.policy;
        let mut attempt: u32 = 0;

        loop {
            let outcome = self.attempt(url, &build).await;
            let can_retry = attempt < policy.max_retries;

            match outcome {
                Ok(body) => {
                    return serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(Attempt::RateLimited { retry_after }) => {
                    if !can_retry {
                        warn!(%url, attempts = attempt + 1, "fetch: rate limit retries exhausted");
                        return Err(FetchError::RateLimited {
                            url: url.to_string(),
                            attempts: attempt + 1,
                        });
                    }
                    let wait = policy.rate_limit_wait(attempt, retry_after);
                    debug!(%url, attempt, wait_ms = wait.as_millis() as u64, "fetch: rate limited, backing off");
                    tokio::time::sleep(wait).await;
                }
                Err(Attempt::Failed(err)) => {
                    if !(policy.retry_transient && can_retry && err.is_transient()) {
                        return Err(err);
                    }
                    let wait = policy.backoff(attempt);
                    debug!(%url, attempt, error = %err, wait_ms = wait.as_millis() as u64, "fetch: transient failure, retrying");
                    tokio::time::sleep(wait).await;
                }
            }
            attempt += 1;
        }
    }

    async fn attempt<F>(&self, url: &str, build: &F) -> Result<Vec<u8>, Attempt>
    where
        F: Fn() -> RequestBuilder,
    {
        let response = build().send().await.map_err(|e| Attempt::Failed(self.transport_error(url, e)))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(Attempt::RateLimited {
                retry_after: parse_retry_after(response.headers()),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Attempt::Failed(self.transport_error(url, e)))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let mut snippet: String = text.chars().take(ERROR_BODY_LIMIT).collect();
            if text.len() > snippet.len() {
                snippet.push_str("...");
            }
            return Err(Attempt::Failed(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body: snippet,
            }));
        }
        Ok(body.to_vec())
    }

    fn transport_error(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::Timeout {
                url: url.to_string(),
                timeout_secs: self.timeout.as_secs(),
            }
        } else {
            FetchError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            }
        }
    }
}

/// Result of a single attempt before the retry decision.
enum Attempt {
    RateLimited { retry_after: Option<Duration> },
    Failed(FetchError),
}
