//! Retrying HTTP transport shared by the page fetchers and the HTTP sink.
//!
//! Every request is attempted up to `retries` times. Connection failures,
//! timeouts, `429 Too Many Requests` and `5xx` responses are retried after an
//! exponential backoff with random jitter. Any other non-success status fails
//! immediately.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, Request, Response, StatusCode};
use tracing::{debug, warn};
use vigil_core::config::ApiConfig;

use crate::error::{RunnerError, TransportError};

/// Delay before the first retry. Doubles on every further attempt.
const BASE_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound for a single backoff delay, jitter excluded.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Longest error body kept in a failure message.
const MAX_ERROR_BODY: usize = 512;

/// A `reqwest` client plus the retry policy applied to every request.
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
    retries: u32,
    backoff: Duration,
}

impl Transport {
    /// Build a transport from the API connection settings.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Client`] if the TLS backend cannot be set up.
    pub fn new(config: &ApiConfig) -> Result<Self, RunnerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .danger_accept_invalid_certs(!config.verify_certificate)
            .user_agent(concat!("vigil/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RunnerError::Client(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            retries: config.retries.max(1),
            backoff: BASE_BACKOFF,
        })
    }

    /// Override the base backoff delay.
    #[cfg(test)]
    pub const fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// The underlying client, for building requests.
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Execute `request`, retrying transient failures, and return the first
    /// successful response.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] when a non-retryable status is received or
    /// every attempt failed.
    pub async fn execute(&self, request: Request) -> Result<Response, TransportError> {
        let method = request.method().clone();
        let path = request.url().path().to_owned();
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let this_try = request.try_clone().ok_or_else(|| TransportError {
                attempts: attempt,
                message: "request body cannot be replayed".to_owned(),
            })?;

            let failure = match self.client.execute(this_try).await {
                Ok(response) if response.status().is_success() => {
                    debug!(%method, path, attempt, status = %response.status(), "request succeeded");
                    return Ok(response);
                }
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let message = format!("{method} {path} returned {status}: {}", clip(&body));
                    if !is_retryable_status(status) {
                        return Err(TransportError {
                            attempts: attempt,
                            message,
                        });
                    }
                    message
                }
                Err(e) => {
                    let message = format!("{method} {path} failed: {e}");
                    if !is_retryable_error(&e) {
                        return Err(TransportError {
                            attempts: attempt,
                            message,
                        });
                    }
                    message
                }
            };

            if attempt >= self.retries {
                return Err(TransportError {
                    attempts: attempt,
                    message: failure,
                });
            }

            let delay = backoff_delay(self.backoff, attempt);
            warn!(
                attempt,
                retries = self.retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}

/// Statuses worth retrying: rate limiting and server-side failures.
fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Errors worth retrying: the request never got a usable answer.
fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

/// `base * 2^(attempt - 1)`, capped, plus up to `base` of random jitter.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let scaled = base
        .saturating_mul(2_u32.saturating_pow(exponent))
        .min(MAX_BACKOFF);
    let base_ms = u64::try_from(base.as_millis()).unwrap_or(u64::MAX);
    let jitter = if base_ms == 0 {
        0
    } else {
        rand::rng().random_range(0..=base_ms)
    };
    scaled.saturating_add(Duration::from_millis(jitter))
}

fn clip(body: &str) -> &str {
    if body.len() <= MAX_ERROR_BODY {
        return body;
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end = end.saturating_sub(1);
    }
    body.get(..end).unwrap_or_default()
}
