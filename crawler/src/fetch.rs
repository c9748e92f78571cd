use std::time::Duration;

use bytes::Bytes;
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, RETRY_AFTER, USER_AGENT};
use reqwest::StatusCode;
use thiserror::Error;
use tracing::warn;

use crate::metrics_consts::FETCH_RETRIES;

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";
const BASE_DELAY: Duration = Duration::from_millis(500);
const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {0}")]
    Status(StatusCode),
    #[error("failed after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

/// Shared outbound HTTP client for the source adapters: fixed timeout,
/// browser-like UA, capped exponential backoff with jitter, and 429
/// handling that honours `Retry-After`.
pub struct HttpClient {
    client: reqwest::Client,
    max_retries: u32,
}

impl HttpClient {
    pub fn new(timeout: Duration, max_retries: u32) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(DEFAULT_USER_AGENT));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            max_retries,
        })
    }

    /// GET the URL, retrying transport errors and non-200 responses up to
    /// `max_retries` times. After exhaustion the last error is surfaced.
    pub async fn get(&self, url: &str) -> Result<Bytes, FetchError> {
        let mut last_err: Option<FetchError> = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                metrics::counter!(FETCH_RETRIES).increment(1);
            }

            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!("attempt {} failed: {e}, retrying", attempt + 1);
                    last_err = Some(FetchError::Request(e));
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
            };

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                let wait = parse_retry_after(response.headers())
                    .unwrap_or_else(|| backoff_delay(attempt));
                warn!("HTTP 429 received, backing off for {wait:?}");
                last_err = Some(FetchError::Status(StatusCode::TOO_MANY_REQUESTS));
                tokio::time::sleep(wait).await;
                continue;
            }

            if response.status() != StatusCode::OK {
                warn!("HTTP {}, retrying", response.status());
                last_err = Some(FetchError::Status(response.status()));
                tokio::time::sleep(backoff_delay(attempt)).await;
                continue;
            }

            match response.bytes().await {
                Ok(body) => return Ok(body),
                Err(e) => {
                    last_err = Some(FetchError::Request(e));
                    tokio::time::sleep(backoff_delay(attempt)).await;
                    continue;
                }
            }
        }

        Err(FetchError::Exhausted {
            attempts: self.max_retries,
            last: last_err
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }
}

/// Exponential backoff capped at `MAX_DELAY`, plus uniform jitter in
/// `[0, delay/5]`.
fn backoff_delay(attempt: u32) -> Duration {
    let exp = BASE_DELAY.saturating_mul(1u32 << attempt.min(16));
    let capped = exp.min(MAX_DELAY);

    let jitter_max = (capped / 5).as_millis() as u64;
    if jitter_max == 0 {
        return capped;
    }
    let jitter = rand::thread_rng().gen_range(0..jitter_max);
    capped + Duration::from_millis(jitter)
}

/// Parse a `Retry-After` header: either an integer number of seconds or an
/// RFC2822 HTTP-date. Dates in the past clamp to nothing (None).
fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get(RETRY_AFTER)?.to_str().ok()?;

    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delta = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        // Negative deltas fail the conversion, which is the clamp we want
        return delta.to_std().ok();
    }

    None
}
