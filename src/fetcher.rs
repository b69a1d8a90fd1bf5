//! Page retrieval with bounded retry and exponential backoff.
//!
//! The fetcher is split in two layers:
//! - [`Transport`]: a single HTTP GET with a per-attempt timeout, reporting
//!   what happened on the wire ([`ReqwestTransport`] is the real one)
//! - [`Fetcher`]: the retry loop that classifies each attempt and decides
//!   whether to back off, give up, or return the page
//!
//! # Retry Strategy
//!
//! - Attempts are numbered from 1 up to `max_retries` (5 by default)
//! - HTTP 403/429, any other non-200 status, connection failures and
//!   timeouts are retried after `2^attempt` backoff units (1 second each by
//!   default): 2s, 4s, 8s, 16s
//! - Any other transport failure stops immediately with
//!   [`FetchOutcome::TransientError`]
//! - Running out of attempts yields [`FetchOutcome::PermanentError`]
//! - There is no wait after the last attempt: a failing attempt is only
//!   followed by a backoff when another attempt comes after it, so five
//!   failures cost 2+4+8+16 = 30s rather than 62s
//!
//! The backoff is a `tokio::time::sleep`, so it only suspends the task of the
//! source being fetched and is cancelled along with the run.

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::models::{FetchOutcome, PageFetchResult, Source};

/// Browser-like user agent; several news sites reject obvious bots with 403.
const USER_AGENT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// A raw HTTP answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// What went wrong below the HTTP status level.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not connect (DNS, refused, reset, TLS handshake)
    #[error("connection error: {0}")]
    Connect(String),

    /// The attempt exceeded its timeout
    #[error("request timed out")]
    Timeout,

    /// Anything else; not worth retrying
    #[error("request error: {0}")]
    Other(String),
}

/// One HTTP GET.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by a shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError> {
        let resp = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(classify_reqwest_error)?;
        Ok(HttpResponse { status, body })
    }
}

/// Knobs of the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchPolicy {
    pub max_retries: u32,
    /// Timeout of each individual attempt.
    pub timeout: Duration,
    /// Duration of one backoff unit; attempt `n` waits `2^n` units.
    pub backoff_unit: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            timeout: Duration::from_secs(10),
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl FetchPolicy {
    /// Wait after a failed `attempt` (1-based): `2^attempt` units.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_unit
            .saturating_mul(2u32.saturating_pow(attempt))
    }
}

/// Map a non-200 status to the attempt classification.
pub fn classify_status(status: u16) -> FetchOutcome {
    match status {
        200 => FetchOutcome::Success,
        403 | 429 => FetchOutcome::RateLimited,
        _ => FetchOutcome::TransientError,
    }
}

/// Retrying page fetcher. Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Fetcher {
    transport: Arc<dyn Transport>,
    policy: FetchPolicy,
}

impl Fetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: FetchPolicy) -> Self {
        Self { transport, policy }
    }

    /// Fetch the front page of `source`.
    ///
    /// # Returns
    ///
    /// A [`PageFetchResult`] whose outcome is `Success` (with the body),
    /// `TransientError` (non-retryable transport failure) or
    /// `PermanentError` (attempts exhausted). Expected network conditions
    /// never surface as a panic or an `Err`.
    #[instrument(level = "info", skip_all, fields(source = %source.id, url = %source.url))]
    pub async fn fetch(&self, source: &Source) -> PageFetchResult {
        let t0 = Instant::now();
        let mut attempt: u32 = 1;

        loop {
            if attempt > self.policy.max_retries {
                error!(
                    attempts = attempt - 1,
                    elapsed_ms_total = t0.elapsed().as_millis() as u64,
                    "Max retries reached; could not fetch page"
                );
                return PageFetchResult {
                    source: source.clone(),
                    body: None,
                    outcome: FetchOutcome::PermanentError,
                    attempts: attempt - 1,
                };
            }

            let delay = self.policy.backoff_delay(attempt);
            debug!(attempt, "Requesting page");

            match self.transport.get(&source.url, self.policy.timeout).await {
                Ok(resp) if resp.status == 200 => {
                    info!(
                        attempt,
                        bytes = resp.body.len(),
                        elapsed_ms_total = t0.elapsed().as_millis() as u64,
                        "Fetched page"
                    );
                    return PageFetchResult {
                        source: source.clone(),
                        body: Some(resp.body),
                        outcome: FetchOutcome::Success,
                        attempts: attempt,
                    };
                }
                Ok(resp) => match classify_status(resp.status) {
                    FetchOutcome::RateLimited => warn!(
                        attempt,
                        status = resp.status,
                        ?delay,
                        "Blocked or rate limited; backing off"
                    ),
                    _ => warn!(
                        attempt,
                        status = resp.status,
                        ?delay,
                        "Unexpected status code; backing off"
                    ),
                },
                Err(TransportError::Other(message)) => {
                    warn!(attempt, error = %message, "Request failed; not retrying");
                    return PageFetchResult {
                        source: source.clone(),
                        body: None,
                        outcome: FetchOutcome::TransientError,
                        attempts: attempt,
                    };
                }
                Err(e) => {
                    warn!(attempt, error = %e, ?delay, "Network failure; backing off");
                }
            }

            // No point waiting when no attempt follows.
            if attempt < self.policy.max_retries {
                sleep(delay).await;
            }
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SourceId;
    use crate::testing::ScriptedTransport;

    fn source() -> Source {
        Source::default_for(SourceId::Cointelegraph)
    }

    fn status(code: u16) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: code,
            body: format!("status {code}"),
        })
    }

    fn fetcher(transport: &Arc<ScriptedTransport>) -> Fetcher {
        Fetcher::new(transport.clone(), FetchPolicy::default())
    }

    #[test]
    fn test_backoff_delay_doubles() {
        let policy = FetchPolicy::default();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(classify_status(200), FetchOutcome::Success);
        assert_eq!(classify_status(403), FetchOutcome::RateLimited);
        assert_eq!(classify_status(429), FetchOutcome::RateLimited);
        assert_eq!(classify_status(500), FetchOutcome::TransientError);
        assert_eq!(classify_status(404), FetchOutcome::TransientError);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_then_success_waits_double() {
        let src = source();
        let transport = Arc::new(ScriptedTransport::new().script(
            &src.url,
            vec![status(429), status(403), status(429), status(200)],
        ));

        let result = fetcher(&transport).fetch(&src).await;

        assert_eq!(result.outcome, FetchOutcome::Success);
        assert_eq!(result.body.as_deref(), Some("status 200"));
        assert_eq!(result.attempts, 4);
        assert!(result.attempts <= FetchPolicy::default().max_retries);

        let calls = transport.call_times(&src.url);
        assert_eq!(calls.len(), 4);
        let waits: Vec<Duration> = calls.windows(2).map(|w| w[1] - w[0]).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8)
            ]
        );
        for pair in waits.windows(2) {
            assert_eq!(pair[1], pair[0] * 2);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_is_permanent_error() {
        let src = source();
        let transport = Arc::new(ScriptedTransport::new().always(&src.url, status(503)));

        let t0 = Instant::now();
        let result = fetcher(&transport).fetch(&src).await;

        assert_eq!(result.outcome, FetchOutcome::PermanentError);
        assert!(result.body.is_none());
        assert_eq!(result.attempts, 5);
        assert_eq!(transport.call_times(&src.url).len(), 5);
        // 2 + 4 + 8 + 16, nothing after the final attempt
        assert_eq!(t0.elapsed(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connection_errors_and_timeouts_are_retried() {
        let src = source();
        let transport = Arc::new(ScriptedTransport::new().script(
            &src.url,
            vec![
                Err(TransportError::Connect("connection refused".into())),
                Err(TransportError::Timeout),
                status(200),
            ],
        ));

        let result = fetcher(&transport).fetch(&src).await;

        assert_eq!(result.outcome, FetchOutcome::Success);
        assert_eq!(result.attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_transport_error_is_not_retried() {
        let src = source();
        let transport = Arc::new(ScriptedTransport::new().script(
            &src.url,
            vec![
                Err(TransportError::Other("invalid redirect".into())),
                status(200),
            ],
        ));

        let t0 = Instant::now();
        let result = fetcher(&transport).fetch(&src).await;

        assert_eq!(result.outcome, FetchOutcome::TransientError);
        assert_eq!(result.attempts, 1);
        assert_eq!(transport.call_times(&src.url).len(), 1);
        assert_eq!(t0.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_retries_never_calls_transport() {
        let src = source();
        let transport = Arc::new(ScriptedTransport::new().always(&src.url, status(200)));
        let policy = FetchPolicy {
            max_retries: 0,
            ..FetchPolicy::default()
        };

        let result = Fetcher::new(transport.clone(), policy).fetch(&src).await;

        assert_eq!(result.outcome, FetchOutcome::PermanentError);
        assert_eq!(result.attempts, 0);
        assert!(transport.call_times(&src.url).is_empty());
    }
}
