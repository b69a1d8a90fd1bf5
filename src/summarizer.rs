//! Article summaries from an OpenAI-compatible chat-completions API.
//!
//! This module provides the summarization capability the pipeline uses to
//! enrich new articles, plus the free-form completion used by the daily
//! digest. Summaries are best effort: every failure is reported as a
//! [`SummarizerError`] and the pipeline carries on without the summary.
//!
//! # Architecture
//!
//! - [`Summarizer`]: core trait; `summarize` is a fixed prompt over `complete`
//! - [`OpenAiSummarizer`]: talks to `/v1/chat/completions` through `reqwest`
//! - [`RetrySummarizer`]: decorator adding retries to any [`Summarizer`]
//!
//! # Retry Strategy
//!
//! - Only rate limits, server errors and network failures are retried
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to prevent thundering herd

use async_trait::async_trait;
use rand::{rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

use crate::config::SummarySettings;
use crate::error::SummarizerError;
use crate::utils::truncate_for_log;

/// Default token budget of a single article summary.
pub const SUMMARY_MAX_TOKENS: u32 = 200;

/// Prompt asking for a one-paragraph summary and a sentiment call.
pub fn summary_prompt(link: &str) -> String {
    format!(
        "Summarize this article in one short paragraph and analyze its sentiment \
         (Bullish, Bearish or Neutral):\nLink: {link}"
    )
}

/// Text generation backend.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Answer `prompt` with at most `max_tokens` tokens.
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummarizerError>;

    /// Token budget used by [`Summarizer::summarize`].
    fn summary_max_tokens(&self) -> u32 {
        SUMMARY_MAX_TOKENS
    }

    /// Short summary and sentiment of the article at `link`.
    async fn summarize(&self, link: &str) -> Result<String, SummarizerError> {
        self.complete(&summary_prompt(link), self.summary_max_tokens())
            .await
    }
}

impl SummarizerError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            SummarizerError::Request(e) => e.is_timeout() || e.is_connect(),
            SummarizerError::Api { status, .. } => *status == 429 || *status >= 500,
            SummarizerError::EmptyCompletion => false,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Pull the first non-empty completion out of a chat-completions response.
fn extract_completion(resp: ChatResponse) -> Result<String, SummarizerError> {
    resp.choices
        .into_iter()
        .filter_map(|c| c.message.content)
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty())
        .ok_or(SummarizerError::EmptyCompletion)
}

/// [`Summarizer`] backed by an OpenAI-compatible HTTP API.
#[derive(Clone)]
pub struct OpenAiSummarizer {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    summary_max_tokens: u32,
}

impl fmt::Debug for OpenAiSummarizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiSummarizer")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("summary_max_tokens", &self.summary_max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiSummarizer {
    pub fn new(settings: &SummarySettings) -> Result<Self, SummarizerError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            api_key: settings.api_key.clone().unwrap_or_default(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            summary_max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    fn summary_max_tokens(&self) -> u32 {
        self.summary_max_tokens
    }

    #[instrument(level = "info", skip_all, fields(model = %self.model, max_tokens = max_tokens))]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummarizerError> {
        let t0 = Instant::now();
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens,
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(
                status = status.as_u16(),
                elapsed_ms = t0.elapsed().as_millis() as u64,
                body = %truncate_for_log(&message, 300),
                "Completion API returned an error"
            );
            return Err(SummarizerError::Api {
                status: status.as_u16(),
                message: truncate_for_log(&message, 300),
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        let text = extract_completion(parsed)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            chars = text.len(),
            "Completion received"
        );
        Ok(text)
    }
}

/// Wrapper that adds exponential backoff retry logic to any [`Summarizer`].
///
/// The delay between retries follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
pub struct RetrySummarizer<T> {
    inner: T,
    max_retries: usize,
    base_delay: Duration,
    max_delay: Duration,
}

impl<T> RetrySummarizer<T>
where
    T: Summarizer,
{
    pub fn new(inner: T, max_retries: usize, base_delay: Duration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl<T> fmt::Debug for RetrySummarizer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetrySummarizer")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> Summarizer for RetrySummarizer<T>
where
    T: Summarizer,
{
    fn summary_max_tokens(&self) -> u32 {
        self.inner.summary_max_tokens()
    }

    #[instrument(level = "info", skip_all)]
    async fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String, SummarizerError> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            let attempt_t0 = Instant::now();
            match self.inner.complete(prompt, max_tokens).await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    attempt += 1;
                    let attempt_dt = attempt_t0.elapsed();
                    let total_dt = total_t0.elapsed();

                    if attempt > self.max_retries || !e.is_retryable() {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                            elapsed_ms_total = total_dt.as_millis() as u64,
                            error = %e,
                            "complete() giving up"
                        );
                        return Err(e);
                    }

                    let mut delay = self.base_delay.saturating_mul(1 << (attempt - 1));
                    if delay > self.max_delay {
                        delay = self.max_delay;
                    }
                    let jitter_ms: u64 = rng().random_range(0..=250);
                    let delay = delay + Duration::from_millis(jitter_ms);

                    warn!(
                        attempt,
                        max = self.max_retries,
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Build the summarizer described by `settings`, or `None` when summaries
/// are disabled.
pub fn from_settings(
    settings: &SummarySettings,
) -> Result<Option<RetrySummarizer<OpenAiSummarizer>>, SummarizerError> {
    if !settings.enabled {
        return Ok(None);
    }
    let client = OpenAiSummarizer::new(settings)?;
    Ok(Some(RetrySummarizer::new(
        client,
        settings.max_retries,
        Duration::from_secs(1),
    )))
}
