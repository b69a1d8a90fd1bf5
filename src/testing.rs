//! In-process fakes shared by the unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use crate::error::{NotifierError, StoreError, SummarizerError};
use crate::fetcher::{HttpResponse, Transport, TransportError};
use crate::models::ArticleRecord;
use crate::notifier::Notifier;
use crate::store::{ArticleStore, SqliteStore};
use crate::summarizer::Summarizer;

type Reply = Result<HttpResponse, TransportError>;

#[derive(Default)]
struct Script {
    replies: VecDeque<Reply>,
    fallback: Option<Reply>,
    panics: bool,
}

/// Transport answering from per-URL scripts and recording call times.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, Script>>,
    calls: Mutex<HashMap<String, Vec<Instant>>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `replies` in order.
    pub fn script(self, url: &str, replies: Vec<Reply>) -> Self {
        self.scripts.lock().entry(url.to_string()).or_default().replies = replies.into();
        self
    }

    /// Answer `url` with `reply` once the script (if any) is used up.
    pub fn always(self, url: &str, reply: Reply) -> Self {
        self.scripts.lock().entry(url.to_string()).or_default().fallback = Some(reply);
        self
    }

    /// Panic when `url` is requested.
    pub fn panics(self, url: &str) -> Self {
        self.scripts.lock().entry(url.to_string()).or_default().panics = true;
        self
    }

    /// Serve `body` with status 200 for `url`.
    pub fn page(self, url: &str, body: impl Into<String>) -> Self {
        self.always(
            url,
            Ok(HttpResponse {
                status: 200,
                body: body.into(),
            }),
        )
    }

    pub fn call_times(&self, url: &str) -> Vec<Instant> {
        self.calls.lock().get(url).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str, _timeout: Duration) -> Reply {
        self.calls
            .lock()
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());

        let reply = {
            let mut scripts = self.scripts.lock();
            let Some(script) = scripts.get_mut(url) else {
                return Err(TransportError::Other(format!("no script for {url}")));
            };
            if script.panics {
                None
            } else {
                Some(
                    script
                        .replies
                        .pop_front()
                        .or_else(|| script.fallback.clone())
                        .unwrap_or_else(|| Err(TransportError::Other("script exhausted".into()))),
                )
            }
        };
        match reply {
            Some(reply) => reply,
            None => panic!("scripted panic for {url}"),
        }
    }
}

/// Notifier remembering every message and its destinations.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, Vec<i64>)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records nothing and reports every send as failed.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, Vec<i64>)> {
        self.sent.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &str, chats: &[i64]) -> Result<(), NotifierError> {
        if self.fail {
            return Err(NotifierError::Api {
                chat_id: chats.first().copied().unwrap_or_default(),
                status: 400,
                description: "Bad Request: chat not found".into(),
            });
        }
        self.sent.lock().push((message.to_string(), chats.to_vec()));
        Ok(())
    }
}

/// Summarizer answering `summary of <link>`, or failing every call.
#[derive(Default)]
pub struct StubSummarizer {
    fail: bool,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl StubSummarizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl Summarizer for StubSummarizer {
    async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if self.fail {
            return Err(SummarizerError::Api {
                status: 500,
                message: "upstream unavailable".into(),
            });
        }
        Ok("Generated report".to_string())
    }

    async fn summarize(&self, link: &str) -> Result<String, SummarizerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(SummarizerError::Api {
                status: 500,
                message: "upstream unavailable".into(),
            });
        }
        Ok(format!("summary of {link}"))
    }
}

/// SQLite store with injectable failures.
pub struct FaultyStore {
    pub inner: SqliteStore,
    fail_attach: bool,
    fail_insert: HashSet<String>,
}

impl FaultyStore {
    pub fn new(inner: SqliteStore) -> Self {
        Self {
            inner,
            fail_attach: false,
            fail_insert: HashSet::new(),
        }
    }

    pub fn failing_attach(mut self) -> Self {
        self.fail_attach = true;
        self
    }

    pub fn failing_insert(mut self, link: &str) -> Self {
        self.fail_insert.insert(link.to_string());
        self
    }
}

#[async_trait]
impl ArticleStore for FaultyStore {
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.inner.init_schema().await
    }

    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<bool, StoreError> {
        if self.fail_insert.contains(&record.link) {
            return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.insert_if_absent(record).await
    }

    async fn attach_summary(&self, link: &str, summary: &str) -> Result<(), StoreError> {
        if self.fail_attach {
            return Err(StoreError::Database(rusqlite::Error::InvalidQuery));
        }
        self.inner.attach_summary(link, summary).await
    }

    async fn articles_since(&self, since: DateTime<Utc>) -> Result<Vec<ArticleRecord>, StoreError> {
        self.inner.articles_since(since).await
    }

    async fn counts_by_source_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        self.inner.counts_by_source_since(since).await
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
        match_any: bool,
    ) -> Result<Vec<ArticleRecord>, StoreError> {
        self.inner.search_by_tags(tags, limit, match_any).await
    }
}

/// crypto.news front page listing `articles` as `(headline, link)`.
pub fn crypto_news_page(articles: &[(&str, &str)]) -> String {
    let cards: String = articles
        .iter()
        .map(|(headline, link)| {
            format!(
                r#"<div class="post-loop"><a class="post-loop__link" href="{link}"></a><p class="post-loop__title">{headline}</p></div>"#
            )
        })
        .collect();
    format!("<html><body>{cards}</body></html>")
}
