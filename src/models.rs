//! Data models shared by the fetcher, scrapers, store and pipeline.
//!
//! This module defines the core data structures of a polling cycle:
//! - [`SourceId`] / [`Source`]: the sites being polled and where they live
//! - [`FetchOutcome`] / [`PageFetchResult`]: what a page fetch produced
//! - [`ArticleCandidate`]: an article as a scraper sees it
//! - [`ArticleRecord`]: an article as the store persists it
//! - [`NotificationMessage`]: the text announced for a new article
//! - [`SourceReport`] / [`RunReport`]: per-source outcome of one run

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::ArticleError;

/// Identity of a supported news site.
///
/// The scraper used for a source is chosen by this value, so adding a site
/// means adding a variant here and a scraper in [`crate::scrapers`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum SourceId {
    CryptoNews,
    Cointelegraph,
    BitcoinMagazine,
}

impl SourceId {
    pub const ALL: [SourceId; 3] = [
        SourceId::CryptoNews,
        SourceId::Cointelegraph,
        SourceId::BitcoinMagazine,
    ];

    /// The name used in configuration, logs and the `source` column.
    pub fn name(&self) -> &'static str {
        match self {
            SourceId::CryptoNews => "crypto.news",
            SourceId::Cointelegraph => "cointelegraph",
            SourceId::BitcoinMagazine => "bitcoinmagazine",
        }
    }

    /// Front page polled for this site when configuration does not override it.
    pub fn default_url(&self) -> &'static str {
        match self {
            SourceId::CryptoNews => "https://crypto.news/",
            SourceId::Cointelegraph => "https://cointelegraph.com/",
            SourceId::BitcoinMagazine => "https://bitcoinmagazine.com/articles",
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SourceId::ALL
            .into_iter()
            .find(|id| id.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown news source: {s}"))
    }
}

impl TryFrom<String> for SourceId {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// Importance tier deciding which Telegram chats receive a message.
///
/// - `Standard`: partial-data chats and full-details chats
/// - `Important`: full-details chats only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Important,
    #[default]
    Standard,
}

/// A polled endpoint. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub id: SourceId,
    pub url: String,
    pub tier: Tier,
}

impl Source {
    pub fn new(id: SourceId, url: impl Into<String>, tier: Tier) -> Self {
        Self {
            id,
            url: url.into(),
            tier,
        }
    }

    /// The source at its default URL with the standard tier.
    pub fn default_for(id: SourceId) -> Self {
        Self::new(id, id.default_url(), Tier::Standard)
    }

    pub fn name(&self) -> &'static str {
        self.id.name()
    }
}

/// Classification of a fetch attempt or of a whole fetch.
///
/// A finished fetch only ever reports `Success`, `TransientError` or
/// `PermanentError`; `RateLimited` describes an individual attempt that was
/// answered with 403/429 and is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Success,
    RateLimited,
    TransientError,
    PermanentError,
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FetchOutcome::Success => "success",
            FetchOutcome::RateLimited => "rate_limited",
            FetchOutcome::TransientError => "transient_error",
            FetchOutcome::PermanentError => "permanent_error",
        };
        f.write_str(s)
    }
}

/// Result of [`crate::fetcher::Fetcher::fetch`]. Never persisted.
#[derive(Debug, Clone)]
pub struct PageFetchResult {
    pub source: Source,
    /// Present exactly when `outcome` is [`FetchOutcome::Success`].
    pub body: Option<String>,
    pub outcome: FetchOutcome,
    /// Number of attempts that were issued.
    pub attempts: u32,
}

/// An article extracted by a scraper, not yet checked against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleCandidate {
    pub headline: String,
    /// Identity key of the article across all sources.
    pub link: String,
    pub highlights: String,
}

/// The persisted form of an article. At most one exists per `link`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleRecord {
    pub source: String,
    pub headline: String,
    pub link: String,
    pub highlights: String,
    pub summary: Option<String>,
    pub first_seen_at: DateTime<Utc>,
}

impl ArticleRecord {
    /// Record for a candidate first seen now.
    pub fn first_seen(source: &Source, candidate: &ArticleCandidate) -> Self {
        Self {
            source: source.name().to_string(),
            headline: candidate.headline.clone(),
            link: candidate.link.clone(),
            highlights: candidate.highlights.clone(),
            summary: None,
            first_seen_at: Utc::now(),
        }
    }
}

/// Text announced for a new article.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMessage(String);

impl NotificationMessage {
    /// Build the announcement; the summary line only appears when a summary
    /// is available.
    pub fn for_article(candidate: &ArticleCandidate, summary: Option<&str>) -> Self {
        let mut text = String::from("📰 New Article Found!\n");
        text.push_str(&format!("📌 {}\n", candidate.headline));
        text.push_str(&format!("🔗 {}\n", candidate.link));
        if let Some(summary) = summary.filter(|s| !s.trim().is_empty()) {
            text.push_str(&format!("🤖 {}\n", summary.trim()));
        }
        text.push_str(&format!("🔍 Highlights: {}\n", candidate.highlights));
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NotificationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What happened to one source during a run.
#[derive(Debug, Default)]
pub struct SourceReport {
    pub source: String,
    pub fetch_outcome: Option<FetchOutcome>,
    pub attempts: u32,
    pub candidates: usize,
    pub new_articles: usize,
    pub duplicates: usize,
    pub notified: usize,
    /// Per-article problems that did not stop the source.
    pub article_errors: Vec<ArticleError>,
    /// Why the check stopped early, if it did.
    pub failure: Option<String>,
}

impl SourceReport {
    pub fn new(source: &Source) -> Self {
        Self {
            source: source.name().to_string(),
            ..Default::default()
        }
    }

    /// Report for a task that never returned one (panicked or was aborted).
    pub fn crashed(source: &Source, reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::new(source)
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of one [`crate::pipeline::Pipeline::run`], one entry per source,
/// in configuration order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn new_articles(&self) -> usize {
        self.sources.iter().map(|s| s.new_articles).sum()
    }

    pub fn notified(&self) -> usize {
        self.sources.iter().map(|s| s.notified).sum()
    }

    pub fn failed_sources(&self) -> impl Iterator<Item = &SourceReport> {
        self.sources.iter().filter(|s| !s.is_success())
    }

    #[cfg(test)]
    pub fn source(&self, name: &str) -> Option<&SourceReport> {
        self.sources.iter().find(|s| s.source == name)
    }
}
