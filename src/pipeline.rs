//! Per-source check and the concurrent fan-out over all sources.
//!
//! One run checks every configured source in its own tokio task:
//!
//! ```text
//! fetch ─▶ scrape ─▶ for each candidate, in page order:
//!                      insert_if_absent ──(existed)──▶ skip
//!                          │ (new)
//!                          ▼
//!                      summarize? ─▶ attach_summary ─▶ notify
//! ```
//!
//! Nothing that goes wrong inside a source task reaches its siblings. Fetch
//! and scrape failures end that source's check, store failures skip the
//! article, summarizer and notifier failures are logged and the article stays
//! recorded as seen. A panicking task is reported as a failed source.
//! Dropping a run before it finishes aborts every source task it spawned.

use futures::future::join_all;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tokio::task::{JoinError, JoinHandle};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::config::Settings;
use crate::error::{ArticleError, ConfigError};
use crate::fetcher::Fetcher;
use crate::models::{
    ArticleCandidate, ArticleRecord, FetchOutcome, NotificationMessage, RunReport, Source,
    SourceReport,
};
use crate::notifier::Notifier;
use crate::scrapers::{self, keywords::KeywordMatcher};
use crate::store::ArticleStore;
use crate::summarizer::Summarizer;
use crate::utils::truncate_for_log;

/// Sent to the full-details chats after a run that found nothing new.
pub const EMPTY_RUN_MESSAGE: &str = "❌ Didn't find any new article.";

/// Aborts the wrapped task when dropped.
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Future for AbortOnDrop<T> {
    type Output = Result<T, JoinError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0).poll(cx)
    }
}

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        // no-op once the task has finished
        self.0.abort();
    }
}

/// Everything one run needs. Built once per polling cycle from the settings
/// snapshot; cheap to clone into source tasks.
#[derive(Clone)]
pub struct Pipeline {
    fetcher: Fetcher,
    store: Arc<dyn ArticleStore>,
    /// `None` when summaries are disabled.
    summarizer: Option<Arc<dyn Summarizer>>,
    notifier: Arc<dyn Notifier>,
    settings: Arc<Settings>,
    keywords: Arc<KeywordMatcher>,
}

impl Pipeline {
    pub fn new(
        fetcher: Fetcher,
        store: Arc<dyn ArticleStore>,
        summarizer: Option<Arc<dyn Summarizer>>,
        notifier: Arc<dyn Notifier>,
        settings: Arc<Settings>,
    ) -> Result<Self, ConfigError> {
        let keywords = Arc::new(settings.keyword_matcher()?);
        if keywords.is_empty() {
            warn!("No keywords configured; every headline will be ignored");
        }
        Ok(Self {
            fetcher,
            store,
            summarizer,
            notifier,
            settings,
            keywords,
        })
    }

    /// Check every source concurrently and wait for all of them.
    ///
    /// # Returns
    ///
    /// One [`SourceReport`] per source, in the order of `sources`, whatever
    /// happened to the others. Dropping the returned future aborts the
    /// source tasks still in flight.
    #[instrument(level = "info", skip_all, fields(sources = sources.len()))]
    pub async fn run(&self, sources: &[Source]) -> RunReport {
        let t0 = Instant::now();

        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let this = self.clone();
                let source = source.clone();
                let span = info_span!("source", source = %source.id);
                AbortOnDrop(tokio::spawn(
                    async move { this.check_source(&source).await }.instrument(span),
                ))
            })
            .collect();

        let results = join_all(handles).await;
        let reports: Vec<SourceReport> = results
            .into_iter()
            .zip(sources)
            .map(|(joined, source)| match joined {
                Ok(report) => report,
                Err(e) => {
                    error!(source = %source.id, error = %e, "Source task did not complete");
                    SourceReport::crashed(source, format!("task failed: {e}"))
                }
            })
            .collect();
        let report = RunReport { sources: reports };

        for failed in report.failed_sources() {
            warn!(
                source = %failed.source,
                reason = failed.failure.as_deref().unwrap_or_default(),
                "Source check failed"
            );
        }
        info!(
            new_articles = report.new_articles(),
            notified = report.notified(),
            failed_sources = report.failed_sources().count(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Run complete"
        );

        if report.new_articles() == 0 && self.settings.notify_when_empty {
            self.announce_empty_run().await;
        }
        report
    }

    /// Fetch, scrape and process one source.
    pub async fn check_source(&self, source: &Source) -> SourceReport {
        let mut report = SourceReport::new(source);

        let page = self.fetcher.fetch(source).await;
        report.fetch_outcome = Some(page.outcome);
        report.attempts = page.attempts;
        let body = match (page.outcome, page.body) {
            (FetchOutcome::Success, Some(body)) => body,
            (outcome, _) => {
                error!(
                    source = %source.id,
                    url = %page.source.url,
                    %outcome,
                    attempts = page.attempts,
                    "Fetch failed; skipping source this cycle"
                );
                report.failure = Some(format!("fetch failed: {outcome}"));
                return report;
            }
        };

        let candidates = match scrapers::scrape_page(source.id, &body, self.keywords.clone()) {
            Ok(c) => c,
            Err(e) => {
                error!(
                    source = %source.id,
                    error = %e,
                    body = %truncate_for_log(&body, 200),
                    "Could not scrape page; skipping source this cycle"
                );
                report.failure = Some(format!("scrape failed: {e}"));
                return report;
            }
        };
        report.candidates = candidates.len();
        info!(source = %source.id, candidates = candidates.len(), "Scraped page");

        for candidate in &candidates {
            self.process_candidate(source, candidate, &mut report).await;
        }

        info!(
            source = %source.id,
            new = report.new_articles,
            duplicates = report.duplicates,
            notified = report.notified,
            errors = report.article_errors.len(),
            "Source check complete"
        );
        report
    }

    async fn process_candidate(
        &self,
        source: &Source,
        candidate: &ArticleCandidate,
        report: &mut SourceReport,
    ) {
        let link = candidate.link.as_str();
        let record = ArticleRecord::first_seen(source, candidate);

        match self.store.insert_if_absent(&record).await {
            Ok(true) => {
                report.new_articles += 1;
                info!(source = %source.id, link, headline = %candidate.headline, "New article");
            }
            Ok(false) => {
                report.duplicates += 1;
                debug!(source = %source.id, link, "Already seen; skipping");
                return;
            }
            Err(e) => {
                error!(source = %source.id, link, error = %e, "Could not record article; skipping");
                report.article_errors.push(ArticleError::Store {
                    link: link.to_string(),
                    source: e,
                });
                return;
            }
        }

        let summary = self.summarize(source, link, report).await;

        let message = NotificationMessage::for_article(candidate, summary.as_deref());
        let chats = self.settings.telegram.chats_for(source.tier);
        match self.notifier.send(message.as_str(), &chats).await {
            Ok(()) => {
                report.notified += 1;
                info!(source = %source.id, link, chats = chats.len(), "Notification sent");
            }
            Err(e) => {
                error!(source = %source.id, link, error = %e, "Notification failed; article stays recorded");
                report.article_errors.push(ArticleError::Notifier {
                    link: link.to_string(),
                    source: e,
                });
            }
        }
    }

    /// Summary for a newly recorded article, persisted when possible.
    ///
    /// The returned text is used for the notification even if persisting it
    /// failed.
    async fn summarize(&self, source: &Source, link: &str, report: &mut SourceReport) -> Option<String> {
        let summarizer = self.summarizer.as_ref()?;

        let summary = match summarizer.summarize(link).await {
            Ok(s) => s,
            Err(e) => {
                warn!(source = %source.id, link, error = %e, "Summary unavailable; notifying without it");
                report.article_errors.push(ArticleError::Summarizer {
                    link: link.to_string(),
                    source: e,
                });
                return None;
            }
        };

        if let Err(e) = self.store.attach_summary(link, &summary).await {
            warn!(source = %source.id, link, error = %e, "Could not store summary");
            report.article_errors.push(ArticleError::Store {
                link: link.to_string(),
                source: e,
            });
        }
        Some(summary)
    }

    async fn announce_empty_run(&self) {
        let chats = &self.settings.telegram.full_details_chat_ids;
        match self.notifier.send(EMPTY_RUN_MESSAGE, chats).await {
            Ok(()) => info!("Announced empty run"),
            Err(e) => warn!(error = %e, "Could not announce empty run"),
        }
    }
}
