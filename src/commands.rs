//! Subcommand drivers: the polling loop, the daily digest, the two
//! read-only reports over the article store, and database recreation.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveTime, SecondsFormat, Utc};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep_until};
use tracing::{error, info, instrument, warn};

use crate::cli::{RunArgs, SearchArgs};
use crate::config::Settings;
use crate::digest::{self, DigestOutcome};
use crate::fetcher::{Fetcher, Transport};
use crate::models::{ArticleRecord, RunReport};
use crate::notifier::{Notifier, TelegramNotifier};
use crate::pipeline::Pipeline;
use crate::store::{ArticleStore, SqliteStore};
use crate::summarizer::{self, Summarizer};

/// Build the pipeline for one cycle from a settings snapshot.
pub fn build_pipeline(
    settings: Arc<Settings>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn ArticleStore>,
) -> Result<Pipeline, Box<dyn Error>> {
    let fetcher = Fetcher::new(transport, settings.fetch_policy());
    let summarizer = summarizer::from_settings(&settings.summaries)?
        .map(|s| Arc::new(s) as Arc<dyn Summarizer>);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(&settings.telegram)?);
    Ok(Pipeline::new(fetcher, store, summarizer, notifier, settings)?)
}

/// Re-read the settings file, keeping `current` when that fails.
fn reload(path: &Path, current: &Arc<Settings>) -> Arc<Settings> {
    match Settings::load(path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            warn!(error = %e, "Could not reload settings; keeping the previous ones");
            current.clone()
        }
    }
}

/// Poll every source once per interval until interrupted.
///
/// Each cycle starts from a fresh settings snapshot, so credential and
/// keyword changes are picked up without a restart.
#[instrument(level = "info", skip_all, fields(once = args.once, interval_secs = args.interval_secs))]
pub async fn run_loop(
    config_path: &Path,
    args: &RunArgs,
    initial: Settings,
    transport: Arc<dyn Transport>,
    store: Arc<dyn ArticleStore>,
) -> Result<(), Box<dyn Error>> {
    let interval = Duration::from_secs(args.interval_secs);
    let mut settings = Arc::new(initial);
    let mut cycle: u64 = 0;

    loop {
        cycle += 1;
        let started = Instant::now();
        if cycle > 1 {
            settings = reload(config_path, &settings);
        }

        match build_pipeline(settings.clone(), transport.clone(), store.clone()) {
            Ok(pipeline) => {
                let sources = settings.sources();
                tokio::select! {
                    report = pipeline.run(&sources) => log_cycle(cycle, &report),
                    _ = tokio::signal::ctrl_c() => {
                        warn!(cycle, "Interrupted during a cycle; shutting down");
                        return Ok(());
                    }
                }
            }
            Err(e) => error!(cycle, error = %e, "Could not set up this cycle; skipping it"),
        }

        if args.once {
            return Ok(());
        }

        let next = started + interval;
        info!(cycle, next_in_secs = next.saturating_duration_since(Instant::now()).as_secs(), "Waiting for next cycle");
        tokio::select! {
            _ = sleep_until(next) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                return Ok(());
            }
        }
    }
}

fn log_cycle(cycle: u64, report: &RunReport) {
    let failed: Vec<&str> = report.failed_sources().map(|s| s.source.as_str()).collect();
    info!(
        cycle,
        new_articles = report.new_articles(),
        notified = report.notified(),
        ?failed,
        "Cycle finished"
    );
}

/// Send today's daily report.
pub async fn digest(
    settings: &Settings,
    store: &dyn ArticleStore,
) -> Result<DigestOutcome, Box<dyn Error>> {
    let summarizer = summarizer::from_settings(&settings.summaries)?;
    let notifier = TelegramNotifier::new(&settings.telegram)?;
    let outcome = digest::send_daily_digest(
        store,
        summarizer.as_ref().map(|s| s as &dyn Summarizer),
        &notifier,
        &settings.telegram,
        Local::now(),
    )
    .await?;
    Ok(outcome)
}

/// Start of the local calendar month containing `now`, in UTC.
fn start_of_local_month(now: DateTime<Local>) -> DateTime<Utc> {
    let first = now.date_naive().with_day(1).unwrap_or(now.date_naive());
    first
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        // Midnight skipped by a DST change.
        .unwrap_or_else(|| first.and_time(NaiveTime::MIN).and_utc())
}

/// Per-source counts over the last 24 hours, the last 7 days and the
/// current calendar month, as printed by `stats`.
pub async fn stats(store: &dyn ArticleStore) -> Result<String, Box<dyn Error>> {
    let now = Local::now();
    let windows = [
        ("the last 24 hours", now.with_timezone(&Utc) - ChronoDuration::hours(24)),
        ("the last 7 days", now.with_timezone(&Utc) - ChronoDuration::days(7)),
        ("this month", start_of_local_month(now)),
    ];
    let mut out = String::new();
    for (label, since) in windows {
        let counts = store.counts_by_source_since(since).await?;
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(&format_stats(label, &counts));
    }
    Ok(out)
}

/// Drop every stored article and start over with an empty schema.
#[instrument(level = "info", skip_all)]
pub async fn recreate(store: &SqliteStore) -> Result<u64, Box<dyn Error>> {
    let dropped = store.recreate().await?;
    warn!(dropped, "Article database recreated");
    Ok(dropped)
}

/// Matching articles, as printed by `search`.
pub async fn search(store: &dyn ArticleStore, args: &SearchArgs) -> Result<String, Box<dyn Error>> {
    let found = store.search_by_tags(&args.tags, args.limit, !args.all).await?;
    Ok(format_search(&args.tags, &found))
}

fn format_stats(window: &str, counts: &[(String, u64)]) -> String {
    if counts.is_empty() {
        return format!("No articles recorded in {window}.\n");
    }
    let width = counts.iter().map(|(s, _)| s.len()).max().unwrap_or(0);
    let mut out = format!("📊 Articles in {window}\n");
    for (source, n) in counts {
        out.push_str(&format!("{source:<width$}  {n}\n"));
    }
    let total: u64 = counts.iter().map(|(_, n)| n).sum();
    out.push_str(&format!("{:<width$}  {total}\n", "total"));
    out
}

fn format_search(tags: &[String], found: &[ArticleRecord]) -> String {
    if found.is_empty() {
        return format!("No articles tagged {}.\n", tags.join(", "));
    }
    let mut out = String::new();
    for a in found {
        out.push_str(&format!(
            "{} [{}] {}\n  🔗 {}\n  🔍 {}\n",
            a.first_seen_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            a.source,
            a.headline,
            a.link,
            a.highlights
        ));
        if let Some(summary) = &a.summary {
            out.push_str(&format!("  🤖 {summary}\n"));
        }
    }
    out
}
