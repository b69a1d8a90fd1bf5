//! Daily report over the headlines recorded today.
//!
//! The digest asks the summarizer for one general report covering every
//! headline stored since local midnight, tags it `#DailyReport`, and sends it
//! to both audiences.

use chrono::{DateTime, Duration, Local, NaiveTime, Utc};
use tracing::{info, instrument};

use crate::config::TelegramSettings;
use crate::error::DigestError;
use crate::models::{ArticleRecord, Tier};
use crate::notifier::Notifier;
use crate::store::ArticleStore;
use crate::summarizer::Summarizer;

/// Token budget of the daily report.
pub const DIGEST_MAX_TOKENS: u32 = 2000;

pub const DIGEST_TAG: &str = "#DailyReport";

/// What [`send_daily_digest`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestOutcome {
    Sent { articles: usize },
    SummariesDisabled,
    NoArticles,
}

/// Start of the local calendar day containing `now`, in UTC.
pub fn start_of_local_day(now: DateTime<Local>) -> DateTime<Utc> {
    now.date_naive()
        .and_time(NaiveTime::MIN)
        .and_local_timezone(Local)
        .earliest()
        .map(|d| d.with_timezone(&Utc))
        // Midnight skipped by a DST change.
        .unwrap_or_else(|| now.with_timezone(&Utc) - Duration::hours(24))
}

pub fn digest_prompt(date: chrono::NaiveDate, articles: &[ArticleRecord]) -> String {
    let mut prompt = format!(
        "Please write the general daily report, not one per article, \
         using the following articles, {date}:\n"
    );
    for article in articles {
        prompt.push_str(&article.headline);
        prompt.push('\n');
    }
    prompt
}

/// Build and send today's report.
///
/// # Arguments
///
/// * `summarizer` - `None` when summaries are disabled; nothing is sent then
/// * `now` - the local time the day is derived from
#[instrument(level = "info", skip_all, fields(date = %now.date_naive()))]
pub async fn send_daily_digest(
    store: &dyn ArticleStore,
    summarizer: Option<&dyn Summarizer>,
    notifier: &dyn Notifier,
    telegram: &TelegramSettings,
    now: DateTime<Local>,
) -> Result<DigestOutcome, DigestError> {
    let Some(summarizer) = summarizer else {
        info!("Summaries disabled; no daily report");
        return Ok(DigestOutcome::SummariesDisabled);
    };

    let articles = store.articles_since(start_of_local_day(now)).await?;
    if articles.is_empty() {
        info!("No articles recorded today; no daily report");
        return Ok(DigestOutcome::NoArticles);
    }

    let prompt = digest_prompt(now.date_naive(), &articles);
    let report = summarizer.complete(&prompt, DIGEST_MAX_TOKENS).await?;
    let message = format!("{}\n {DIGEST_TAG}", report.trim_end());

    notifier
        .send(&message, &telegram.chats_for(Tier::Standard))
        .await?;
    info!(articles = articles.len(), chars = message.len(), "Daily report sent");
    Ok(DigestOutcome::Sent {
        articles: articles.len(),
    })
}
