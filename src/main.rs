//! # crypto_news_check
//!
//! Watches crypto news sites for headlines matching a keyword list, records
//! every article once in SQLite, optionally asks an OpenAI-compatible model
//! for a short summary, and announces each new article on Telegram.
//!
//! ## Features
//!
//! - Scrapes crypto.news, Cointelegraph and Bitcoin Magazine front pages
//! - Retries blocked, rate-limited and failing fetches with exponential backoff
//! - Checks all sources concurrently; one failing source never stops the rest
//! - Announces an article at most once, keyed by its link
//! - Sends a daily AI report over the day's headlines
//!
//! ## Usage
//!
//! ```sh
//! crypto_news_check --config ./config/news_check.yaml run
//! crypto_news_check digest
//! crypto_news_check stats
//! crypto_news_check search bitcoin etf --all
//! crypto_news_check recreate
//! ```
//!
//! ## Architecture
//!
//! Each polling cycle:
//! 1. **Reload**: read a fresh settings snapshot
//! 2. **Fetch**: download every source's front page, one task per source
//! 3. **Scrape**: extract keyword-matching headlines in page order
//! 4. **Dedup**: record each article unless its link is already stored
//! 5. **Enrich & notify**: summarize new articles and send them to Telegram

use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use tracing::{error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod commands;
mod config;
mod digest;
mod error;
mod fetcher;
mod models;
mod notifier;
mod pipeline;
mod scrapers;
mod store;
mod summarizer;
#[cfg(test)]
mod testing;
mod utils;

use cli::{Cli, Command};
use config::Settings;
use fetcher::ReqwestTransport;
use store::{ArticleStore, SqliteStore};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "crypto_news_check starting up");

    let args = Cli::parse();
    let command = args.selected_command();
    info!(config = %args.config.display(), database = %args.database.display(), ?command, "Parsed CLI arguments");

    // ---- Store: schema must exist before anything touches it ----
    let sqlite = SqliteStore::open(&args.database)?;
    if let Err(e) = sqlite.init_schema().await {
        error!(error = %e, path = %args.database.display(), "Could not initialise the article store");
        return Err(e.into());
    }
    let store: Arc<dyn ArticleStore> = Arc::new(sqlite.clone());

    match command {
        Command::Run(run) => {
            let settings = Settings::load(&args.config)?;
            let transport = Arc::new(ReqwestTransport::new()?);
            commands::run_loop(&args.config, &run, settings, transport, store).await?;
        }
        Command::Digest => {
            let settings = Settings::load(&args.config)?;
            let outcome = commands::digest(&settings, store.as_ref()).await?;
            info!(?outcome, "Daily report finished");
        }
        Command::Stats => {
            print!("{}", commands::stats(store.as_ref()).await?);
        }
        Command::Search(search) => {
            print!("{}", commands::search(store.as_ref(), &search).await?);
        }
        Command::Recreate => {
            commands::recreate(&sqlite).await?;
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
