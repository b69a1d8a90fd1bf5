//! Command-line interface definitions for crypto_news_check.
//!
//! Global options locate the settings file and the article database; every
//! subcommand shares them. Without a subcommand the binary runs the polling
//! loop.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
///
/// # Examples
///
/// ```sh
/// # Poll every 30 minutes with the default paths
/// crypto_news_check
///
/// # One cycle against a specific settings file
/// crypto_news_check --config ./news.yaml run --once
///
/// # Newest stored articles tagged with both #Bitcoin and #ETF
/// crypto_news_check search bitcoin etf --all --limit 5
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Settings file (YAML)
    #[arg(
        short,
        long,
        global = true,
        env = "NEWS_CHECK_CONFIG",
        default_value = "./config/news_check.yaml"
    )]
    pub config: PathBuf,

    /// SQLite database holding seen articles
    #[arg(
        short,
        long,
        global = true,
        env = "NEWS_CHECK_DB",
        default_value = "./articles.db"
    )]
    pub database: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// The subcommand to run; `run` with its defaults when none was given.
    pub fn selected_command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Run(RunArgs::default()))
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Poll all sources and announce new articles
    Run(RunArgs),

    /// Send the AI daily report over today's articles
    Digest,

    /// Article counts per source over the last 24 hours, 7 days and this month
    Stats,

    /// Search stored articles by highlight tag
    Search(SearchArgs),

    /// Drop and recreate the article database
    Recreate,
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct RunArgs {
    /// Run a single cycle and exit
    #[arg(long)]
    pub once: bool,

    /// Seconds between the start of two cycles
    #[arg(long, default_value_t = 1800)]
    pub interval_secs: u64,
}

impl Default for RunArgs {
    fn default() -> Self {
        Self {
            once: false,
            interval_secs: 1800,
        }
    }
}

#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct SearchArgs {
    /// Tags to look for, with or without the leading `#`
    #[arg(required = true)]
    pub tags: Vec<String>,

    /// Maximum number of articles to print
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Require every tag instead of any of them
    #[arg(long)]
    pub all: bool,
}
