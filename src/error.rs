//! Error types for the pipeline and its collaborators.
//!
//! Fetch results are not errors: the fetcher reports them through
//! [`crate::models::FetchOutcome`]. Everything below is contained within the
//! source task that produced it, except [`ConfigError`] and a failing
//! [`StoreError`] during schema initialization, which stop the process.

use thiserror::Error;

/// A fetched document could not be turned into candidates.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// The page body was empty or whitespace only
    #[error("empty document")]
    EmptyDocument,

    /// A CSS selector failed to compile
    #[error("invalid selector `{selector}`: {message}")]
    Selector { selector: String, message: String },

    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),
}

/// Failures of the durable article store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The directory meant to hold the database file could not be created
    #[error("could not create {}: {source}", path.display())]
    CreateDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The blocking database task did not complete
    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("no article stored for link {0}")]
    UnknownLink(String),
}

/// Failures of the summarization backend. Never fatal to a run.
#[derive(Debug, Error)]
pub enum SummarizerError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("empty completion")]
    EmptyCompletion,
}

/// Failures of message delivery. Logged, never retried by the pipeline.
#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Telegram rejected the message for a chat
    #[error("Telegram API error for chat {chat_id} (status {status}): {description}")]
    Api {
        chat_id: i64,
        status: u16,
        description: String,
    },

    /// Delivery failed for some of the destination chats
    #[error("delivery failed for {failed} of {total} chats: {first}")]
    Partial {
        failed: usize,
        total: usize,
        first: Box<NotifierError>,
    },

    #[error("no destination chats configured")]
    NoDestinations,

    #[error("Telegram API token is not configured")]
    MissingToken,
}

/// Loading the settings snapshot failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    NotFound(String),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Why a single candidate article was not fully processed.
///
/// Collected in [`crate::models::SourceReport::article_errors`]; none of
/// these stop the remaining candidates of the source.
#[derive(Debug, Error)]
pub enum ArticleError {
    #[error("store failed for {link}: {source}")]
    Store {
        link: String,
        #[source]
        source: StoreError,
    },

    #[error("summary unavailable for {link}: {source}")]
    Summarizer {
        link: String,
        #[source]
        source: SummarizerError,
    },

    #[error("notification failed for {link}: {source}")]
    Notifier {
        link: String,
        #[source]
        source: NotifierError,
    },
}

/// The daily digest could not be produced or delivered.
#[derive(Debug, Error)]
pub enum DigestError {
    #[error("reading today's articles: {0}")]
    Store(#[from] StoreError),

    #[error("generating the report: {0}")]
    Summarizer(#[from] SummarizerError),

    #[error("sending the report: {0}")]
    Notifier(#[from] NotifierError),
}
