//! Durable article store with link-keyed deduplication.
//!
//! The `articles` table holds one row per article link. The pipeline relies
//! on [`ArticleStore::insert_if_absent`] being atomic: when several source
//! tasks race on the same link exactly one of them sees `true`, and only that
//! one announces the article.
//!
//! [`SqliteStore`] keeps a single `rusqlite` connection behind a mutex and
//! runs every statement on the blocking pool so source tasks never stall the
//! runtime while SQLite works.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, Row};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::models::ArticleRecord;
use crate::utils::normalize_tag;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS articles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source TEXT NOT NULL,
        headline TEXT NOT NULL,
        link TEXT NOT NULL UNIQUE,
        highlights TEXT,
        openai_summary TEXT,
        date_scraped TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_articles_date_scraped ON articles(date_scraped DESC);
    CREATE INDEX IF NOT EXISTS idx_articles_source ON articles(source, date_scraped);
";

const SELECT_COLUMNS: &str =
    "SELECT source, headline, link, highlights, openai_summary, date_scraped FROM articles";

/// Contract of the dedup store used by the pipeline and the reporting
/// commands.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Create the schema if needed. Safe to call on every start.
    async fn init_schema(&self) -> Result<(), StoreError>;

    /// Insert `record` unless an article with the same link exists.
    /// Returns whether a row was created.
    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<bool, StoreError>;

    /// Store the generated summary of an existing article.
    async fn attach_summary(&self, link: &str, summary: &str) -> Result<(), StoreError>;

    /// Articles first seen at or after `since`, oldest first.
    async fn articles_since(&self, since: DateTime<Utc>) -> Result<Vec<ArticleRecord>, StoreError>;

    /// Article count per source since `since`, ordered by source name.
    async fn counts_by_source_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, u64)>, StoreError>;

    /// Newest articles whose highlights mention the tags (case-insensitive,
    /// leading `#` ignored). `match_any` selects OR versus AND semantics.
    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
        match_any: bool,
    ) -> Result<Vec<ArticleRecord>, StoreError>;
}

/// SQLite implementation of [`ArticleStore`].
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

/// Fixed-width UTC timestamps so text ordering matches time ordering.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<ArticleRecord> {
    let seen: String = row.get(5)?;
    let first_seen_at = DateTime::parse_from_rfc3339(&seen)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(e)))?;
    Ok(ArticleRecord {
        source: row.get(0)?,
        headline: row.get(1)?,
        link: row.get(2)?,
        highlights: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        summary: row.get(4)?,
        first_seen_at,
    })
}

impl SqliteStore {
    /// Open (or create) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opened article database");
        Ok(Self::from_connection(conn))
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        let out = tokio::task::spawn_blocking(move || {
            let guard = conn.lock();
            f(&guard)
        })
        .await??;
        Ok(out)
    }

    /// Drop the `articles` table and create an empty schema in its place.
    /// Returns how many articles were discarded.
    #[instrument(level = "info", skip_all)]
    pub async fn recreate(&self) -> Result<u64, StoreError> {
        let dropped = self
            .with_conn(|conn| {
                let dropped = conn
                    .query_row(
                        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'articles'",
                        [],
                        |r| r.get::<_, i64>(0),
                    )
                    .and_then(|exists| {
                        if exists == 0 {
                            Ok(0)
                        } else {
                            conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get::<_, i64>(0))
                        }
                    })?;
                conn.execute_batch(&format!("BEGIN; DROP TABLE IF EXISTS articles; {SCHEMA} COMMIT;"))?;
                Ok(dropped.max(0) as u64)
            })
            .await?;
        info!(dropped, "Article schema recreated");
        Ok(dropped)
    }

    #[cfg(test)]
    pub async fn find_by_link(&self, link: &str) -> Result<Option<ArticleRecord>, StoreError> {
        use rusqlite::OptionalExtension;
        let link = link.to_string();
        self.with_conn(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE link = ?1"),
                params![link],
                record_from_row,
            )
            .optional()
        })
        .await
    }

    #[cfg(test)]
    pub async fn count(&self) -> Result<u64, StoreError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM articles", [], |r| r.get::<_, i64>(0))
        })
        .await
        .map(|n| n.max(0) as u64)
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    #[instrument(level = "info", skip_all)]
    async fn init_schema(&self) -> Result<(), StoreError> {
        self.with_conn(|conn| conn.execute_batch(SCHEMA)).await?;
        info!("Article schema ready");
        Ok(())
    }

    async fn insert_if_absent(&self, record: &ArticleRecord) -> Result<bool, StoreError> {
        let record = record.clone();
        // The row count is read under the same lock as the insert, and the
        // UNIQUE constraint on `link` decides the race.
        let inserted = self
            .with_conn(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO articles
                     (source, headline, link, highlights, openai_summary, date_scraped)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        record.source,
                        record.headline,
                        record.link,
                        record.highlights,
                        record.summary,
                        format_ts(&record.first_seen_at),
                    ],
                )
            })
            .await?;
        Ok(inserted == 1)
    }

    async fn attach_summary(&self, link: &str, summary: &str) -> Result<(), StoreError> {
        let (link, summary) = (link.to_string(), summary.to_string());
        let key = link.clone();
        let updated = self
            .with_conn(move |conn| {
                conn.execute(
                    "UPDATE articles SET openai_summary = ?1 WHERE link = ?2",
                    params![summary, link],
                )
            })
            .await?;
        if updated == 0 {
            return Err(StoreError::UnknownLink(key));
        }
        debug!(link = %key, "Stored article summary");
        Ok(())
    }

    async fn articles_since(&self, since: DateTime<Utc>) -> Result<Vec<ArticleRecord>, StoreError> {
        let since = format_ts(&since);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS} WHERE date_scraped >= ?1 ORDER BY date_scraped ASC, id ASC"
            ))?;
            let records = stmt
                .query_map(params![since], record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }

    async fn counts_by_source_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(String, u64)>, StoreError> {
        let since = format_ts(&since);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT source, COUNT(*) FROM articles
                 WHERE date_scraped >= ?1
                 GROUP BY source ORDER BY source",
            )?;
            let counts = stmt
                .query_map(params![since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?.max(0) as u64))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(counts)
        })
        .await
    }

    async fn search_by_tags(
        &self,
        tags: &[String],
        limit: usize,
        match_any: bool,
    ) -> Result<Vec<ArticleRecord>, StoreError> {
        let patterns: Vec<String> = tags
            .iter()
            .map(|t| normalize_tag(t))
            .filter(|t| !t.is_empty())
            .map(|t| format!("%{t}%"))
            .collect();
        if patterns.is_empty() {
            return Ok(Vec::new());
        }

        let connector = if match_any { " OR " } else { " AND " };
        let where_clause = vec!["lower(highlights) LIKE ?"; patterns.len()].join(connector);
        let query = format!(
            "{SELECT_COLUMNS} WHERE {where_clause} ORDER BY date_scraped DESC, id DESC LIMIT {limit}"
        );
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(&query)?;
            let records = stmt
                .query_map(params_from_iter(patterns.iter()), record_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}
