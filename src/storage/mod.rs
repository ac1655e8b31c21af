//! Storage adapters for the two supported backends.
//!
//! One [`Storage`] trait fronts SQLite and Postgres; every query uses bound
//! parameters, every call checks out its own pool connection, and backend
//! errors are normalized at this boundary so callers only ever see
//! [`NewsRagError`] kinds.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;

mod postgres;
mod sqlite;

pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;

use crate::config::AppConfig;
use crate::config::StorageBackend;
use crate::models::Article;
use crate::models::ArticleQuery;
use crate::models::ChatMessage;
use crate::models::NewArticle;
use crate::models::NewChatMessage;
use crate::models::ScoredArticle;
use crate::models::SectionCount;
use crate::NewsRagError;
use crate::Result;

/// Backend-agnostic CRUD/query surface over articles and chat history.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Create tables and indexes if they don't exist.
    async fn init_schema(&self) -> Result<()>;

    async fn article_exists(&self, url: &str) -> Result<bool>;

    /// Insert a new article and return its id. Fails with
    /// [`NewsRagError::Conflict`] when the url is already present.
    async fn insert_article(&self, article: &NewArticle) -> Result<i64>;

    /// Set the summary produced by asynchronous enrichment.
    async fn update_summary(&self, id: i64, summary: &str) -> Result<()>;

    /// Articles in the trailing window, newest first by `published_at` then
    /// `scraped_at`. `section = None` means all sections.
    async fn articles_in_window(&self, query: &ArticleQuery) -> Result<Vec<Article>>;

    async fn article_by_id(&self, id: i64) -> Result<Article>;

    /// Lexical relevance query. Scores each article as the sum over tokens
    /// of `title match * 3 + full_text match * 1` (case-insensitive
    /// substring), keeps only articles matching at least one token, and
    /// orders by score desc, `published_at` desc, id desc.
    async fn search_articles(
        &self,
        tokens: &[String],
        days: i64,
        limit: i64,
    ) -> Result<Vec<ScoredArticle>>;

    /// Most recently scraped articles in the window (tokenless fallback).
    async fn recent_articles(&self, days: i64, limit: i64) -> Result<Vec<Article>>;

    /// Delete articles scraped strictly more than `days` days ago; returns
    /// the number removed. A row exactly `days` old is retained.
    async fn delete_older_than(&self, days: i64) -> Result<u64>;

    /// All stored urls, for ingestion dedup.
    async fn all_urls(&self) -> Result<HashSet<String>>;

    /// Per-section counts and latest scrape time within the window.
    async fn section_counts(&self, days: i64) -> Result<Vec<SectionCount>>;

    async fn article_count(&self, days: i64) -> Result<i64>;

    async fn last_scraped(&self) -> Result<Option<DateTime<Utc>>>;

    /// Articles still lacking a summary, oldest first (enrichment feed).
    async fn articles_missing_summary(&self, limit: i64) -> Result<Vec<Article>>;

    /// Articles still lacking an embedding, oldest first. Empty when the
    /// vector capability is unavailable.
    async fn articles_missing_embedding(&self, limit: i64) -> Result<Vec<Article>>;

    async fn save_message(&self, message: &NewChatMessage) -> Result<i64>;

    /// Last `limit` messages for a session, returned oldest-first.
    async fn chat_history(&self, session_id: &str, limit: i64) -> Result<Vec<ChatMessage>>;

    /// Whether the vector-similarity path resolved at startup.
    fn vector_search_enabled(&self) -> bool;

    /// Store a precomputed embedding. A no-op when the capability is absent.
    async fn update_embedding(&self, id: i64, embedding: &[f32]) -> Result<()>;

    /// Articles with a non-null embedding ordered by ascending cosine
    /// distance within the window. Empty when the capability is absent.
    async fn search_by_similarity(
        &self,
        query: &[f32],
        days: i64,
        limit: i64,
    ) -> Result<Vec<Article>>;
}

/// Connect the configured backend and initialize its schema.
pub async fn connect(config: &AppConfig) -> Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage_backend() {
        StorageBackend::Sqlite => Arc::new(SqliteStorage::from_config(config).await?),
        StorageBackend::Postgres => Arc::new(PostgresStorage::from_config(config).await?),
    };
    storage.init_schema().await?;
    Ok(storage)
}

/// Map a sqlx error to the normalized taxonomy at the adapter boundary.
pub(crate) fn map_sqlx_error(context: &str, err: sqlx::Error) -> NewsRagError {
    match &err {
        sqlx::Error::RowNotFound => NewsRagError::NotFound(context.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            NewsRagError::Conflict(context.to_string())
        }
        _ => NewsRagError::Database(format!("{context}: {err}")),
    }
}

/// Cutoff instant for a trailing day window.
pub(crate) fn window_cutoff(days: i64) -> DateTime<Utc> {
    Utc::now() - chrono::Duration::days(days)
}
