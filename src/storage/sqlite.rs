//! SQLite storage adapter.
//!
//! The vector-similarity path is permanently unavailable on this backend:
//! embedding calls are no-ops and similarity searches return empty results,
//! which callers treat as the signal to fall back to lexical ranking.

use std::collections::HashSet;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::sqlite::SqliteJournalMode;
use sqlx::sqlite::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::debug;
use tracing::info;

use super::map_sqlx_error;
use super::window_cutoff;
use super::Storage;
use crate::config::AppConfig;
use crate::models::Article;
use crate::models::ArticleQuery;
use crate::models::ChatMessage;
use crate::models::ChatRole;
use crate::models::NewArticle;
use crate::models::NewChatMessage;
use crate::models::ScoredArticle;
use crate::models::SectionCount;
use crate::NewsRagError;
use crate::Result;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS articles (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        url          TEXT    UNIQUE NOT NULL,
        title        TEXT    NOT NULL,
        section      TEXT    NOT NULL,
        summary      TEXT,
        full_text    TEXT,
        published_at TEXT,
        scraped_at   TEXT    NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_articles_section ON articles(section)",
    "CREATE INDEX IF NOT EXISTS idx_articles_scraped_at ON articles(scraped_at)",
    r#"
    CREATE TABLE IF NOT EXISTS chat_history (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id   TEXT    NOT NULL,
        role         TEXT    NOT NULL CHECK(role IN ('user','assistant')),
        content      TEXT    NOT NULL,
        article_ids  TEXT    NOT NULL DEFAULT '[]',
        created_at   TEXT    NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_chat_session ON chat_history(session_id)",
    "CREATE INDEX IF NOT EXISTS idx_chat_created ON chat_history(created_at)",
];

/// SQLite-backed storage adapter.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if missing) the database named by the configured url.
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        Self::connect(
            config.database_url(),
            config.max_connections(),
            config.connection_timeout(),
        )
        .await
    }

    pub async fn connect(url: &str, max_connections: u32, timeout_secs: u64) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| NewsRagError::Config(format!("invalid sqlite url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(std::time::Duration::from_secs(timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| map_sqlx_error("connect sqlite", e))?;

        info!("SQLite pool configured: max_connections={}", max_connections);
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn article_from_row(row: &SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row
            .try_get("id")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        url: row
            .try_get("url")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        title: row
            .try_get("title")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        section: row
            .try_get("section")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        summary: row
            .try_get("summary")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        full_text: row
            .try_get("full_text")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        published_at: row
            .try_get("published_at")
            .map_err(|e| map_sqlx_error("decode article", e))?,
        scraped_at: row
            .try_get("scraped_at")
            .map_err(|e| map_sqlx_error("decode article", e))?,
    })
}

fn message_from_row(row: &SqliteRow) -> Result<ChatMessage> {
    let role: String = row
        .try_get("role")
        .map_err(|e| map_sqlx_error("decode message", e))?;
    let role = ChatRole::parse(&role)
        .ok_or_else(|| NewsRagError::Database(format!("unknown chat role: {role}")))?;
    let article_ids: String = row
        .try_get("article_ids")
        .map_err(|e| map_sqlx_error("decode message", e))?;
    let article_ids: Vec<i64> = serde_json::from_str(&article_ids)?;

    Ok(ChatMessage {
        id: row
            .try_get("id")
            .map_err(|e| map_sqlx_error("decode message", e))?,
        session_id: row
            .try_get("session_id")
            .map_err(|e| map_sqlx_error("decode message", e))?,
        role,
        content: row
            .try_get("content")
            .map_err(|e| map_sqlx_error("decode message", e))?,
        article_ids,
        created_at: row
            .try_get("created_at")
            .map_err(|e| map_sqlx_error("decode message", e))?,
    })
}

const ARTICLE_COLUMNS: &str = "id, url, title, section, summary, full_text, published_at, scraped_at";

#[async_trait]
impl Storage for SqliteStorage {
    async fn init_schema(&self) -> Result<()> {
        for migration in MIGRATIONS {
            sqlx::query(migration)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("init schema", e))?;
        }
        Ok(())
    }

    async fn article_exists(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("article exists", e))?;
        Ok(row.is_some())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO articles (url, title, section, summary, full_text, published_at, scraped_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.section)
        .bind(&article.summary)
        .bind(&article.full_text)
        .bind(&article.published_at)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&article.url, e))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_summary(&self, id: i64, summary: &str) -> Result<()> {
        let result = sqlx::query("UPDATE articles SET summary = ? WHERE id = ?")
            .bind(summary)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update summary", e))?;

        if result.rows_affected() == 0 {
            return Err(NewsRagError::NotFound(format!("article {id}")));
        }
        Ok(())
    }

    async fn articles_in_window(&self, query: &ArticleQuery) -> Result<Vec<Article>> {
        let cutoff = window_cutoff(query.days);

        // SQLite sorts NULLs last under DESC, so missing published_at rows
        // naturally fall behind dated ones.
        let rows = if let Some(section) = &query.section {
            sqlx::query(&format!(
                r#"
                SELECT {ARTICLE_COLUMNS}
                FROM articles
                WHERE scraped_at >= ? AND section = ?
                ORDER BY published_at DESC, scraped_at DESC
                LIMIT ? OFFSET ?
                "#
            ))
            .bind(cutoff)
            .bind(section)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query(&format!(
                r#"
                SELECT {ARTICLE_COLUMNS}
                FROM articles
                WHERE scraped_at >= ?
                ORDER BY published_at DESC, scraped_at DESC
                LIMIT ? OFFSET ?
                "#
            ))
            .bind(cutoff)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
        };
        let rows = rows.map_err(|e| map_sqlx_error("articles in window", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn article_by_id(&self, id: i64) -> Result<Article> {
        let row = sqlx::query(&format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("article by id", e))?
            .ok_or_else(|| NewsRagError::NotFound(format!("article {id}")))?;

        article_from_row(&row)
    }

    async fn search_articles(
        &self,
        tokens: &[String],
        days: i64,
        limit: i64,
    ) -> Result<Vec<ScoredArticle>> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        // The predicate set is built per token, but every pattern is bound.
        let mut score_parts = Vec::with_capacity(tokens.len());
        let mut where_parts = Vec::with_capacity(tokens.len());
        for _ in tokens {
            score_parts.push(
                "CASE WHEN LOWER(title) LIKE ? THEN 3 ELSE 0 END \
                 + CASE WHEN LOWER(full_text) LIKE ? THEN 1 ELSE 0 END"
                    .to_string(),
            );
            where_parts.push("(LOWER(title) LIKE ? OR LOWER(full_text) LIKE ?)".to_string());
        }
        let score_expr = score_parts.join(" + ");
        let where_expr = where_parts.join(" OR ");

        let sql = format!(
            r#"
            SELECT {ARTICLE_COLUMNS}, ({score_expr}) AS relevance_score
            FROM articles
            WHERE scraped_at >= ? AND ({where_expr})
            ORDER BY relevance_score DESC, published_at DESC, id DESC
            LIMIT ?
            "#
        );

        // Positional binds follow placeholder order: score patterns first,
        // then the cutoff, then the filter patterns, then the limit.
        let mut q = sqlx::query(&sql);
        for token in tokens {
            let pattern = format!("%{token}%");
            q = q.bind(pattern.clone()).bind(pattern);
        }
        q = q.bind(window_cutoff(days));
        for token in tokens {
            let pattern = format!("%{token}%");
            q = q.bind(pattern.clone()).bind(pattern);
        }
        q = q.bind(limit);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("search articles", e))?;

        rows.iter()
            .map(|row| {
                let score: i64 = row
                    .try_get("relevance_score")
                    .map_err(|e| map_sqlx_error("search articles", e))?;
                Ok(ScoredArticle {
                    article: article_from_row(row)?,
                    score,
                })
            })
            .collect()
    }

    async fn recent_articles(&self, days: i64, limit: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE scraped_at >= ?
            ORDER BY scraped_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(window_cutoff(days))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent articles", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn delete_older_than(&self, days: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE scraped_at < ?")
            .bind(window_cutoff(days))
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("delete older than", e))?;

        let count = result.rows_affected();
        if count > 0 {
            info!("Deleted {} articles older than {} days", count, days);
        }
        Ok(count)
    }

    async fn all_urls(&self) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT url FROM articles")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("all urls", e))?;

        rows.iter()
            .map(|row| {
                row.try_get::<String, _>("url")
                    .map_err(|e| map_sqlx_error("all urls", e))
            })
            .collect()
    }

    async fn section_counts(&self, days: i64) -> Result<Vec<SectionCount>> {
        let rows = sqlx::query(
            r#"
            SELECT section, COUNT(*) AS count, MAX(scraped_at) AS latest
            FROM articles
            WHERE scraped_at >= ?
            GROUP BY section
            ORDER BY count DESC
            "#,
        )
        .bind(window_cutoff(days))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("section counts", e))?;

        rows.iter()
            .map(|row| {
                Ok(SectionCount {
                    section: row
                        .try_get("section")
                        .map_err(|e| map_sqlx_error("section counts", e))?,
                    count: row
                        .try_get("count")
                        .map_err(|e| map_sqlx_error("section counts", e))?,
                    latest: row
                        .try_get("latest")
                        .map_err(|e| map_sqlx_error("section counts", e))?,
                })
            })
            .collect()
    }

    async fn article_count(&self, days: i64) -> Result<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE scraped_at >= ?")
            .bind(window_cutoff(days))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("article count", e))
    }

    async fn last_scraped(&self) -> Result<Option<DateTime<Utc>>> {
        sqlx::query_scalar("SELECT MAX(scraped_at) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("last scraped", e))
    }

    async fn articles_missing_summary(&self, limit: i64) -> Result<Vec<Article>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE summary IS NULL OR summary = ''
            ORDER BY id ASC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("articles missing summary", e))?;

        rows.iter().map(article_from_row).collect()
    }

    async fn articles_missing_embedding(&self, _limit: i64) -> Result<Vec<Article>> {
        // No embedding column on this backend.
        Ok(Vec::new())
    }

    async fn save_message(&self, message: &NewChatMessage) -> Result<i64> {
        let article_ids = serde_json::to_string(&message.article_ids)?;
        let result = sqlx::query(
            r#"
            INSERT INTO chat_history (session_id, role, content, article_ids, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(article_ids)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save message", e))?;

        Ok(result.last_insert_rowid())
    }

    async fn chat_history(&self, session_id: &str, limit: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, article_ids, created_at
            FROM chat_history
            WHERE session_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("chat history", e))?;

        let mut messages: Vec<ChatMessage> = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>>>()?;
        messages.reverse();
        Ok(messages)
    }

    fn vector_search_enabled(&self) -> bool {
        false
    }

    async fn update_embedding(&self, id: i64, _embedding: &[f32]) -> Result<()> {
        debug!("vector search unavailable on sqlite; dropping embedding for article {id}");
        Ok(())
    }

    async fn search_by_similarity(
        &self,
        _query: &[f32],
        _days: i64,
        _limit: i64,
    ) -> Result<Vec<Article>> {
        Ok(Vec::new())
    }
}
