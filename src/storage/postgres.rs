//! Postgres storage adapter.
//!
//! The vector-similarity path rides on the `pgvector` extension and is
//! feature-detected once during schema initialization: when the extension
//! (or the embedding column) cannot be set up, the capability is disabled
//! for the process lifetime and the vector entry points degrade to no-ops.

use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use pgvector::Vector;
use sqlx::postgres::PgPoolOptions;
use sqlx::postgres::PgRow;
use sqlx::PgPool;
use sqlx::Row;
use tracing::debug;
use tracing::info;
use tracing::warn;

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

const ARTICLE_COLUMNS: &str = "id, url, title, section, summary, full_text, published_at, scraped_at";

/// Postgres-backed storage adapter.
#[derive(Debug)]
pub struct PostgresStorage {
    pool: PgPool,
    embedding_dimension: usize,
    vector_enabled: AtomicBool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool, embedding_dimension: usize) -> Self {
        Self {
            pool,
            embedding_dimension,
            vector_enabled: AtomicBool::new(false),
        }
    }

    /// Create a new storage instance from configuration
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let pool_options = PgPoolOptions::new()
            .max_connections(config.max_connections())
            .min_connections(config.min_connections())
            .acquire_timeout(std::time::Duration::from_secs(config.connection_timeout()));

        let pool = pool_options
            .connect(config.database_url())
            .await
            .map_err(|e| map_sqlx_error("connect postgres", e))?;

        info!(
            "Postgres pool configured: max_connections={}, min_connections={}",
            config.max_connections(),
            config.min_connections()
        );

        Ok(Self::new(pool, config.embedding_dimension()))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Attempt to enable the pgvector capability. Any failure downgrades the
    /// vector path to permanent no-ops for this process.
    async fn detect_vector_support(&self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS vector")
            .execute(&self.pool)
            .await
            .map_err(|e| NewsRagError::FeatureUnavailable(format!("vector extension: {e}")))?;

        let dim = self.embedding_dimension;
        sqlx::query(&format!(
            "ALTER TABLE articles ADD COLUMN IF NOT EXISTS embedding vector({dim})"
        ))
        .execute(&self.pool)
        .await
        .map_err(|e| NewsRagError::FeatureUnavailable(format!("embedding column: {e}")))?;

        Ok(())
    }
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage> {
    let role: String = row
        .try_get("role")
        .map_err(|e| map_sqlx_error("decode message", e))?;
    let role = ChatRole::parse(&role)
        .ok_or_else(|| NewsRagError::Database(format!("unknown chat role: {role}")))?;
    let article_ids: serde_json::Value = row
        .try_get("article_ids")
        .map_err(|e| map_sqlx_error("decode message", e))?;
    let article_ids: Vec<i64> = serde_json::from_value(article_ids)?;

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

#[async_trait]
impl Storage for PostgresStorage {
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id           BIGSERIAL PRIMARY KEY,
                url          TEXT UNIQUE NOT NULL,
                title        TEXT NOT NULL,
                section      TEXT NOT NULL,
                summary      TEXT,
                full_text    TEXT,
                published_at TEXT,
                scraped_at   TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("init schema", e))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chat_history (
                id          BIGSERIAL PRIMARY KEY,
                session_id  TEXT NOT NULL,
                role        TEXT NOT NULL CHECK (role IN ('user', 'assistant')),
                content     TEXT NOT NULL,
                article_ids JSONB NOT NULL DEFAULT '[]'::jsonb,
                created_at  TIMESTAMPTZ NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("init schema", e))?;

        for index in [
            "CREATE INDEX IF NOT EXISTS idx_articles_section ON articles(section)",
            "CREATE INDEX IF NOT EXISTS idx_articles_scraped_at ON articles(scraped_at)",
            "CREATE INDEX IF NOT EXISTS idx_chat_session ON chat_history(session_id)",
            "CREATE INDEX IF NOT EXISTS idx_chat_created ON chat_history(created_at)",
        ] {
            sqlx::query(index)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("init schema", e))?;
        }

        // Resolve the optional vector capability exactly once.
        match self.detect_vector_support().await {
            Ok(()) => {
                self.vector_enabled.store(true, Ordering::Relaxed);
                info!("pgvector capability enabled (dimension {})", self.embedding_dimension);
            }
            Err(e) => {
                self.vector_enabled.store(false, Ordering::Relaxed);
                warn!("vector search disabled for this process: {e}");
            }
        }

        Ok(())
    }

    async fn article_exists(&self, url: &str) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM articles WHERE url = $1")
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("article exists", e))?;
        Ok(row.is_some())
    }

    async fn insert_article(&self, article: &NewArticle) -> Result<i64> {
        sqlx::query_scalar(
            r#"
            INSERT INTO articles (url, title, section, summary, full_text, published_at, scraped_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&article.url)
        .bind(&article.title)
        .bind(&article.section)
        .bind(&article.summary)
        .bind(&article.full_text)
        .bind(&article.published_at)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error(&article.url, e))
    }

    async fn update_summary(&self, id: i64, summary: &str) -> Result<()> {
        let result = sqlx::query("UPDATE articles SET summary = $1 WHERE id = $2")
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

        // published_at DESC would put NULLs first on Postgres; push them last
        // to match the SQLite adapter.
        let articles = if let Some(section) = &query.section {
            sqlx::query_as::<_, Article>(&format!(
                r#"
                SELECT {ARTICLE_COLUMNS}
                FROM articles
                WHERE scraped_at >= $1 AND section = $2
                ORDER BY published_at DESC NULLS LAST, scraped_at DESC
                LIMIT $3 OFFSET $4
                "#
            ))
            .bind(cutoff)
            .bind(section)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Article>(&format!(
                r#"
                SELECT {ARTICLE_COLUMNS}
                FROM articles
                WHERE scraped_at >= $1
                ORDER BY published_at DESC NULLS LAST, scraped_at DESC
                LIMIT $2 OFFSET $3
                "#
            ))
            .bind(cutoff)
            .bind(query.limit)
            .bind(query.offset)
            .fetch_all(&self.pool)
            .await
        };

        articles.map_err(|e| map_sqlx_error("articles in window", e))
    }

    async fn article_by_id(&self, id: i64) -> Result<Article> {
        sqlx::query_as::<_, Article>(&format!(
            "SELECT {ARTICLE_COLUMNS} FROM articles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("article by id", e))?
        .ok_or_else(|| NewsRagError::NotFound(format!("article {id}")))
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

        // Numbered parameters let the score expression and the filter share
        // one bound pattern per token. $1 is the window cutoff.
        let mut score_parts = Vec::with_capacity(tokens.len());
        let mut where_parts = Vec::with_capacity(tokens.len());
        for i in 0..tokens.len() {
            let p = i + 2;
            score_parts.push(format!(
                "CASE WHEN LOWER(title) LIKE ${p} THEN 3 ELSE 0 END \
                 + CASE WHEN LOWER(full_text) LIKE ${p} THEN 1 ELSE 0 END"
            ));
            where_parts.push(format!(
                "(LOWER(title) LIKE ${p} OR LOWER(full_text) LIKE ${p})"
            ));
        }
        let score_expr = score_parts.join(" + ");
        let where_expr = where_parts.join(" OR ");
        let limit_param = tokens.len() + 2;

        let sql = format!(
            r#"
            SELECT {ARTICLE_COLUMNS}, ({score_expr}) AS relevance_score
            FROM articles
            WHERE scraped_at >= $1 AND ({where_expr})
            ORDER BY relevance_score DESC, published_at DESC NULLS LAST, id DESC
            LIMIT ${limit_param}
            "#
        );

        let mut q = sqlx::query(&sql).bind(window_cutoff(days));
        for token in tokens {
            q = q.bind(format!("%{token}%"));
        }
        q = q.bind(limit);

        let rows = q
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("search articles", e))?;

        rows.iter()
            .map(|row| {
                let score: i32 = row
                    .try_get("relevance_score")
                    .map_err(|e| map_sqlx_error("search articles", e))?;
                let article = Article {
                    id: row.try_get("id").map_err(|e| map_sqlx_error("search articles", e))?,
                    url: row.try_get("url").map_err(|e| map_sqlx_error("search articles", e))?,
                    title: row
                        .try_get("title")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                    section: row
                        .try_get("section")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                    summary: row
                        .try_get("summary")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                    full_text: row
                        .try_get("full_text")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                    published_at: row
                        .try_get("published_at")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                    scraped_at: row
                        .try_get("scraped_at")
                        .map_err(|e| map_sqlx_error("search articles", e))?,
                };
                Ok(ScoredArticle {
                    article,
                    score: i64::from(score),
                })
            })
            .collect()
    }

    async fn recent_articles(&self, days: i64, limit: i64) -> Result<Vec<Article>> {
        sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE scraped_at >= $1
            ORDER BY scraped_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(window_cutoff(days))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("recent articles", e))
    }

    async fn delete_older_than(&self, days: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM articles WHERE scraped_at < $1")
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
        let urls: Vec<String> = sqlx::query_scalar("SELECT url FROM articles")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("all urls", e))?;
        Ok(urls.into_iter().collect())
    }

    async fn section_counts(&self, days: i64) -> Result<Vec<SectionCount>> {
        let rows = sqlx::query(
            r#"
            SELECT section, COUNT(*) AS count, MAX(scraped_at) AS latest
            FROM articles
            WHERE scraped_at >= $1
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
        sqlx::query_scalar("SELECT COUNT(*) FROM articles WHERE scraped_at >= $1")
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
        sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE summary IS NULL OR summary = ''
            ORDER BY id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("articles missing summary", e))
    }

    async fn articles_missing_embedding(&self, limit: i64) -> Result<Vec<Article>> {
        if !self.vector_search_enabled() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE embedding IS NULL
            ORDER BY id ASC
            LIMIT $1
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("articles missing embedding", e))
    }

    async fn save_message(&self, message: &NewChatMessage) -> Result<i64> {
        let article_ids = serde_json::to_value(&message.article_ids)?;
        sqlx::query_scalar(
            r#"
            INSERT INTO chat_history (session_id, role, content, article_ids, created_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(&message.session_id)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(article_ids)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("save message", e))
    }

    async fn chat_history(&self, session_id: &str, limit: i64) -> Result<Vec<ChatMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, session_id, role, content, article_ids, created_at
            FROM chat_history
            WHERE session_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
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
        self.vector_enabled.load(Ordering::Relaxed)
    }

    async fn update_embedding(&self, id: i64, embedding: &[f32]) -> Result<()> {
        if !self.vector_search_enabled() {
            debug!("vector search disabled; dropping embedding for article {id}");
            return Ok(());
        }

        let result = sqlx::query("UPDATE articles SET embedding = $1 WHERE id = $2")
            .bind(Vector::from(embedding.to_vec()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("update embedding", e))?;

        if result.rows_affected() == 0 {
            return Err(NewsRagError::NotFound(format!("article {id}")));
        }
        Ok(())
    }

    async fn search_by_similarity(
        &self,
        query: &[f32],
        days: i64,
        limit: i64,
    ) -> Result<Vec<Article>> {
        if !self.vector_search_enabled() {
            return Ok(Vec::new());
        }

        sqlx::query_as::<_, Article>(&format!(
            r#"
            SELECT {ARTICLE_COLUMNS}
            FROM articles
            WHERE embedding IS NOT NULL AND scraped_at >= $1
            ORDER BY embedding <=> $2
            LIMIT $3
            "#
        ))
        .bind(window_cutoff(days))
        .bind(Vector::from(query.to_vec()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("search by similarity", e))
    }
}
