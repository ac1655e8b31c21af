//! Digest cache manager.
//!
//! Owns the single shared snapshot of per-section digests. A background
//! worker rebuilds it on a fixed interval; readers only ever take the lock
//! to copy state out, so slow summarization calls can never stall them. A
//! failed rebuild logs and leaves the previous snapshot servable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::error;
use tracing::info;

use crate::llm::LlmClient;
use crate::llm::Summarizer;
use crate::models::section;
use crate::models::Article;
use crate::models::ArticleLink;
use crate::models::ArticleQuery;
use crate::models::CacheStatus;
use crate::models::DigestGroup;
use crate::models::DigestPayload;
use crate::models::DigestSnapshot;
use crate::storage::Storage;
use crate::Result;

/// Window the periodic rebuild always covers, in days.
pub const DIGEST_WINDOW_DAYS: i64 = 1;

/// Interval between periodic rebuilds.
pub const REFRESH_INTERVAL: Duration = Duration::from_secs(3600);

/// Upper bound on articles pulled into one build.
const BUILD_FETCH_LIMIT: i64 = 200;

/// Shared cache state. Guarded by one lock; the lock is only ever held to
/// copy state out or swap a finished snapshot in, never across a build.
struct CacheState {
    snapshot: Arc<DigestSnapshot>,
    ready: bool,
    building: bool,
    built_at: Option<DateTime<Utc>>,
    days: i64,
}

impl CacheState {
    fn empty() -> Self {
        Self {
            snapshot: Arc::new(DigestSnapshot::default()),
            ready: false,
            building: false,
            built_at: None,
            days: DIGEST_WINDOW_DAYS,
        }
    }
}

/// Cache service for per-section digests.
pub struct DigestService {
    storage: Arc<dyn Storage>,
    summarizer: Summarizer,
    state: Mutex<CacheState>,
}

impl DigestService {
    pub fn new(storage: Arc<dyn Storage>, llm: Arc<LlmClient>) -> Self {
        Self {
            storage,
            summarizer: Summarizer::new(llm),
            state: Mutex::new(CacheState::empty()),
        }
    }

    /// Rebuild the shared snapshot. A refresh arriving while a build is in
    /// progress is ignored unless `force` is set. Returns whether a build
    /// ran to completion and was swapped in; failures are logged and leave
    /// the previous snapshot untouched.
    pub async fn refresh(&self, days: i64, force: bool) -> bool {
        {
            let mut state = self.state.lock().await;
            if state.building && !force {
                info!("Digest cache build already in progress, skipping.");
                return false;
            }
            state.building = true;
        }

        info!("Starting digest cache build (days={days})...");
        let result = self.build(days).await;

        let mut state = self.state.lock().await;
        state.building = false;
        match result {
            Ok(snapshot) => {
                info!(
                    "Digest cache ready — {} sections, {} articles.",
                    snapshot.groups.len(),
                    snapshot.total
                );
                state.snapshot = Arc::new(snapshot);
                state.ready = true;
                state.built_at = Some(Utc::now());
                state.days = days;
                true
            }
            Err(e) => {
                error!("Digest cache build failed: {e}");
                false
            }
        }
    }

    /// Serve a digest for the requested window.
    ///
    /// A ready cache covering the same window is returned as-is. Any other
    /// request builds synchronously and returns the result directly, without
    /// touching the shared snapshot — a failing inline build cannot corrupt
    /// the primary cache.
    pub async fn digest(&self, days: i64) -> Result<DigestPayload> {
        {
            let state = self.state.lock().await;
            if state.ready && state.days == days {
                return Ok(DigestPayload {
                    groups: state.snapshot.groups.clone(),
                    total: state.snapshot.total,
                    built_at: state.built_at,
                    cached: true,
                });
            }
        }

        info!("Digest cache miss for days={days}, building synchronously...");
        let snapshot = self.build(days).await?;
        Ok(DigestPayload {
            groups: snapshot.groups,
            total: snapshot.total,
            built_at: Some(Utc::now()),
            cached: false,
        })
    }

    /// Cache state for pollers.
    pub async fn status(&self) -> CacheStatus {
        let state = self.state.lock().await;
        CacheStatus {
            ready: state.ready,
            building: state.building,
            built_at: state.built_at,
            sections: state.snapshot.groups.len(),
        }
    }

    /// Start the background worker: build immediately for the fixed 1-day
    /// window, then rebuild every hour for the same window.
    pub fn spawn_refresh_loop(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REFRESH_INTERVAL);
            loop {
                // The first tick completes immediately.
                interval.tick().await;
                self.refresh(DIGEST_WINDOW_DAYS, false).await;
            }
        })
    }

    /// Build a digest snapshot. The slow part — never called under the lock.
    async fn build(&self, days: i64) -> Result<DigestSnapshot> {
        let articles = self
            .storage
            .articles_in_window(&ArticleQuery {
                section: None,
                days,
                limit: BUILD_FETCH_LIMIT,
                offset: 0,
            })
            .await?;
        let total = articles.len();

        // Group by normalized section, remembering encounter order for
        // sections outside the fixed priority list.
        let mut encounter_order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, Vec<Article>> = HashMap::new();
        for article in articles {
            let key = section::normalize(&article.section);
            if !grouped.contains_key(&key) {
                encounter_order.push(key.clone());
            }
            grouped.entry(key).or_default().push(article);
        }

        let mut ordered: Vec<String> = section::PRIORITY
            .iter()
            .filter(|s| grouped.contains_key(**s))
            .map(|s| (*s).to_string())
            .collect();
        ordered.extend(
            encounter_order
                .into_iter()
                .filter(|s| !section::PRIORITY.contains(&s.as_str())),
        );

        let mut groups = Vec::with_capacity(ordered.len());
        for key in ordered {
            let section_articles = &grouped[&key];
            let label = section::label(&key);
            let icon = section::icon(&key).to_string();

            let raw_summaries: Vec<String> = section_articles
                .iter()
                .filter_map(|a| a.summary.as_deref())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();

            info!(
                "Building digest for section '{}' ({} summaries)...",
                label,
                raw_summaries.len()
            );
            let summary = match self.summarizer.summarise_section(&label, &raw_summaries).await {
                Ok(digest) if !digest.is_empty() => digest,
                Ok(_) | Err(_) => raw_summaries.join(" "),
            };

            let links = section_articles
                .iter()
                .map(|a| ArticleLink {
                    title: a.title.clone(),
                    url: a.url.clone(),
                })
                .collect::<Vec<_>>();

            groups.push(DigestGroup {
                section: key,
                label,
                icon,
                summary,
                article_count: section_articles.len(),
                articles: links,
            });
        }

        Ok(DigestSnapshot { groups, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::storage::SqliteStorage;

    async fn service() -> (Arc<DigestService>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("digest.db").display());
        let storage: Arc<dyn Storage> =
            Arc::new(SqliteStorage::connect(&url, 4, 5).await.unwrap());
        storage.init_schema().await.unwrap();
        let llm = Arc::new(LlmClient::from_config(&AppConfig::default()).unwrap());
        (Arc::new(DigestService::new(storage, llm)), dir)
    }

    #[tokio::test]
    async fn refresh_is_noop_while_building_unless_forced() {
        let (service, _dir) = service().await;

        {
            let mut state = service.state.lock().await;
            state.building = true;
        }
        assert!(!service.refresh(DIGEST_WINDOW_DAYS, false).await);

        let status = service.status().await;
        assert!(!status.ready);
        assert!(status.building);

        // A forced refresh proceeds even mid-build.
        assert!(service.refresh(DIGEST_WINDOW_DAYS, true).await);
        let status = service.status().await;
        assert!(status.ready);
        assert!(!status.building);
    }

    #[tokio::test]
    async fn status_starts_empty() {
        let (service, _dir) = service().await;
        let status = service.status().await;
        assert!(!status.ready);
        assert!(!status.building);
        assert!(status.built_at.is_none());
        assert_eq!(status.sections, 0);
    }
}
