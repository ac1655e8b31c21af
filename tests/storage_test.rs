//! Storage adapter contract tests, run against the SQLite backend.

use std::sync::Arc;

use chrono::Duration;
use chrono::Utc;
use newsrag::models::ArticleQuery;
use newsrag::models::ChatRole;
use newsrag::models::NewArticle;
use newsrag::models::NewChatMessage;
use newsrag::storage::SqliteStorage;
use newsrag::storage::Storage;
use tempfile::TempDir;

async fn open_storage() -> (SqliteStorage, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("test.db").display());
    let storage = SqliteStorage::connect(&url, 4, 5).await.unwrap();
    storage.init_schema().await.unwrap();
    (storage, dir)
}

fn record(url: &str, title: &str, section: &str) -> NewArticle {
    NewArticle {
        url: url.to_string(),
        title: title.to_string(),
        section: section.to_string(),
        summary: None,
        full_text: None,
        published_at: None,
    }
}

/// Backdate a row's scrape time; inserts always stamp "now".
async fn backdate(storage: &SqliteStorage, id: i64, days: i64, extra_secs: i64) {
    let ts = Utc::now() - Duration::days(days) - Duration::seconds(extra_secs);
    sqlx::query("UPDATE articles SET scraped_at = ? WHERE id = ?")
        .bind(ts)
        .bind(id)
        .execute(storage.pool())
        .await
        .unwrap();
}

#[tokio::test]
async fn insert_and_lookup_round_trip() {
    let (storage, _dir) = open_storage().await;

    let id = storage
        .insert_article(&NewArticle {
            url: "https://example.com/a".to_string(),
            title: "MRT line opens".to_string(),
            section: "singapore".to_string(),
            summary: Some("A new line opened.".to_string()),
            full_text: Some("The new MRT line opened on Friday.".to_string()),
            published_at: Some("2026-08-07T08:00:00Z".to_string()),
        })
        .await
        .unwrap();

    assert!(storage.article_exists("https://example.com/a").await.unwrap());
    assert!(!storage.article_exists("https://example.com/b").await.unwrap());

    let article = storage.article_by_id(id).await.unwrap();
    assert_eq!(article.title, "MRT line opens");
    assert_eq!(article.section, "singapore");
    assert_eq!(article.summary.as_deref(), Some("A new line opened."));

    let urls = storage.all_urls().await.unwrap();
    assert!(urls.contains("https://example.com/a"));
}

#[tokio::test]
async fn duplicate_url_is_a_conflict_and_leaves_the_row_unchanged() {
    let (storage, _dir) = open_storage().await;

    let id = storage
        .insert_article(&record("https://example.com/a", "Original title", "world"))
        .await
        .unwrap();

    let err = storage
        .insert_article(&record("https://example.com/a", "Replacement title", "asia"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let article = storage.article_by_id(id).await.unwrap();
    assert_eq!(article.title, "Original title");
    assert_eq!(article.section, "world");
}

#[tokio::test]
async fn missing_ids_are_not_found() {
    let (storage, _dir) = open_storage().await;
    let err = storage.article_by_id(9999).await.unwrap_err();
    assert!(matches!(err, newsrag::NewsRagError::NotFound(_)));

    let err = storage.update_summary(9999, "whatever").await.unwrap_err();
    assert!(matches!(err, newsrag::NewsRagError::NotFound(_)));
}

#[tokio::test]
async fn window_filters_by_section_and_scrape_time() {
    let (storage, _dir) = open_storage().await;

    let fresh_sport = storage
        .insert_article(&record("https://example.com/s1", "Match tonight", "sport"))
        .await
        .unwrap();
    let stale_sport = storage
        .insert_article(&record("https://example.com/s2", "Last week's match", "sport"))
        .await
        .unwrap();
    storage
        .insert_article(&record("https://example.com/w1", "Summit news", "world"))
        .await
        .unwrap();
    backdate(&storage, stale_sport, 3, 0).await;

    let sport = storage
        .articles_in_window(&ArticleQuery {
            section: Some("sport".to_string()),
            days: 1,
            limit: 60,
            offset: 0,
        })
        .await
        .unwrap();
    assert_eq!(sport.len(), 1);
    assert_eq!(sport[0].id, fresh_sport);

    let all = storage
        .articles_in_window(&ArticleQuery {
            section: None,
            days: 7,
            limit: 60,
            offset: 0,
        })
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn window_orders_by_published_then_scraped() {
    let (storage, _dir) = open_storage().await;

    let dated_older = storage
        .insert_article(&NewArticle {
            published_at: Some("2026-08-06T10:00:00Z".to_string()),
            ..record("https://example.com/1", "Older dated", "world")
        })
        .await
        .unwrap();
    let dated_newer = storage
        .insert_article(&NewArticle {
            published_at: Some("2026-08-07T10:00:00Z".to_string()),
            ..record("https://example.com/2", "Newer dated", "world")
        })
        .await
        .unwrap();
    let undated = storage
        .insert_article(&record("https://example.com/3", "Undated", "world"))
        .await
        .unwrap();

    let all = storage
        .articles_in_window(&ArticleQuery {
            section: None,
            days: 1,
            limit: 60,
            offset: 0,
        })
        .await
        .unwrap();
    let ids: Vec<i64> = all.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![dated_newer, dated_older, undated]);
}

#[tokio::test]
async fn delete_older_than_has_a_strict_boundary() {
    let (storage, _dir) = open_storage().await;

    let well_inside = storage
        .insert_article(&record("https://example.com/in", "Fresh", "world"))
        .await
        .unwrap();
    let just_inside = storage
        .insert_article(&record("https://example.com/edge", "Edge", "world"))
        .await
        .unwrap();
    let outside = storage
        .insert_article(&record("https://example.com/out", "Stale", "world"))
        .await
        .unwrap();

    // Just inside: a hair newer than the 7-day cutoff. Outside: older.
    backdate(&storage, just_inside, 7, -30).await;
    backdate(&storage, outside, 7, 30).await;

    let removed = storage.delete_older_than(7).await.unwrap();
    assert_eq!(removed, 1);

    assert!(storage.article_by_id(well_inside).await.is_ok());
    assert!(storage.article_by_id(just_inside).await.is_ok());
    assert!(storage.article_by_id(outside).await.is_err());
}

#[tokio::test]
async fn search_requires_a_token_match_and_weights_titles() {
    let (storage, _dir) = open_storage().await;

    let title_hit = storage
        .insert_article(&NewArticle {
            full_text: Some("Details of the announcement.".to_string()),
            ..record("https://example.com/t", "Housing upgrade announced", "singapore")
        })
        .await
        .unwrap();
    let body_hit = storage
        .insert_article(&NewArticle {
            full_text: Some("The minister discussed housing at length.".to_string()),
            ..record("https://example.com/b", "Parliament round-up", "singapore")
        })
        .await
        .unwrap();
    storage
        .insert_article(&NewArticle {
            full_text: Some("Nothing relevant here.".to_string()),
            ..record("https://example.com/n", "Transport fares", "singapore")
        })
        .await
        .unwrap();

    let results = storage
        .search_articles(&["housing".to_string()], 7, 5)
        .await
        .unwrap();

    // The non-matching article is excluded entirely, not scored zero.
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].article.id, title_hit);
    assert_eq!(results[0].score, 3);
    assert_eq!(results[1].article.id, body_hit);
    assert_eq!(results[1].score, 1);
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[tokio::test]
async fn equal_scores_break_on_published_at() {
    let (storage, _dir) = open_storage().await;

    // A: older published, scraped 2 days ago. B: newer published, 1 day ago.
    let a = storage
        .insert_article(&NewArticle {
            published_at: Some("2026-08-05T10:00:00Z".to_string()),
            ..record("https://example.com/a", "Housing grant", "singapore")
        })
        .await
        .unwrap();
    let b = storage
        .insert_article(&NewArticle {
            published_at: Some("2026-08-06T10:00:00Z".to_string()),
            ..record("https://example.com/b", "Housing grant delays", "singapore")
        })
        .await
        .unwrap();
    backdate(&storage, a, 2, 0).await;
    backdate(&storage, b, 1, 0).await;

    let results = storage
        .search_articles(&["housing".to_string(), "grant".to_string()], 7, 5)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].score, results[1].score);
    assert_eq!(results[0].article.id, b);
    assert_eq!(results[1].article.id, a);
}

#[tokio::test]
async fn search_window_and_limit_are_applied() {
    let (storage, _dir) = open_storage().await;

    let stale = storage
        .insert_article(&record("https://example.com/old", "Housing archive", "singapore"))
        .await
        .unwrap();
    backdate(&storage, stale, 10, 0).await;
    for i in 0..3 {
        storage
            .insert_article(&record(
                &format!("https://example.com/{i}"),
                &format!("Housing update {i}"),
                "singapore",
            ))
            .await
            .unwrap();
    }

    let results = storage
        .search_articles(&["housing".to_string()], 7, 2)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.article.id != stale));
}

#[tokio::test]
async fn recent_articles_order_newest_scrape_first() {
    let (storage, _dir) = open_storage().await;

    let older = storage
        .insert_article(&record("https://example.com/1", "First", "world"))
        .await
        .unwrap();
    let newer = storage
        .insert_article(&record("https://example.com/2", "Second", "world"))
        .await
        .unwrap();
    backdate(&storage, older, 0, 3600).await;

    let recent = storage.recent_articles(7, 10).await.unwrap();
    let ids: Vec<i64> = recent.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![newer, older]);
}

#[tokio::test]
async fn section_counts_cover_the_window() {
    let (storage, _dir) = open_storage().await;

    for i in 0..2 {
        storage
            .insert_article(&record(
                &format!("https://example.com/sg{i}"),
                "Local story",
                "singapore",
            ))
            .await
            .unwrap();
    }
    let stale = storage
        .insert_article(&record("https://example.com/w", "World story", "world"))
        .await
        .unwrap();
    backdate(&storage, stale, 2, 0).await;

    let counts = storage.section_counts(1).await.unwrap();
    assert_eq!(counts.len(), 1);
    assert_eq!(counts[0].section, "singapore");
    assert_eq!(counts[0].count, 2);
    assert!(counts[0].latest.is_some());

    assert_eq!(storage.article_count(1).await.unwrap(), 2);
    assert_eq!(storage.article_count(7).await.unwrap(), 3);
    assert!(storage.last_scraped().await.unwrap().is_some());
}

#[tokio::test]
async fn update_summary_feeds_the_enrichment_queue() {
    let (storage, _dir) = open_storage().await;

    let id = storage
        .insert_article(&record("https://example.com/a", "Story", "world"))
        .await
        .unwrap();

    let missing = storage.articles_missing_summary(10).await.unwrap();
    assert_eq!(missing.len(), 1);

    storage.update_summary(id, "A short summary.").await.unwrap();
    assert!(storage.articles_missing_summary(10).await.unwrap().is_empty());
    assert_eq!(
        storage.article_by_id(id).await.unwrap().summary.as_deref(),
        Some("A short summary.")
    );
}

#[tokio::test]
async fn vector_path_is_soft_disabled_on_sqlite() {
    let (storage, _dir) = open_storage().await;

    let id = storage
        .insert_article(&record("https://example.com/a", "Story", "world"))
        .await
        .unwrap();

    assert!(!storage.vector_search_enabled());
    // Entry points are no-ops returning empty results, never errors.
    storage.update_embedding(id, &[0.0_f32; 4]).await.unwrap();
    assert!(storage
        .search_by_similarity(&[0.0_f32; 4], 7, 5)
        .await
        .unwrap()
        .is_empty());
    assert!(storage.articles_missing_embedding(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn chat_history_returns_the_last_messages_oldest_first() {
    let (storage, _dir) = open_storage().await;

    for (role, content) in [
        (ChatRole::User, "first question"),
        (ChatRole::Assistant, "first answer"),
        (ChatRole::User, "second question"),
    ] {
        storage
            .save_message(&NewChatMessage {
                session_id: "s1".to_string(),
                role,
                content: content.to_string(),
                article_ids: vec![],
            })
            .await
            .unwrap();
    }
    storage
        .save_message(&NewChatMessage {
            session_id: "s2".to_string(),
            role: ChatRole::User,
            content: "other session".to_string(),
            article_ids: vec![1, 2],
        })
        .await
        .unwrap();

    let history = storage.chat_history("s1", 2).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "first answer");
    assert_eq!(history[1].content, "second question");

    let other = storage.chat_history("s2", 10).await.unwrap();
    assert_eq!(other.len(), 1);
    assert_eq!(other[0].article_ids, vec![1, 2]);
    assert_eq!(other[0].role, ChatRole::User);
}

#[tokio::test]
async fn concurrent_inserts_resolve_duplicates_via_conflict() {
    let (storage, _dir) = open_storage().await;
    let storage = Arc::new(storage);

    let mut handles = Vec::new();
    for i in 0..8 {
        let storage = Arc::clone(&storage);
        handles.push(tokio::spawn(async move {
            storage
                .insert_article(&record("https://example.com/same", &format!("try {i}"), "world"))
                .await
        }));
    }

    let mut inserted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => inserted += 1,
            Err(e) if e.is_conflict() => conflicts += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(inserted, 1);
    assert_eq!(conflicts, 7);
}
