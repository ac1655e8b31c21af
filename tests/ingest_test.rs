//! Ingestion flow tests: dedup, validation, normalization, pruning.

use std::sync::Arc;

use newsrag::ingest::Ingestor;
use newsrag::models::NewArticle;
use newsrag::storage::SqliteStorage;
use newsrag::storage::Storage;
use tempfile::TempDir;

async fn fixture() -> (Arc<dyn Storage>, Ingestor, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("ingest.db").display());
    let sqlite = SqliteStorage::connect(&url, 4, 5).await.unwrap();
    sqlite.init_schema().await.unwrap();

    let storage: Arc<dyn Storage> = Arc::new(sqlite);
    let ingestor = Ingestor::new(Arc::clone(&storage));
    (storage, ingestor, dir)
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

#[tokio::test]
async fn batch_dedups_and_validates() {
    let (storage, ingestor, _dir) = fixture().await;

    let report = ingestor
        .ingest_batch(vec![
            record("https://example.com/a", "First", "World"),
            // Same url again within the batch: first insert wins.
            record("https://example.com/a", "First again", "world"),
            record("not a url", "Broken", "world"),
            record("https://example.com/b", "   ", "world"),
            record("https://example.com/c", "Third", ""),
        ])
        .await
        .unwrap();

    assert_eq!(report.inserted, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.invalid, 2);

    let urls = storage.all_urls().await.unwrap();
    assert_eq!(urls.len(), 2);

    // Sections are normalized at ingest; blank falls into the catch-all.
    let counts = storage.section_counts(1).await.unwrap();
    let sections: Vec<&str> = counts.iter().map(|c| c.section.as_str()).collect();
    assert!(sections.contains(&"world"));
    assert!(sections.contains(&"other"));
}

#[tokio::test]
async fn re_ingesting_a_batch_skips_everything() {
    let (_storage, ingestor, _dir) = fixture().await;

    let batch = vec![
        record("https://example.com/a", "First", "world"),
        record("https://example.com/b", "Second", "asia"),
    ];

    let first = ingestor.ingest_batch(batch.clone()).await.unwrap();
    assert_eq!(first.inserted, 2);

    let second = ingestor.ingest_batch(batch).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.skipped, 2);
}

#[tokio::test]
async fn prune_delegates_to_retention() {
    let (storage, ingestor, _dir) = fixture().await;

    ingestor
        .ingest_batch(vec![record("https://example.com/a", "Fresh", "world")])
        .await
        .unwrap();

    // Nothing is old enough to prune.
    assert_eq!(ingestor.prune(7).await.unwrap(), 0);
    assert_eq!(storage.article_count(7).await.unwrap(), 1);
}
