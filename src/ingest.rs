//! Ingestion: accept raw article records from the ingestion collaborator,
//! dedup against stored urls, and prune expired rows.
//!
//! Scraping and parsing of source pages happen outside this crate; records
//! arrive already extracted.

use std::sync::Arc;

use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

use crate::models::section;
use crate::models::NewArticle;
use crate::storage::Storage;
use crate::Result;

/// Outcome of one ingestion batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct IngestReport {
    pub inserted: usize,
    pub skipped: usize,
    pub invalid: usize,
}

/// Writes ingestion-collaborator records through the storage adapter.
pub struct Ingestor {
    storage: Arc<dyn Storage>,
}

impl Ingestor {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Insert a batch of raw records.
    ///
    /// Records with an unparseable url or an empty title are dropped as
    /// invalid. Urls already present are skipped; a duplicate racing past
    /// the pre-check surfaces as a storage `Conflict` and is also treated
    /// as "already present, skip".
    pub async fn ingest_batch(&self, records: Vec<NewArticle>) -> Result<IngestReport> {
        let known = self.storage.all_urls().await?;
        let mut report = IngestReport::default();

        for mut record in records {
            if Url::parse(&record.url).is_err() || record.title.trim().is_empty() {
                warn!("dropping invalid record: {:?}", record.url);
                report.invalid += 1;
                continue;
            }
            if known.contains(&record.url) {
                report.skipped += 1;
                continue;
            }

            record.section = section::normalize(&record.section);
            match self.storage.insert_article(&record).await {
                Ok(id) => {
                    debug!("inserted article {} ({})", id, record.url);
                    report.inserted += 1;
                }
                Err(e) if e.is_conflict() => {
                    debug!("duplicate insert race for {}, skipping", record.url);
                    report.skipped += 1;
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            "Ingested batch: {} inserted, {} skipped, {} invalid",
            report.inserted, report.skipped, report.invalid
        );
        Ok(report)
    }

    /// Remove articles scraped strictly more than `days` days ago.
    pub async fn prune(&self, days: i64) -> Result<u64> {
        self.storage.delete_older_than(days).await
    }
}
