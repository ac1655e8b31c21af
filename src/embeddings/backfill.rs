//! Backfill embeddings for articles that don't have one yet.

use std::sync::Arc;

use futures::future::try_join_all;
use tracing::info;

use crate::embeddings::EmbeddingService;
use crate::embeddings::MAX_BATCH_SIZE;
use crate::models::Article;
use crate::rag::context::truncate_chars;
use crate::storage::Storage;
use crate::Result;

/// Text handed to the embedding collaborator for one article.
fn embedding_text(article: &Article) -> String {
    format!(
        "{}\n{}",
        article.title,
        truncate_chars(article.context_text(), 2000)
    )
}

/// Embed up to `limit` articles currently missing an embedding.
///
/// A no-op returning 0 when the storage backend has no vector capability.
pub async fn backfill_embeddings(
    storage: &Arc<dyn Storage>,
    embeddings: &Arc<EmbeddingService>,
    limit: i64,
) -> Result<usize> {
    if !storage.vector_search_enabled() {
        info!("vector search unavailable; skipping embedding backfill");
        return Ok(0);
    }

    let articles = storage.articles_missing_embedding(limit).await?;
    if articles.is_empty() {
        return Ok(0);
    }

    let mut embedded = 0;
    for chunk in articles.chunks(MAX_BATCH_SIZE) {
        let texts: Vec<String> = chunk.iter().map(embedding_text).collect();
        let vectors = embeddings.generate_batch(&texts).await?;

        // Vectors come back in input order; persist the chunk concurrently.
        try_join_all(
            chunk
                .iter()
                .zip(vectors.iter())
                .map(|(article, vector)| storage.update_embedding(article.id, vector)),
        )
        .await?;

        embedded += chunk.len();
        info!("Embedded {} / {} articles", embedded, articles.len());
    }

    Ok(embedded)
}
