//! Retrieval over the storage adapter: lexical ranking plus the optional
//! vector-similarity path.

use std::sync::Arc;

use tracing::debug;

use crate::embeddings::EmbeddingService;
use crate::models::ScoredArticle;
use crate::rag::MatchType;
use crate::rag::SearchResult;
use crate::storage::Storage;
use crate::Result;

/// Query words that carry no relevance signal.
const STOPWORDS: &[&str] = &[
    "the", "a", "an", "is", "was", "were", "are", "be", "been", "being", "what", "who", "when",
    "where", "why", "how", "tell", "me", "about", "more", "some", "any", "all", "this", "that",
    "these", "those", "in", "on", "at", "to", "from", "of", "for", "with", "and", "or", "but",
    "did", "do", "does", "can", "could", "would", "should", "will", "have", "had", "has", "its",
    "it", "they", "their", "them", "he", "she", "we", "i", "my", "your", "please", "find", "show",
    "give", "latest", "news", "today", "yesterday", "recent", "happened", "whats", "brief",
    "summary", "summarise", "summarize", "know",
];

/// Extract query tokens: lowercase alphabetic runs of length >= 3, with
/// stopwords removed. Duplicates are kept.
pub fn tokenize(query: &str) -> Vec<String> {
    query
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|t| t.len() >= 3)
        .filter(|t| !STOPWORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// Retriever for lexical and vector search over stored articles.
pub struct Retriever {
    storage: Arc<dyn Storage>,
    embeddings: Option<Arc<EmbeddingService>>,
}

impl Retriever {
    /// Create a retriever without the vector path.
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            embeddings: None,
        }
    }

    /// Create a retriever with an embedding collaborator for the vector path.
    pub fn with_embeddings(storage: Arc<dyn Storage>, embeddings: Arc<EmbeddingService>) -> Self {
        Self {
            storage,
            embeddings: Some(embeddings),
        }
    }

    /// Lexical search over the trailing window.
    ///
    /// Tokenless queries (all stopwords or too short) fall back to the most
    /// recently scraped articles in the window, unfiltered.
    pub async fn keyword_search(
        &self,
        query: &str,
        days: i64,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        let tokens = tokenize(query);
        debug!("keyword search: {} token(s) from {:?}", tokens.len(), query);

        if tokens.is_empty() {
            let articles = self.storage.recent_articles(days, limit).await?;
            return Ok(articles
                .into_iter()
                .map(|article| SearchResult {
                    article,
                    score: 0.0,
                    match_type: MatchType::Recency,
                })
                .collect());
        }

        let scored = self.storage.search_articles(&tokens, days, limit).await?;
        Ok(scored
            .into_iter()
            .map(|ScoredArticle { article, score }| SearchResult {
                article,
                score: score as f32,
                match_type: MatchType::Keyword,
            })
            .collect())
    }

    /// Vector-similarity search over the trailing window.
    ///
    /// Returns empty results whenever the capability is absent — no embedding
    /// collaborator configured, or the backend lacks vector support. Callers
    /// treat the empty result as the signal to fall back to keyword search.
    pub async fn semantic_search(
        &self,
        query: &str,
        days: i64,
        limit: i64,
    ) -> Result<Vec<SearchResult>> {
        if !self.storage.vector_search_enabled() {
            return Ok(Vec::new());
        }
        let Some(embeddings) = &self.embeddings else {
            return Ok(Vec::new());
        };

        let query_embedding = embeddings.generate(query).await?;
        let articles = self
            .storage
            .search_by_similarity(&query_embedding, days, limit)
            .await?;

        // Ascending cosine distance maps to a decreasing rank-based score.
        let count = articles.len().max(1);
        Ok(articles
            .into_iter()
            .enumerate()
            .map(|(idx, article)| SearchResult {
                article,
                score: 1.0 - (idx as f32 / count as f32),
                match_type: MatchType::Semantic,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_stopwords_and_short_tokens() {
        let tokens = tokenize("What happened to the MRT line today?");
        assert_eq!(tokens, vec!["mrt".to_string(), "line".to_string()]);
    }

    #[test]
    fn tokenize_all_stopwords_is_empty() {
        assert!(tokenize("what happened today").is_empty());
        assert!(tokenize("the a an").is_empty());
        assert!(tokenize("").is_empty());
    }

    #[test]
    fn tokenize_splits_on_non_alphabetic() {
        let tokens = tokenize("covid-19 vaccine rollout");
        assert_eq!(
            tokens,
            vec![
                "covid".to_string(),
                "vaccine".to_string(),
                "rollout".to_string()
            ]
        );
    }

    #[test]
    fn tokenize_keeps_duplicates() {
        let tokens = tokenize("housing housing grant");
        assert_eq!(
            tokens,
            vec![
                "housing".to_string(),
                "housing".to_string(),
                "grant".to_string()
            ]
        );
    }

    #[test]
    fn tokenize_lowercases() {
        assert_eq!(tokenize("HOUSING Grant"), vec!["housing", "grant"]);
    }
}
