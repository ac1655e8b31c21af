//! Retrieval and chat orchestration.
//!
//! This module ties the ranking paths to the generation collaborator:
//! - Lexical retrieval over stored articles (weighted substring scoring)
//! - Optional vector retrieval over precomputed embeddings
//! - Context assembly from retrieved articles
//! - Conversation orchestration with bounded history and fallback replies
//!
//! # Examples
//!
//! ```rust,no_run
//! use newsrag::config::AppConfig;
//! use newsrag::rag::ChatService;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let storage = newsrag::storage::connect(&config).await?;
//!     let service = ChatService::new(storage, &config)?;
//!
//!     let outcome = service.chat("session-1", "any housing news?").await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod pipeline;
pub mod prompts;
pub mod retriever;

pub use context::ContextAssembler;
pub use pipeline::ChatOutcome;
pub use pipeline::ChatService;
pub use retriever::tokenize;
pub use retriever::Retriever;

use crate::models::Article;

/// Search result with relevance score
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub article: Article,
    pub score: f32,
    pub match_type: MatchType,
}

/// Type of match for the search result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchType {
    /// Text keyword match
    Keyword,
    /// Vector similarity match
    Semantic,
    /// Tokenless query served from the recency fallback
    Recency,
}
