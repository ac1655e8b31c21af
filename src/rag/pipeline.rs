//! Conversation orchestration: retrieve -> assemble -> generate -> persist.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::config::AppConfig;
use crate::llm::LlmClient;
use crate::llm::LlmMessage;
use crate::llm::Summarizer;
use crate::models::Article;
use crate::models::ChatRole;
use crate::models::NewChatMessage;
use crate::models::SourceRef;
use crate::rag::prompts;
use crate::rag::ContextAssembler;
use crate::rag::Retriever;
use crate::storage::Storage;
use crate::NewsRagError;
use crate::Result;

/// Articles retrieved as context for one question.
pub const MAX_CONTEXT_ARTICLES: i64 = 5;

/// Trailing window searched for context, in days.
pub const SEARCH_WINDOW_DAYS: i64 = 7;

/// Conversation turns (user+assistant pairs) carried into the prompt.
pub const MAX_HISTORY_TURNS: i64 = 6;

/// Replies longer than this get one condensation pass.
pub const CONDENSE_THRESHOLD_CHARS: usize = 800;

/// Result of one conversation turn.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub reply: String,
    /// Grounding article ids; empty when generation degraded.
    pub article_ids: Vec<i64>,
    pub sources: Vec<SourceRef>,
}

/// Chat service composing lexical retrieval with the generation collaborator.
pub struct ChatService {
    storage: Arc<dyn Storage>,
    retriever: Retriever,
    assembler: ContextAssembler,
    llm: Arc<LlmClient>,
    summarizer: Summarizer,
}

impl ChatService {
    pub fn new(storage: Arc<dyn Storage>, config: &AppConfig) -> Result<Self> {
        let llm = Arc::new(LlmClient::from_config(config)?);
        Ok(Self {
            retriever: Retriever::new(Arc::clone(&storage)),
            assembler: ContextAssembler::default(),
            summarizer: Summarizer::new(Arc::clone(&llm)),
            storage,
            llm,
        })
    }

    /// Run one conversation turn.
    ///
    /// Both the user message and the final assistant reply are persisted on
    /// every path, so history survives even when generation degrades to a
    /// fallback reply.
    pub async fn chat(&self, session_id: &str, user_message: &str) -> Result<ChatOutcome> {
        let today = Utc::now().format("%Y-%m-%d").to_string();

        // Bounded trailing history, read before the new turn lands.
        let history = self
            .storage
            .chat_history(session_id, MAX_HISTORY_TURNS * 2)
            .await?;

        self.storage
            .save_message(&NewChatMessage {
                session_id: session_id.to_string(),
                role: ChatRole::User,
                content: user_message.to_string(),
                article_ids: Vec::new(),
            })
            .await?;

        let results = self
            .retriever
            .keyword_search(user_message, SEARCH_WINDOW_DAYS, MAX_CONTEXT_ARTICLES)
            .await?;
        let articles: Vec<Article> = results.into_iter().map(|r| r.article).collect();
        let article_ids: Vec<i64> = articles.iter().map(|a| a.id).collect();
        debug!(
            "retrieved {} context article(s) for session {}",
            articles.len(),
            session_id
        );

        let mut messages = vec![LlmMessage::system(prompts::build_persona_prompt(&today))];
        let context_block = self.assembler.assemble(&articles);
        if !context_block.is_empty() {
            messages.push(LlmMessage::system(prompts::build_context_prompt(
                &context_block,
            )));
        }
        for turn in &history {
            messages.push(match turn.role {
                ChatRole::User => LlmMessage::user(turn.content.clone()),
                ChatRole::Assistant => LlmMessage::assistant(turn.content.clone()),
            });
        }
        messages.push(LlmMessage::user(user_message));

        let (reply, final_ids) = match self.llm.chat(&messages, 0.5, 1024).await {
            Ok(raw) => {
                let reply = self.maybe_condense(user_message, raw).await;
                (reply, article_ids)
            }
            Err(e) => {
                error!("generation failed for session {session_id}: {e}");
                (fallback_reply(&e).to_string(), Vec::new())
            }
        };

        self.storage
            .save_message(&NewChatMessage {
                session_id: session_id.to_string(),
                role: ChatRole::Assistant,
                content: reply.clone(),
                article_ids: final_ids.clone(),
            })
            .await?;

        let sources = articles
            .into_iter()
            .filter(|a| final_ids.contains(&a.id))
            .map(|a| SourceRef {
                id: a.id,
                title: a.title,
                url: a.url,
                section: a.section,
            })
            .collect();

        info!("chat turn completed for session {session_id}");
        Ok(ChatOutcome {
            reply,
            article_ids: final_ids,
            sources,
        })
    }

    /// One condensation pass for over-long replies; the raw reply survives a
    /// condensation failure.
    async fn maybe_condense(&self, question: &str, raw: String) -> String {
        if raw.chars().count() <= CONDENSE_THRESHOLD_CHARS {
            return raw;
        }
        match self.summarizer.condense_reply(question, &raw).await {
            Ok(condensed) if !condensed.is_empty() => condensed,
            Ok(_) => raw,
            Err(e) => {
                warn!("condensation failed, keeping raw reply: {e}");
                raw
            }
        }
    }
}

/// Clearly worded reply substituted when generation degrades.
fn fallback_reply(err: &NewsRagError) -> &'static str {
    match err {
        NewsRagError::Config(_) => {
            "Chat is not configured. Please set the LLM API key in config.toml."
        }
        NewsRagError::Transient(_) => {
            "I'm temporarily rate-limited. Please try again in a moment."
        }
        _ => "Sorry, I encountered an error connecting to the AI service.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_replies_track_error_kinds() {
        assert!(fallback_reply(&NewsRagError::Config("no key".into())).contains("not configured"));
        assert!(fallback_reply(&NewsRagError::Transient("429".into())).contains("rate-limited"));
        assert!(fallback_reply(&NewsRagError::Service("500".into())).contains("error"));
    }
}
