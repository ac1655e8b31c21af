//! Summarization collaborator: per-article summaries, per-section digests
//! and chat-reply condensation.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing::warn;

use crate::llm::LlmClient;
use crate::llm::LlmMessage;
use crate::models::Article;
use crate::rag::context::truncate_chars;
use crate::storage::Storage;
use crate::NewsRagError;
use crate::Result;

/// Character cap on a single article's text in a summary prompt.
const MAX_ARTICLE_PROMPT_CHARS: usize = 4000;

/// Character cap on the joined summaries in a section-digest prompt.
const MAX_SECTION_INPUT_CHARS: usize = 6000;

/// Pause between sequential batch summarization calls.
const BATCH_DELAY: Duration = Duration::from_millis(500);

/// Outcome of a batch summarization run.
#[derive(Debug, Default, Clone, Copy)]
pub struct BatchReport {
    pub success: usize,
    pub failed: usize,
}

/// LLM-backed summarization service.
pub struct Summarizer {
    llm: Arc<LlmClient>,
}

impl Summarizer {
    pub fn new(llm: Arc<LlmClient>) -> Self {
        Self { llm }
    }

    /// Summarise a single article in 2-3 sentences.
    pub async fn summarise_article(&self, title: &str, full_text: &str) -> Result<String> {
        let text = truncate_chars(full_text, MAX_ARTICLE_PROMPT_CHARS);
        let prompt = format!(
            "Summarise the following news article in 2-3 concise sentences. \
             Focus on: what happened, who is involved, and why it matters. \
             Do not start with 'This article' or 'The article'. Write directly. \
             Keep it under 80 words.\n\nTitle: {title}\n\nArticle:\n{text}"
        );

        self.llm.chat(&[LlmMessage::user(prompt)], 0.3, 200).await
    }

    /// Produce a single <=150-word digest for one news section from its
    /// articles' individual summaries. Fails when there is nothing to
    /// summarise; callers fall back to concatenation on any error.
    pub async fn summarise_section(
        &self,
        section_label: &str,
        article_summaries: &[String],
    ) -> Result<String> {
        if article_summaries.is_empty() {
            return Err(NewsRagError::Service(format!(
                "no summaries to digest for section {section_label}"
            )));
        }

        let joined: String = article_summaries
            .iter()
            .map(|s| format!("- {s}"))
            .collect::<Vec<_>>()
            .join("\n");
        let joined = truncate_chars(&joined, MAX_SECTION_INPUT_CHARS);

        let prompt = format!(
            "You are a friendly news editor writing a daily digest for general readers.\n\n\
             Below are individual article summaries from the '{section_label}' news section today.\n\n\
             {joined}\n\n\
             Write a single cohesive digest paragraph (or use bullet points where helpful) that captures \
             the most important stories. Requirements:\n\
             - Maximum 150 words\n\
             - Friendly, clear, conversational tone — easy for anyone to understand\n\
             - Use bullet points for 3 or more distinct topics, otherwise flowing prose is fine\n\
             - Do not start with 'Today' or 'Here is'\n\
             - Do not mention the number of articles\n\
             - Write directly — no preamble like 'This section covers...'"
        );

        self.llm.chat(&[LlmMessage::user(prompt)], 0.4, 250).await
    }

    /// Condense an over-long chat reply into a short conversational one.
    pub async fn condense_reply(&self, question: &str, answer: &str) -> Result<String> {
        let prompt = crate::rag::prompts::build_condense_prompt(question, answer);
        self.llm.chat(&[LlmMessage::user(prompt)], 0.4, 250).await
    }

    /// Summarise articles sequentially, persisting each summary as it lands.
    /// Failures are counted and skipped so one bad article cannot stall the
    /// batch.
    pub async fn summarise_batch(
        &self,
        storage: &Arc<dyn Storage>,
        articles: &[Article],
    ) -> BatchReport {
        let mut report = BatchReport::default();

        for article in articles {
            let text = article.full_text.as_deref().unwrap_or("");
            match self.summarise_article(&article.title, text).await {
                Ok(summary) => match storage.update_summary(article.id, &summary).await {
                    Ok(()) => {
                        report.success += 1;
                        info!(
                            "Summarised article {}: {}",
                            article.id,
                            truncate_chars(&article.title, 50)
                        );
                    }
                    Err(e) => {
                        report.failed += 1;
                        warn!("Failed to store summary for article {}: {e}", article.id);
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    warn!("Failed to summarise article {}: {e}", article.id);
                }
            }

            tokio::time::sleep(BATCH_DELAY).await;
        }

        report
    }
}
