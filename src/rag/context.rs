//! Context assembly from retrieved articles.

use crate::models::Article;

/// Character budget applied to each article's text in the context block.
pub const MAX_ARTICLE_TEXT_CHARS: usize = 1500;

/// Assembler for rendering retrieved articles into a numbered context block.
pub struct ContextAssembler {
    max_article_text_chars: usize,
}

impl ContextAssembler {
    pub fn new(max_article_text_chars: usize) -> Self {
        Self {
            max_article_text_chars,
        }
    }

    /// Render articles as a readable context block for the generation
    /// collaborator. Empty input yields an empty string, which callers use
    /// to omit the context message entirely.
    pub fn assemble(&self, articles: &[Article]) -> String {
        let mut parts = Vec::with_capacity(articles.len());

        for (idx, article) in articles.iter().enumerate() {
            let text = truncate_chars(article.context_text(), self.max_article_text_chars);
            parts.push(format!(
                "[Article {}]\nTitle: {}\nSection: {} | Published: {}\n{}\n---",
                idx + 1,
                article.title,
                article.section,
                article.display_time(),
                text,
            ));
        }

        parts.join("\n")
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(MAX_ARTICLE_TEXT_CHARS)
    }
}

/// Truncate to a character budget without splitting a code point.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
