use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sqlx::FromRow;

/// A stored news article.
///
/// `scraped_at` is assigned by the storage adapter at insert time and is the
/// sole basis for time-window filtering and retention. `published_at` is the
/// source-reported time and is kept as a free-form string.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Article {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub section: String,
    pub summary: Option<String>,
    pub full_text: Option<String>,
    pub published_at: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl Article {
    /// Text used for retrieval context: full text when present, else summary.
    pub fn context_text(&self) -> &str {
        self.full_text
            .as_deref()
            .or(self.summary.as_deref())
            .unwrap_or("")
    }

    /// Display time: published time when reported, else the scrape time.
    pub fn display_time(&self) -> String {
        self.published_at
            .clone()
            .unwrap_or_else(|| self.scraped_at.to_rfc3339())
    }
}

/// A raw article record supplied by the ingestion collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewArticle {
    pub url: String,
    pub title: String,
    pub section: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub full_text: Option<String>,
    #[serde(default)]
    pub published_at: Option<String>,
}

/// An article with its lexical relevance score.
///
/// The score is the sum over query tokens of `title match * 3 + body match * 1`.
#[derive(Debug, Clone)]
pub struct ScoredArticle {
    pub article: Article,
    pub score: i64,
}

/// Chat message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// A persisted chat message. Append-only per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: i64,
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    /// Ordered article ids used as grounding; empty when none.
    pub article_ids: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

/// A chat message to persist.
#[derive(Debug, Clone)]
pub struct NewChatMessage {
    pub session_id: String,
    pub role: ChatRole,
    pub content: String,
    pub article_ids: Vec<i64>,
}

/// Per-section article count with the latest scrape time.
#[derive(Debug, Clone, Serialize)]
pub struct SectionCount {
    pub section: String,
    pub count: i64,
    pub latest: Option<DateTime<Utc>>,
}

/// Window query for listing articles.
#[derive(Debug, Clone, Default)]
pub struct ArticleQuery {
    /// `None` means all sections.
    pub section: Option<String>,
    pub days: i64,
    pub limit: i64,
    pub offset: i64,
}

/// A title/link pair attached to a digest group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleLink {
    pub title: String,
    pub url: String,
}

/// One section's aggregated digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestGroup {
    pub section: String,
    pub label: String,
    pub icon: String,
    pub summary: String,
    pub article_count: usize,
    pub articles: Vec<ArticleLink>,
}

/// The payload of one digest build.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DigestSnapshot {
    pub groups: Vec<DigestGroup>,
    pub total: usize,
}

/// A digest served to a reader, cached or built inline.
#[derive(Debug, Clone, Serialize)]
pub struct DigestPayload {
    pub groups: Vec<DigestGroup>,
    pub total: usize,
    pub built_at: Option<DateTime<Utc>>,
    pub cached: bool,
}

/// Digest cache state visible to pollers.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub ready: bool,
    pub building: bool,
    pub built_at: Option<DateTime<Utc>>,
    pub sections: usize,
}

/// A grounding source returned alongside a chat reply.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub id: i64,
    pub title: String,
    pub url: String,
    pub section: String,
}

/// Section naming: the fixed priority buckets plus a catch-all.
pub mod section {
    /// Bucket for articles with an empty or missing section.
    pub const OTHER: &str = "other";

    /// Fixed presentation order; remaining sections follow in encounter order.
    pub const PRIORITY: [&str; 5] = ["singapore", "asia", "world", "business", "sport"];

    /// Lowercase a section value, mapping empty/blank to the catch-all bucket.
    pub fn normalize(raw: &str) -> String {
        let s = raw.trim().to_lowercase();
        if s.is_empty() {
            OTHER.to_string()
        } else {
            s
        }
    }

    /// Human-readable label for a section.
    pub fn label(section: &str) -> String {
        match section {
            "singapore" => "Singapore".to_string(),
            "asia" => "Asia".to_string(),
            "world" => "World".to_string(),
            "business" => "Business".to_string(),
            "sport" => "Sport".to_string(),
            other => {
                let mut chars = other.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            }
        }
    }

    /// Icon for a section.
    pub fn icon(section: &str) -> &'static str {
        match section {
            "singapore" => "🇸🇬",
            "asia" => "🌏",
            "world" => "🌍",
            "business" => "💼",
            "sport" => "⚽",
            _ => "📰",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_normalize_defaults_unknown_to_other() {
        assert_eq!(section::normalize("Sport"), "sport");
        assert_eq!(section::normalize("  "), "other");
        assert_eq!(section::normalize(""), "other");
        assert_eq!(section::normalize("Tech"), "tech");
    }

    #[test]
    fn section_labels_and_icons() {
        assert_eq!(section::label("singapore"), "Singapore");
        assert_eq!(section::label("tech"), "Tech");
        assert_eq!(section::icon("sport"), "⚽");
        assert_eq!(section::icon("tech"), "📰");
    }

    #[test]
    fn chat_role_round_trip() {
        assert_eq!(ChatRole::parse("user"), Some(ChatRole::User));
        assert_eq!(ChatRole::parse("assistant"), Some(ChatRole::Assistant));
        assert_eq!(ChatRole::parse("system"), None);
        assert_eq!(ChatRole::User.as_str(), "user");
    }

    #[test]
    fn context_text_prefers_full_text() {
        let article = Article {
            id: 1,
            url: "https://example.com/a".to_string(),
            title: "Title".to_string(),
            section: "world".to_string(),
            summary: Some("summary".to_string()),
            full_text: Some("full text".to_string()),
            published_at: None,
            scraped_at: chrono::Utc::now(),
        };
        assert_eq!(article.context_text(), "full text");

        let without_text = Article {
            full_text: None,
            ..article
        };
        assert_eq!(without_text.context_text(), "summary");
    }
}
