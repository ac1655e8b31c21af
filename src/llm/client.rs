//! OpenAI-compatible chat-completions client for the generation collaborator.

use std::time::Duration;

use reqwest::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::AppConfig;
use crate::NewsRagError;
use crate::Result;

/// A role-tagged message on the generation wire.
#[derive(Debug, Clone, Serialize)]
pub struct LlmMessage {
    pub role: String,
    pub content: String,
}

impl LlmMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Client for the chat-completions generation collaborator.
pub struct LlmClient {
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
    retry_backoff: Duration,
}

impl LlmClient {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs()))
            .build()
            .map_err(|e| NewsRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: config.llm_endpoint().trim_end_matches('/').to_string(),
            api_key: config.llm_api_key().to_string(),
            model: config.chat_model().to_string(),
            client,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs()),
        })
    }

    /// Whether a credential is present. Calls without one fail with a
    /// configuration error before any request is made.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// Send a message sequence and return the generated text.
    ///
    /// Transient failures (rate limit, 5xx, network) are retried exactly once
    /// after the fixed backoff; everything else propagates immediately.
    pub async fn chat(
        &self,
        messages: &[LlmMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        match self.chat_once(messages, temperature, max_tokens).await {
            Err(e) if e.is_transient() => {
                warn!(
                    "generation hit a transient failure, retrying in {}s: {e}",
                    self.retry_backoff.as_secs()
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.chat_once(messages, temperature, max_tokens).await
            }
            other => other,
        }
    }

    async fn chat_once(
        &self,
        messages: &[LlmMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        if !self.is_configured() {
            return Err(NewsRagError::Config(
                "LLM API key is not set; configure [llm] api_key".to_string(),
            ));
        }

        #[derive(Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: &'a [LlmMessage],
            temperature: f32,
            max_tokens: u32,
        }

        #[derive(Deserialize)]
        struct ChatResponse {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMessage,
        }

        #[derive(Deserialize)]
        struct ChoiceMessage {
            content: String,
        }

        let url = format!("{}/chat/completions", self.endpoint);
        debug!("calling chat completions: {} ({} messages)", url, messages.len());

        let request = ChatRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| NewsRagError::Transient(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(map_status(status, &body));
        }

        let result: ChatResponse = response
            .json()
            .await
            .map_err(|e| NewsRagError::Service(format!("failed to parse response: {e}")))?;

        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| NewsRagError::Service("no choices in response".to_string()))
    }
}

/// Map an HTTP status to the error taxonomy.
pub(crate) fn map_status(status: StatusCode, body: &str) -> NewsRagError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        NewsRagError::Transient(format!("rate limited ({status}): {body}"))
    } else if status.is_server_error() {
        NewsRagError::Transient(format!("server error ({status}): {body}"))
    } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        NewsRagError::Config(format!("authentication failed ({status}): {body}"))
    } else {
        NewsRagError::Service(format!("API error ({status}): {body}"))
    }
}
