//! OpenAI-compatible embeddings client.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::warn;

use crate::config::AppConfig;
use crate::llm::client::map_status;
use crate::NewsRagError;
use crate::Result;

/// Client for the embedding collaborator. Batches preserve input order and
/// every returned vector is checked against the configured dimension.
pub struct EmbeddingService {
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    client: Client,
    retry_backoff: Duration,
}

impl EmbeddingService {
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs()))
            .build()
            .map_err(|e| NewsRagError::Http(e.to_string()))?;

        Ok(Self {
            endpoint: config.embeddings_endpoint().trim_end_matches('/').to_string(),
            api_key: config.llm_api_key().to_string(),
            model: config.embedding_model().to_string(),
            dimension: config.embedding_dimension(),
            client,
            retry_backoff: Duration::from_secs(config.retry_backoff_secs()),
        })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Generate an embedding for a single text.
    pub async fn generate(&self, text: &str) -> Result<Vec<f32>> {
        let mut batch = self.generate_batch(&[text.to_string()]).await?;
        batch
            .pop()
            .ok_or_else(|| NewsRagError::Service("no embedding in response".to_string()))
    }

    /// Generate embeddings for a batch of texts, preserving input order.
    /// Transient failures are retried exactly once after the fixed backoff.
    pub async fn generate_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self.generate_batch_once(texts).await {
            Err(e) if e.is_transient() => {
                warn!(
                    "embedding request hit a transient failure, retrying in {}s: {e}",
                    self.retry_backoff.as_secs()
                );
                tokio::time::sleep(self.retry_backoff).await;
                self.generate_batch_once(texts).await
            }
            other => other,
        }
    }

    async fn generate_batch_once(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.api_key.is_empty() {
            return Err(NewsRagError::Config(
                "embeddings API key is not set; configure [llm] api_key".to_string(),
            ));
        }

        #[derive(Serialize)]
        struct EmbeddingRequest<'a> {
            input: &'a [String],
            model: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResponse {
            data: Vec<EmbeddingData>,
        }

        #[derive(Deserialize)]
        struct EmbeddingData {
            embedding: Vec<f32>,
        }

        let url = format!("{}/embeddings", self.endpoint);
        debug!("calling embeddings API: {} ({} texts)", url, texts.len());

        let request = EmbeddingRequest {
            input: texts,
            model: &self.model,
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

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| NewsRagError::Service(format!("failed to parse response: {e}")))?;

        if result.data.len() != texts.len() {
            return Err(NewsRagError::Service(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                result.data.len()
            )));
        }

        result
            .data
            .into_iter()
            .map(|d| {
                if d.embedding.len() == self.dimension {
                    Ok(d.embedding)
                } else {
                    Err(NewsRagError::Service(format!(
                        "embedding dimension mismatch: expected {}, got {}",
                        self.dimension,
                        d.embedding.len()
                    )))
                }
            })
            .collect()
    }
}
