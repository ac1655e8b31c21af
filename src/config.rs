use std::path::Path;

use serde::Deserialize;
use serde::Serialize;

/// Which storage backend to connect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub backend: StorageBackend,
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub backtrace: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub endpoint: String,
    pub api_key: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_secs: u64,
}

fn default_chat_model() -> String {
    "deepseek-chat".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

fn default_retry_backoff() -> u64 {
    60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    pub model: String,
    pub dimension: usize,
    /// Separate embeddings endpoint; falls back to the LLM endpoint when empty.
    #[serde(default)]
    pub endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Articles scraped strictly more than this many days ago are pruned.
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 7 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub llm: LlmConfig,
    pub embeddings: EmbeddingsConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from default config file path
    pub fn load() -> crate::Result<Self> {
        // Try to load from config.toml first, then fall back to config.example.toml
        if Path::new("config.toml").exists() {
            Self::from_file("config.toml")
        } else if Path::new("config.example.toml").exists() {
            eprintln!(
                "Warning: Using config.example.toml. Please create config.toml for production use."
            );
            Self::from_file("config.example.toml")
        } else {
            Err(crate::NewsRagError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "No config file found. Please create config.toml or config.example.toml",
            )))
        }
    }

    /// Get storage backend kind
    pub fn storage_backend(&self) -> StorageBackend {
        self.database.backend
    }

    /// Get database URL
    pub fn database_url(&self) -> &str {
        &self.database.url
    }

    /// Get max connections for database pool
    pub fn max_connections(&self) -> u32 {
        self.database.max_connections
    }

    /// Get min connections for database pool
    pub fn min_connections(&self) -> u32 {
        self.database.min_connections
    }

    /// Get connection timeout in seconds
    pub fn connection_timeout(&self) -> u64 {
        self.database.connection_timeout
    }

    /// Get LLM endpoint
    pub fn llm_endpoint(&self) -> &str {
        &self.llm.endpoint
    }

    /// Get LLM API key
    pub fn llm_api_key(&self) -> &str {
        &self.llm.api_key
    }

    /// Get chat model name
    pub fn chat_model(&self) -> &str {
        &self.llm.chat_model
    }

    /// Get per-request timeout for collaborator calls, in seconds
    pub fn request_timeout_secs(&self) -> u64 {
        self.llm.request_timeout_secs
    }

    /// Get fixed backoff before the single transient retry, in seconds
    pub fn retry_backoff_secs(&self) -> u64 {
        self.llm.retry_backoff_secs
    }

    /// Get embedding model name
    pub fn embedding_model(&self) -> &str {
        &self.embeddings.model
    }

    /// Get embedding dimension
    pub fn embedding_dimension(&self) -> usize {
        self.embeddings.dimension
    }

    /// Get embeddings endpoint, falling back to the LLM endpoint
    pub fn embeddings_endpoint(&self) -> &str {
        if self.embeddings.endpoint.is_empty() {
            &self.llm.endpoint
        } else {
            &self.embeddings.endpoint
        }
    }

    /// Get article retention window in days
    pub fn retention_days(&self) -> i64 {
        self.retention.days
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                backend: StorageBackend::Sqlite,
                url: "sqlite:news.db".to_string(),
                max_connections: 20,
                min_connections: 5,
                connection_timeout: 30,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                backtrace: true,
            },
            llm: LlmConfig {
                endpoint: "https://api.deepseek.com".to_string(),
                api_key: String::new(),
                chat_model: default_chat_model(),
                request_timeout_secs: default_request_timeout(),
                retry_backoff_secs: default_retry_backoff(),
            },
            embeddings: EmbeddingsConfig {
                model: "text-embedding-ada-002".to_string(),
                dimension: 1536,
                endpoint: String::new(),
            },
            retention: RetentionConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let toml_str = r#"
            [database]
            backend = "postgres"
            url = "postgresql://localhost/news"
            max_connections = 10
            min_connections = 2
            connection_timeout = 15

            [logging]
            level = "debug"
            backtrace = false

            [llm]
            endpoint = "https://api.deepseek.com"
            api_key = "sk-test"

            [embeddings]
            model = "text-embedding-ada-002"
            dimension = 1536
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.storage_backend(), StorageBackend::Postgres);
        assert_eq!(config.chat_model(), "deepseek-chat");
        assert_eq!(config.retry_backoff_secs(), 60);
        assert_eq!(config.retention_days(), 7);
        assert_eq!(config.embeddings_endpoint(), "https://api.deepseek.com");
    }

    #[test]
    fn default_config_is_sqlite() {
        let config = AppConfig::default();
        assert_eq!(config.storage_backend(), StorageBackend::Sqlite);
        assert_eq!(config.embedding_dimension(), 1536);
    }
}
