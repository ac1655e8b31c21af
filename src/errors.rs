use thiserror::Error;

#[derive(Error, Debug)]
pub enum NewsRagError {
    /// Duplicate article url on insert. Callers treat this as "already
    /// present, skip" rather than a failure.
    #[error("duplicate url: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Missing or invalid credential/configuration. Surfaced immediately,
    /// never retried.
    #[error("configuration error: {0}")]
    Config(String),

    /// Rate limit or 5xx from a collaborator. Retried once with a fixed
    /// backoff, then degraded to a fallback value.
    #[error("transient service error: {0}")]
    Transient(String),

    /// Any other collaborator failure. Degraded immediately.
    #[error("service error: {0}")]
    Service(String),

    /// Optional vector-search capability absent. Permanent soft-disable;
    /// the vector path returns empty results instead of propagating this.
    #[error("vector search unavailable: {0}")]
    FeatureUnavailable(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    TomlParsing(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NewsRagError {
    /// Whether the caller may retry once after a fixed backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Whether an insert hit the url uniqueness constraint.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, NewsRagError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_not_transient() {
        let err = NewsRagError::Conflict("https://example.com/a".to_string());
        assert!(err.is_conflict());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_display() {
        let err = NewsRagError::Transient("rate limited (429)".to_string());
        assert!(err.is_transient());
        assert_eq!(
            format!("{err}"),
            "transient service error: rate limited (429)"
        );
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: NewsRagError = io_err.into();
        assert!(matches!(err, NewsRagError::Io(_)));
    }
}
