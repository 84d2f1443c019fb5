use thiserror::Error;

/// Top-level error type for the bill pipeline.
///
/// Each variant is one category of the error taxonomy; the HTTP layer maps
/// them onto status codes and the orchestrator decides which ones are
/// absorbed and which ones end the request.
#[derive(Debug, Error)]
pub enum CrowdError {
    /// Missing or malformed input. Never reaches an external provider.
    #[error("{0}")]
    Validation(String),

    /// A required credential or setting is absent.
    #[error("{0}")]
    Configuration(String),

    /// The inference provider failed or returned an unusable shape.
    #[error("{provider}: {message}")]
    Provider { provider: String, message: String },

    /// Model output could not be parsed as the structured bill record.
    #[error("{0}")]
    Structuring(String),

    /// A write or read against the hosted store failed.
    #[error("{0}")]
    Persistence(String),

    /// A referenced record does not exist.
    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CrowdError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wrap a store-level failure, keeping the full context chain.
    pub fn persistence(err: anyhow::Error) -> Self {
        Self::Persistence(format!("{err:#}"))
    }

    /// Short machine-friendly category name, used in logs and pipeline warnings.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Configuration(_) => "configuration",
            Self::Provider { .. } => "provider",
            Self::Structuring(_) => "structuring",
            Self::Persistence(_) => "persistence",
            Self::NotFound(_) => "not_found",
            Self::Other(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, CrowdError>;
