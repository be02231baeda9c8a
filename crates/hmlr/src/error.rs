//! HMLR Error Types
//!
//! Defines error types for the pipeline crate.

use thiserror::Error;

/// HMLR result type alias
pub type HmlrResult<T> = Result<T, HmlrError>;

/// Pipeline errors
#[derive(Debug, Error)]
pub enum HmlrError {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Core/storage error; fatal to the current query
    #[error(transparent)]
    Core(#[from] hmlr_core::CoreError),

    /// LLM call failed after retry
    #[error("llm error: {message}")]
    Llm { message: String },

    /// LLM response could not be parsed as the expected schema
    #[error("llm response parse error: {message}")]
    LlmParse { message: String },

    /// Embedding computation failed
    #[error("embedding error: {message}")]
    Embedding { message: String },

    /// Operation timed out
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Gardening failure; the block remains intact
    #[error("gardening error for {block_id}: {message}")]
    Gardening { block_id: String, message: String },

    /// HTTP transport error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl HmlrError {
    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create an LLM parse error
    pub fn llm_parse(message: impl Into<String>) -> Self {
        Self::LlmParse {
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Create a gardening error
    pub fn gardening(block_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Gardening {
            block_id: block_id.into(),
            message: message.into(),
        }
    }

    /// Whether this error is transient (LLM/parse/timeout) rather than
    /// a storage failure
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Llm { .. } | Self::LlmParse { .. } | Self::Timeout { .. } | Self::Http(_)
        )
    }
}
