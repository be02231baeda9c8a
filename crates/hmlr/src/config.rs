//! HMLR Configuration
//!
//! Defines configuration options for the memory engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HmlrConfig {
    /// Path to the SQLite database file
    pub db_path: PathBuf,

    /// Path to the user profile JSON document
    pub user_profile_path: PathBuf,

    /// API key for the LLM endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible LLM endpoint
    pub api_base_url: String,

    /// Model used for routing, extraction, and summaries (default: gpt-4.1-mini)
    pub llm_model: String,

    /// Model used to compose final replies (defaults to `llm_model`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_model: Option<String>,

    /// Sentence-encoder model name (default: all-MiniLM-L6-v2, 384 dims)
    pub embedding_model: String,

    /// Retrieval configuration
    pub retrieval: RetrievalConfig,

    /// LLM call timeout in seconds (default: 30)
    pub llm_timeout_secs: u64,
}

/// Retrieval tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Cosine similarity floor for all vector search (default: 0.4)
    pub similarity_threshold: f32,

    /// Result count for gardened-memory search (default: 5)
    pub memory_top_k: usize,

    /// Result count for dossier retrieval (default: 3)
    pub dossier_top_k: usize,

    /// Per-fact result count during multi-vector voting (default: 10)
    pub voting_top_k: usize,

    /// Token budget for the dossier section of the prompt (default: 3000)
    pub dossier_token_budget: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.4,
            memory_top_k: 5,
            dossier_top_k: 3,
            voting_top_k: 10,
            dossier_token_budget: 3000,
        }
    }
}

impl Default for HmlrConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("hmlr.db"),
            user_profile_path: PathBuf::from("user_profile.json"),
            api_key: None,
            api_base_url: "https://api.openai.com".into(),
            llm_model: "gpt-4.1-mini".into(),
            generator_model: None,
            embedding_model: "all-MiniLM-L6-v2".into(),
            retrieval: RetrievalConfig::default(),
            llm_timeout_secs: 30,
        }
    }
}

impl HmlrConfig {
    /// Create a config with the given database and profile paths
    pub fn new(db_path: impl Into<PathBuf>, user_profile_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            user_profile_path: user_profile_path.into(),
            ..Default::default()
        }
    }

    /// Populate paths and credentials from the environment
    ///
    /// Reads `HMLR_DB_PATH`, `HMLR_PROFILE_PATH`, `HMLR_API_KEY`, and
    /// `HMLR_API_BASE_URL`; unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("HMLR_DB_PATH") {
            config.db_path = PathBuf::from(path);
        }
        if let Ok(path) = std::env::var("HMLR_PROFILE_PATH") {
            config.user_profile_path = PathBuf::from(path);
        }
        if let Ok(key) = std::env::var("HMLR_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(url) = std::env::var("HMLR_API_BASE_URL") {
            config.api_base_url = url;
        }
        config
    }

    /// Set the API key
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Set the routing/extraction model
    pub fn with_llm_model(mut self, model: impl Into<String>) -> Self {
        self.llm_model = model.into();
        self
    }

    /// Set the reply-composition model
    pub fn with_generator_model(mut self, model: impl Into<String>) -> Self {
        self.generator_model = Some(model.into());
        self
    }

    /// Set retrieval tuning knobs
    pub fn with_retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.retrieval = retrieval;
        self
    }

    /// Model used for final replies
    pub fn generator_model(&self) -> &str {
        self.generator_model.as_deref().unwrap_or(&self.llm_model)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.llm_model.is_empty() {
            return Err(ConfigValidationError::InvalidValue {
                field: "llm_model".into(),
                message: "must not be empty".into(),
            });
        }

        let threshold = self.retrieval.similarity_threshold;
        if !(-1.0..=1.0).contains(&threshold) {
            return Err(ConfigValidationError::InvalidValue {
                field: "retrieval.similarity_threshold".into(),
                message: "must be a valid cosine similarity in [-1, 1]".into(),
            });
        }

        if self.retrieval.memory_top_k == 0 || self.retrieval.voting_top_k == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "retrieval.top_k".into(),
                message: "must be greater than 0".into(),
            });
        }

        if self.llm_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "llm_timeout_secs".into(),
                message: "must be greater than 0".into(),
            });
        }

        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
