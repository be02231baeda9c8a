//! Core Error Types
//!
//! Defines error types for the HMLR core crate.

use thiserror::Error;

/// Core result type alias
pub type CoreResult<T> = Result<T, CoreError>;

/// Core errors
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Storage-level error with context
    #[error("storage error: {message}")]
    Storage { message: String },

    /// Entity not found
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    /// Invalid state transition or operation
    #[error("invalid operation: {message}")]
    InvalidOperation { message: String },

    /// Profile document error
    #[error("profile error: {message}")]
    Profile { message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Create a profile error
    pub fn profile(message: impl Into<String>) -> Self {
        Self::Profile {
            message: message.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = CoreError::storage("disk full");
        assert!(err.to_string().contains("disk full"));

        let err = CoreError::not_found("BridgeBlock", "bb_123");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("BridgeBlock"));
        assert!(err.to_string().contains("bb_123"));
    }
}
