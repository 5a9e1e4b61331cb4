//! Error types shared by every chat model implementation.
//!
//! Provider crates keep their own, richer error enums and convert into
//! [`ChatError`] at the [`ChatModel`](crate::ChatModel) boundary, so callers
//! holding an `Arc<dyn ChatModel>` can still match on the failure class.
//!
//! ```text
//! ChatError
//! ├── Configuration           - missing or contradictory settings
//! ├── UnsupportedMessageType  - a message the provider cannot represent
//! ├── Provider                - the provider reported an error
//! ├── InvalidArgument         - bad combination of call arguments
//! ├── InvalidResponse         - provider output with an unexpected shape
//! ├── OutputParsing           - output parser could not produce a value
//! ├── Serialization           - JSON encoding/decoding failures
//! └── Other                   - anything else
//! ```

use thiserror::Error;

/// Result type for chat model operations.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced by chat models and output parsers.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Missing or contradictory configuration (credentials, parameters).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message kind the model cannot translate.
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// The provider returned an error payload.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Invalid argument combination supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Provider output did not have the expected structure.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// An output parser failed to produce a value.
    #[error("Output parsing failed: {0}")]
    OutputParsing(String),

    /// JSON serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{0}")]
    Other(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ChatError::Provider("quota exceeded".to_string());
        assert_eq!(err.to_string(), "Provider error: quota exceeded");
    }

    #[test]
    fn test_from_serde() {
        let err: ChatError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, ChatError::Serialization(_)));
    }
}
