//! Error types for the watsonx adapter.

use chat_core::ChatError;
use thiserror::Error;

/// Result type for watsonx operations.
pub type Result<T> = std::result::Result<T, WatsonxError>;

/// Errors raised while translating, validating or interpreting a watsonx call.
#[derive(Debug, Error)]
pub enum WatsonxError {
    /// Missing credentials or conflicting parameters.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A message the codec cannot translate.
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    /// The service response carried a top-level `error`.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Tool-shaped model output whose calls cannot be decoded.
    ///
    /// Never surfaced to callers: the emulator falls back to plain text.
    #[error("Malformed tool output: {0}")]
    MalformedToolOutput(String),

    /// Invalid call arguments (unsupported model, bad function_call, ...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Service output with an unexpected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Structured output could not be parsed into the requested schema.
    #[error("Output parsing failed: {0}")]
    OutputParsing(String),

    /// JSON encoding/decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl WatsonxError {
    /// Check if a structured-output caller can recover from this error with
    /// `include_raw`.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            WatsonxError::OutputParsing(_) | WatsonxError::MalformedToolOutput(_)
        )
    }
}

impl From<serde_json::Error> for WatsonxError {
    fn from(err: serde_json::Error) -> Self {
        WatsonxError::Serialization(err.to_string())
    }
}

/// Convert WatsonxError to chat_core::ChatError for trait implementation.
impl From<WatsonxError> for ChatError {
    fn from(err: WatsonxError) -> Self {
        match err {
            WatsonxError::Configuration(msg) => ChatError::Configuration(msg),
            WatsonxError::UnsupportedMessageType(msg) => ChatError::UnsupportedMessageType(msg),
            WatsonxError::Provider(msg) => ChatError::Provider(msg),
            WatsonxError::MalformedToolOutput(msg) | WatsonxError::InvalidResponse(msg) => {
                ChatError::InvalidResponse(msg)
            }
            WatsonxError::InvalidArgument(msg) => ChatError::InvalidArgument(msg),
            WatsonxError::OutputParsing(msg) => ChatError::OutputParsing(msg),
            WatsonxError::Serialization(msg) => ChatError::Other(format!("Serialization error: {}", msg)),
        }
    }
}

/// Parser failures from `chat-core` keep their class when they flow back in.
impl From<ChatError> for WatsonxError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Configuration(msg) => WatsonxError::Configuration(msg),
            ChatError::UnsupportedMessageType(msg) => WatsonxError::UnsupportedMessageType(msg),
            ChatError::Provider(msg) => WatsonxError::Provider(msg),
            ChatError::InvalidArgument(msg) => WatsonxError::InvalidArgument(msg),
            ChatError::InvalidResponse(msg) => WatsonxError::InvalidResponse(msg),
            ChatError::OutputParsing(msg) => WatsonxError::OutputParsing(msg),
            ChatError::Serialization(e) => WatsonxError::Serialization(e.to_string()),
            ChatError::Other(msg) => WatsonxError::InvalidResponse(msg),
        }
    }
}
