//! The inference client seam.
//!
//! Transport, IAM token exchange and retries belong to the client. The chat
//! model only needs the two text-generation calls below, which makes the
//! client trivial to replace with a scripted double in tests.

use crate::error::Result;
use crate::params::GenerationParams;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stream of raw response deltas.
pub type ResponseStream = BoxStream<'static, Result<Value>>;

/// Text generation client for one model or deployment.
#[async_trait]
pub trait ModelInference: Send + Sync {
    /// Generate text for `prompt` and return the raw response document.
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> Result<Value>;

    /// Generate text for `prompt`, yielding raw response deltas.
    async fn generate_stream(&self, prompt: &str, params: &GenerationParams)
        -> Result<ResponseStream>;
}

/// One entry of a response's `results` list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    #[serde(default)]
    pub generated_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_token_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_token_count: Option<usize>,
}

impl GenerationResult {
    pub fn new(generated_text: impl Into<String>) -> Self {
        Self {
            generated_text: generated_text.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_defaults() {
        let result: GenerationResult = serde_json::from_value(json!({})).unwrap();
        assert_eq!(result.generated_text, "");
        assert!(result.stop_reason.is_none());

        let result: GenerationResult = serde_json::from_value(json!({
            "generated_text": "hi",
            "stop_reason": "eos_token",
            "generated_token_count": 3,
            "input_token_count": 7
        }))
        .unwrap();
        assert_eq!(result.generated_token_count, Some(3));
        assert_eq!(result.input_token_count, Some(7));
    }
}
