//! Result types returned by chat models.

use crate::messages::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Token usage for a model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl UsageMetadata {
    /// Build usage from input/output counts; the total is their sum.
    pub fn new(input_tokens: usize, output_tokens: usize) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens,
        }
    }
}

/// One candidate output of a chat model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub message: Message,

    /// Per-generation provider data such as `finish_reason`.
    #[serde(default)]
    pub generation_info: Map<String, Value>,
}

impl Generation {
    /// Wrap a message with empty generation info.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            generation_info: Map::new(),
        }
    }

    /// Add a generation info entry.
    pub fn with_info(mut self, key: impl Into<String>, value: Value) -> Self {
        self.generation_info.insert(key.into(), value);
        self
    }

    /// The provider's finish reason, if one was reported.
    pub fn finish_reason(&self) -> Option<&str> {
        self.generation_info
            .get("finish_reason")
            .and_then(Value::as_str)
    }
}

/// Aggregate token counts across every generation of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub generated_token_count: usize,
    pub input_token_count: usize,
}

impl TokenUsage {
    pub fn total(&self) -> usize {
        self.generated_token_count + self.input_token_count
    }
}

/// Call-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LlmOutput {
    pub token_usage: TokenUsage,
    pub model_name: String,
    #[serde(default)]
    pub system_fingerprint: String,
}

/// Everything a chat model returns for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    pub generations: Vec<Generation>,
    pub llm_output: LlmOutput,
}

impl ChatResult {
    /// The first generation's message, which is what single-answer callers want.
    pub fn message(&self) -> Option<&Message> {
        self.generations.first().map(|g| &g.message)
    }

    /// Consume the result and return the first message.
    pub fn into_message(self) -> Option<Message> {
        self.generations.into_iter().next().map(|g| g.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_usage_total() {
        let usage = UsageMetadata::new(10, 5);
        assert_eq!(usage.total_tokens, 15);

        let usage = TokenUsage {
            generated_token_count: 3,
            input_token_count: 4,
        };
        assert_eq!(usage.total(), 7);
    }

    #[test]
    fn test_generation_finish_reason() {
        let generation = Generation::new(Message::ai("ok")).with_info("finish_reason", json!("eos_token"));
        assert_eq!(generation.finish_reason(), Some("eos_token"));

        let generation = Generation::new(Message::ai("ok")).with_info("finish_reason", Value::Null);
        assert_eq!(generation.finish_reason(), None);
    }

    #[test]
    fn test_chat_result_message() {
        let result = ChatResult {
            generations: vec![Generation::new(Message::ai("first")), Generation::new(Message::ai("second"))],
            llm_output: LlmOutput::default(),
        };
        assert_eq!(result.message().and_then(Message::text), Some("first"));
        assert_eq!(result.into_message().unwrap().text(), Some("first"));
    }
}
