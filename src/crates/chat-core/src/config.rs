//! Request types for chat model calls.
//!
//! ```rust
//! use chat_core::{ChatRequest, Message, ToolDefinition};
//! use serde_json::json;
//!
//! let request = ChatRequest::new(vec![
//!     Message::system("You are a helpful assistant"),
//!     Message::human("What is the capital of France?"),
//! ])
//! .with_stop(vec!["\n\n".to_string()])
//! .with_param("temperature", json!(0.7))
//! .with_tools(vec![ToolDefinition::new("search", "Search the web")]);
//!
//! assert_eq!(request.config.params["temperature"], 0.7);
//! ```

use crate::messages::Message;
use crate::tools::{ToolChoice, ToolDefinition};
use serde_json::{Map, Value};

/// A request to a chat model: messages plus per-call configuration.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// The conversation messages to send to the model.
    pub messages: Vec<Message>,

    /// Per-call configuration; empty fields fall back to the model's defaults.
    pub config: ChatConfig,
}

impl ChatRequest {
    /// Create a new chat request with default configuration.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            config: ChatConfig::default(),
        }
    }

    /// Stop sequences passed positionally.
    ///
    /// Providers reject a request that also sets stop sequences through
    /// `params`.
    pub fn with_stop(mut self, stop: Vec<String>) -> Self {
        self.config.stop = Some(stop);
        self
    }

    /// Tools the model may call.
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.config.tools = tools;
        self
    }

    /// Constrain which tool the model calls.
    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.config.tool_choice = Some(choice);
        self
    }

    /// Set one provider generation parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: Value) -> Self {
        self.config.params.insert(key.into(), value);
        self
    }

    /// Merge a map of provider generation parameters.
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.config.params.extend(params);
        self
    }

    /// Request a response format such as `{"type": "json_object"}`.
    pub fn with_response_format(mut self, format: Value) -> Self {
        self.config.response_format = Some(format);
        self
    }
}

/// Per-call configuration.
#[derive(Debug, Clone, Default)]
pub struct ChatConfig {
    /// Sequences that stop generation.
    pub stop: Option<Vec<String>>,

    /// Tool definitions for function-calling models.
    pub tools: Vec<ToolDefinition>,

    /// Tool selection constraint.
    pub tool_choice: Option<ToolChoice>,

    /// Legacy function definitions.
    pub functions: Vec<ToolDefinition>,

    /// Legacy function selection (`"auto"`, `"none"` or `{"name": ...}`).
    pub function_call: Option<Value>,

    /// Requested response format.
    pub response_format: Option<Value>,

    /// Provider generation parameters (decoding method, token limits, ...).
    pub params: Map<String, Value>,
}

impl ChatConfig {
    /// Whether any tool or function definitions are attached.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty() || !self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_chat_request_builder() {
        let request = ChatRequest::new(vec![Message::human("test")])
            .with_stop(vec!["END".to_string()])
            .with_param("max_new_tokens", json!(100))
            .with_tool_choice(ToolChoice::Auto)
            .with_response_format(json!({"type": "json_object"}));

        assert_eq!(request.config.stop, Some(vec!["END".to_string()]));
        assert_eq!(request.config.params["max_new_tokens"], 100);
        assert_eq!(request.config.tool_choice, Some(ToolChoice::Auto));
        assert!(request.config.response_format.is_some());
        assert!(!request.config.has_tools());
    }

    #[test]
    fn test_default_config() {
        let config = ChatConfig::default();
        assert!(config.stop.is_none());
        assert!(config.tools.is_empty());
        assert!(config.params.is_empty());
    }

    #[test]
    fn test_has_tools() {
        let request = ChatRequest::new(vec![]).with_tools(vec![ToolDefinition::new("t", "")]);
        assert!(request.config.has_tools());

        let mut params = Map::new();
        params.insert("temperature".into(), json!(0.2));
        let request = ChatRequest::new(vec![]).with_params(params);
        assert_eq!(request.config.params.len(), 1);
    }
}
