//! Output parsers turning model messages into typed values.
//!
//! - [`JsonOutputParser`] reads the message text as JSON (markdown code
//!   fences allowed) and deserializes it into `T`.
//! - [`ToolsOutputParser`] deserializes the arguments of the message's tool
//!   calls, optionally restricted to one tool name.
//!
//! `T` defaults to [`serde_json::Value`], which yields the plain mapping.

use crate::error::{ChatError, Result};
use crate::messages::Message;
use crate::tools::ToolCall;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::marker::PhantomData;

/// Parses a [`Message`] into a value.
pub trait OutputParser: Send + Sync {
    type Output;

    fn parse_message(&self, message: &Message) -> Result<Self::Output>;
}

/// Strip a surrounding markdown code fence (```` ```json ... ``` ````).
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed;
    };
    let after_fence = &trimmed[start + 3..];
    // Skip the info string ("json") up to the end of the fence line.
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(0);
    let body = &after_fence[body_start..];
    match body.find("```") {
        Some(end) => body[..end].trim(),
        None => body.trim(),
    }
}

/// Parses the message text as JSON into `T`.
pub struct JsonOutputParser<T = Value> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonOutputParser<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonOutputParser<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> OutputParser for JsonOutputParser<T> {
    type Output = T;

    fn parse_message(&self, message: &Message) -> Result<T> {
        let text = message.content.to_text();
        serde_json::from_str(strip_code_fence(&text)).map_err(|e| {
            ChatError::OutputParsing(format!("invalid JSON output: {} (text: {:?})", e, text))
        })
    }
}

/// Parses tool-call arguments into `T`.
///
/// `parse_message` returns the first matching call, or `None` when the
/// message carries no matching call.
pub struct ToolsOutputParser<T = Value> {
    key_name: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ToolsOutputParser<T> {
    /// Consider every tool call.
    pub fn any() -> Self {
        Self {
            key_name: None,
            _marker: PhantomData,
        }
    }

    /// Only consider calls to the named tool.
    pub fn for_tool(name: impl Into<String>) -> Self {
        Self {
            key_name: Some(name.into()),
            _marker: PhantomData,
        }
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }
}

impl<T: DeserializeOwned> ToolsOutputParser<T> {
    fn matches(&self, call: &ToolCall) -> bool {
        self.key_name
            .as_deref()
            .map_or(true, |name| call.name == name)
    }

    fn parse_call(call: &ToolCall) -> Result<T> {
        serde_json::from_value(call.arguments.clone()).map_err(|e| {
            ChatError::OutputParsing(format!(
                "arguments of tool call '{}' do not match the schema: {}",
                call.name, e
            ))
        })
    }

    /// Parse every matching tool call in order.
    pub fn parse_all(&self, message: &Message) -> Result<Vec<T>> {
        message
            .tool_calls
            .iter()
            .filter(|call| self.matches(call))
            .map(Self::parse_call)
            .collect()
    }
}

impl<T: DeserializeOwned> OutputParser for ToolsOutputParser<T> {
    type Output = Option<T>;

    /// Only the first matching call is deserialized.
    fn parse_message(&self, message: &Message) -> Result<Option<T>> {
        message
            .tool_calls
            .iter()
            .find(|call| self.matches(call))
            .map(Self::parse_call)
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        answer: String,
        confidence: f64,
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1} "), "{\"a\": 1}");
        assert_eq!(strip_code_fence("Sure:\n```\n[1]\n```\nDone"), "[1]");
    }

    #[test]
    fn test_json_parser_typed() {
        let parser = JsonOutputParser::<Answer>::new();
        let message = Message::ai("```json\n{\"answer\": \"42\", \"confidence\": 0.9}\n```");
        let parsed = parser.parse_message(&message).unwrap();
        assert_eq!(parsed.answer, "42");

        let err = parser.parse_message(&Message::ai("not json")).unwrap_err();
        assert!(matches!(err, ChatError::OutputParsing(_)));
    }

    #[test]
    fn test_json_parser_value() {
        let parser: JsonOutputParser = JsonOutputParser::default();
        assert_eq!(parser.parse_message(&Message::ai("{\"x\": 1}")).unwrap(), json!({"x": 1}));
    }

    #[test]
    fn test_tools_parser_first_matching_call() {
        let message = Message::ai("").with_tool_calls(vec![
            ToolCall::new("c1", "other", json!({"x": 1})),
            ToolCall::new("c2", "Answer", json!({"answer": "yes", "confidence": 1.0})),
        ]);

        let parser = ToolsOutputParser::<Answer>::for_tool("Answer");
        let parsed = parser.parse_message(&message).unwrap().unwrap();
        assert_eq!(parsed, Answer { answer: "yes".into(), confidence: 1.0 });

        let any: ToolsOutputParser = ToolsOutputParser::any();
        assert_eq!(any.parse_message(&message).unwrap(), Some(json!({"x": 1})));
        assert_eq!(any.parse_all(&message).unwrap().len(), 2);
    }

    #[test]
    fn test_tools_parser_ignores_later_calls() {
        let message = Message::ai("").with_tool_calls(vec![
            ToolCall::new("c1", "Answer", json!({"answer": "yes", "confidence": 0.5})),
            ToolCall::new("c2", "Answer", json!({"answer": 3})),
        ]);
        let parser = ToolsOutputParser::<Answer>::for_tool("Answer");
        assert_eq!(
            parser.parse_message(&message).unwrap(),
            Some(Answer { answer: "yes".into(), confidence: 0.5 })
        );
        assert!(parser.parse_all(&message).is_err());
    }

    #[test]
    fn test_tools_parser_no_calls_and_bad_arguments() {
        let parser = ToolsOutputParser::<Answer>::for_tool("Answer");
        assert_eq!(parser.parse_message(&Message::ai("plain")).unwrap(), None);

        let message = Message::ai("")
            .with_tool_calls(vec![ToolCall::new("c1", "Answer", json!({"answer": 3}))]);
        assert!(matches!(
            parser.parse_message(&message),
            Err(ChatError::OutputParsing(_))
        ));
    }
}
