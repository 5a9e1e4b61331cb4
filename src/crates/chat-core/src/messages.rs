//! Message types for chat models.
//!
//! A conversation is an ordered list of [`Message`]s. Each message has a
//! [`MessageRole`], [`MessageContent`], and role-specific fields: assistant
//! messages may carry [`ToolCall`]s, tool messages carry the `tool_call_id`
//! they answer, function messages carry the function `name`.
//!
//! ```rust
//! use chat_core::messages::{Message, MessageRole};
//!
//! let history = vec![
//!     Message::system("You are a helpful assistant."),
//!     Message::human("What is the capital of France?"),
//!     Message::ai("Paris."),
//! ];
//! assert_eq!(history[1].role, MessageRole::Human);
//! assert_eq!(history[2].text(), Some("Paris."));
//! ```
//!
//! `additional_kwargs` is a side channel for provider-shaped payloads that
//! have no typed field (a raw `function_call`, provider `tool_calls`, a
//! `name` override). Providers read it when serializing and never write to
//! the caller's copy.

use crate::outputs::UsageMetadata;
use crate::tools::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Role of the message sender.
///
/// Roles serialize to lowercase strings; `Custom("x")` serializes as `"x"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Instructions or context for the model.
    System,

    /// End-user input.
    Human,

    /// Model output, possibly carrying tool calls.
    Assistant,

    /// Result of a legacy function call; carries the function name.
    Function,

    /// Result of a tool call; carries the `tool_call_id`.
    Tool,

    /// Application-specific role.
    #[serde(untagged)]
    Custom(String),
}

impl MessageRole {
    /// Canonical lowercase name of the role.
    pub fn as_str(&self) -> &str {
        match self {
            MessageRole::System => "system",
            MessageRole::Human => "human",
            MessageRole::Assistant => "assistant",
            MessageRole::Function => "function",
            MessageRole::Tool => "tool",
            MessageRole::Custom(role) => role,
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageRole {
    type Err = std::convert::Infallible;

    /// Accepts both framework (`human`, `ai`) and provider (`user`,
    /// `assistant`) spellings. Anything else becomes `Custom`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "system" => MessageRole::System,
            "human" | "user" => MessageRole::Human,
            "assistant" | "ai" => MessageRole::Assistant,
            "function" => MessageRole::Function,
            "tool" => MessageRole::Tool,
            other => MessageRole::Custom(other.to_string()),
        })
    }
}

/// Message content: plain text or a list of typed content blocks.
///
/// Blocks are kept as raw JSON objects (`{"type": "text", "text": ...}`,
/// `{"type": "image_url", ...}`, ...) because their shape is provider-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl MessageContent {
    /// True for empty text or an empty block list.
    pub fn is_empty(&self) -> bool {
        match self {
            MessageContent::Text(s) => s.is_empty(),
            MessageContent::Blocks(blocks) => blocks.is_empty(),
        }
    }

    /// Text of the content; blocks contribute their `text` fields.
    pub fn to_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    Value::String(s) => Some(s.as_str()),
                    other => other.get("text").and_then(Value::as_str),
                })
                .collect(),
        }
    }

    /// JSON form: a string for text, an array for blocks.
    pub fn to_value(&self) -> Value {
        match self {
            MessageContent::Text(s) => Value::String(s.clone()),
            MessageContent::Blocks(blocks) => Value::Array(blocks.clone()),
        }
    }
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl From<String> for MessageContent {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for MessageContent {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<Vec<Value>> for MessageContent {
    fn from(blocks: Vec<Value>) -> Self {
        Self::Blocks(blocks)
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: MessageRole,

    #[serde(default)]
    pub content: MessageContent,

    /// Function name for function messages, or a speaker name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The call a tool message answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Provider-shaped side-channel data.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_kwargs: Map<String, Value>,

    /// Token usage attributed to this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
}

impl Message {
    /// Create a new message with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<MessageContent>) -> Self {
        Self {
            id: Some(Uuid::new_v4().to_string()),
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            additional_kwargs: Map::new(),
            usage_metadata: None,
        }
    }

    /// Create a system message.
    pub fn system(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::System, content)
    }

    /// Create a human message.
    pub fn human(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Human, content)
    }

    /// Alias for [`Message::human`].
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self::human(content)
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Assistant, content)
    }

    /// Alias for [`Message::assistant`].
    pub fn ai(content: impl Into<MessageContent>) -> Self {
        Self::assistant(content)
    }

    /// Create a function result message.
    pub fn function(name: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Function, content).with_name(name)
    }

    /// Create a tool result message.
    pub fn tool(content: impl Into<MessageContent>, tool_call_id: impl Into<String>) -> Self {
        let mut message = Self::new(MessageRole::Tool, content);
        message.tool_call_id = Some(tool_call_id.into());
        message
    }

    /// Create a message with an application-specific role.
    pub fn custom(role: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self::new(MessageRole::Custom(role.into()), content)
    }

    /// Set the message ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the message name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set tool calls (assistant messages).
    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }

    /// Insert a side-channel value.
    pub fn with_additional_kwarg(mut self, key: impl Into<String>, value: Value) -> Self {
        self.additional_kwargs.insert(key.into(), value);
        self
    }

    /// Attach token usage.
    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage_metadata = Some(usage);
        self
    }

    /// Text content, if this is a plain text message.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(s) => Some(s),
            MessageContent::Blocks(_) => None,
        }
    }

    /// Whether the message requests any tool or function call.
    pub fn has_calls(&self) -> bool {
        !self.tool_calls.is_empty()
            || self.additional_kwargs.contains_key("tool_calls")
            || self.additional_kwargs.contains_key("function_call")
    }
}
