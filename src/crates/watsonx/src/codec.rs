//! Conversion between typed messages and the service's role dictionaries.
//!
//! - [`message_to_dict`] / [`dict_to_message`]: complete messages, both ways
//! - [`result_to_message`]: a generation result (free text, no role)
//! - [`delta_to_message_chunk`]: one streamed delta
//! - [`build_payload`]: the messages-form request body, checked by
//!   [`validate_dicts`]
//!
//! Callers' messages are only read. Every conversion builds new values.

use crate::emulator;
use crate::error::{Result, WatsonxError};
use crate::inference::GenerationResult;
use crate::params::GenerationParams;
use chat_core::{Message, MessageChunk, MessageContent, MessageRole, ToolCall, ToolCallChunk};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// A message in the service's flat dictionary form.
///
/// `content` is `None` (serialized as `null`) only for assistant messages
/// that carry nothing but a function or tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDict {
    pub role: String,
    pub content: Option<MessageContent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,
}

impl MessageDict {
    pub fn new(role: impl Into<String>, content: impl Into<MessageContent>) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            name: None,
            tool_call_id: None,
            tool_calls: None,
            function_call: None,
        }
    }

    /// Content as text; `None` content reads as empty.
    pub fn content_text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::to_text)
            .unwrap_or_default()
    }
}

/// Service role name for a framework role.
pub fn role_to_str(role: &MessageRole) -> &str {
    match role {
        MessageRole::Human => "user",
        other => other.as_str(),
    }
}

/// Drop `tool_use` blocks, which the service cannot represent.
pub fn format_message_content(content: &MessageContent) -> MessageContent {
    match content {
        MessageContent::Blocks(blocks) => MessageContent::Blocks(
            blocks
                .iter()
                .filter(|block| block.get("type").and_then(Value::as_str) != Some("tool_use"))
                .cloned()
                .collect(),
        ),
        text => text.clone(),
    }
}

/// Convert a message into its role dictionary.
///
/// # Errors
///
/// [`WatsonxError::UnsupportedMessageType`] for a function message without a
/// name or a tool message without a `tool_call_id`.
pub fn message_to_dict(message: &Message) -> Result<MessageDict> {
    let content = format_message_content(&message.content);
    let mut dict = MessageDict::new(role_to_str(&message.role), content);

    match &message.role {
        MessageRole::Assistant => {
            if let Some(function_call) = message.additional_kwargs.get("function_call") {
                dict.function_call = Some(function_call.clone());
            }
            if !message.tool_calls.is_empty() {
                dict.tool_calls = Some(
                    message
                        .tool_calls
                        .iter()
                        .map(ToolCall::to_openai_tool_call)
                        .collect(),
                );
            } else if let Some(Value::Array(raw)) = message.additional_kwargs.get("tool_calls") {
                dict.tool_calls = Some(raw.clone());
            }
            if message.content.is_empty()
                && (dict.function_call.is_some() || dict.tool_calls.is_some())
            {
                dict.content = None;
            }
        }
        MessageRole::Function => {
            let name = message.name.clone().ok_or_else(|| {
                WatsonxError::UnsupportedMessageType("function message without a name".to_string())
            })?;
            dict.name = Some(name);
        }
        MessageRole::Tool => {
            let id = message.tool_call_id.clone().ok_or_else(|| {
                WatsonxError::UnsupportedMessageType(
                    "tool message without a tool_call_id".to_string(),
                )
            })?;
            dict.tool_call_id = Some(id);
        }
        MessageRole::System | MessageRole::Human | MessageRole::Custom(_) => {}
    }

    if let Some(Value::String(name)) = message.additional_kwargs.get("name") {
        dict.name = Some(name.clone());
    }

    Ok(dict)
}

/// Decode one tool call in either the provider form
/// (`{"id", "function": {"name", "arguments": "<json>"}}`) or the framework
/// form (`{"name", "args", "id"}`).
pub(crate) fn decode_tool_call(raw: &Value, fallback_id: &str) -> Result<ToolCall> {
    let function = raw.get("function").unwrap_or(raw);
    let name = function
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| WatsonxError::MalformedToolOutput(format!("tool call without a name: {}", raw)))?;

    let arguments = match function.get("arguments").or_else(|| function.get("args")) {
        None | Some(Value::Null) => Value::Object(Map::new()),
        Some(Value::String(encoded)) if encoded.trim().is_empty() => Value::Object(Map::new()),
        Some(Value::String(encoded)) => serde_json::from_str(encoded).map_err(|e| {
            WatsonxError::MalformedToolOutput(format!(
                "arguments of tool call '{}' are not valid JSON: {}",
                name, e
            ))
        })?,
        Some(value) => value.clone(),
    };
    if !arguments.is_object() {
        return Err(WatsonxError::MalformedToolOutput(format!(
            "arguments of tool call '{}' are not a mapping",
            name
        )));
    }

    let id = raw
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .unwrap_or(fallback_id);

    Ok(ToolCall::new(id, name, arguments))
}

/// Convert a role dictionary back into a message.
///
/// Unknown roles become [`MessageRole::Custom`].
pub fn dict_to_message(dict: &MessageDict) -> Result<Message> {
    let role: MessageRole = match dict.role.parse() {
        Ok(role) => role,
        Err(never) => match never {},
    };
    let content = dict.content.clone().unwrap_or_default();

    let mut message = match &role {
        MessageRole::Function => {
            let name = dict.name.clone().ok_or_else(|| {
                WatsonxError::UnsupportedMessageType("function message without a name".to_string())
            })?;
            Message::function(name, content)
        }
        MessageRole::Tool => {
            let id = dict.tool_call_id.clone().ok_or_else(|| {
                WatsonxError::UnsupportedMessageType(
                    "tool message without a tool_call_id".to_string(),
                )
            })?;
            Message::tool(content, id)
        }
        MessageRole::Assistant => {
            let mut message = Message::assistant(content);
            if let Some(raw_calls) = &dict.tool_calls {
                let calls = raw_calls
                    .iter()
                    .map(|raw| decode_tool_call(raw, ""))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|e| WatsonxError::InvalidResponse(e.to_string()))?;
                message.tool_calls = calls;
            }
            if let Some(function_call) = &dict.function_call {
                message
                    .additional_kwargs
                    .insert("function_call".to_string(), function_call.clone());
            }
            message
        }
        _ => Message::new(role.clone(), content),
    };

    if role != MessageRole::Function {
        if let Some(name) = &dict.name {
            message
                .additional_kwargs
                .insert("name".to_string(), Value::String(name.clone()));
        }
    }

    Ok(message)
}

/// Convert a generation result into an assistant message.
///
/// The result is free text; whether it is a tool call is decided by the
/// emulator's classification.
pub fn result_to_message(result: &GenerationResult, call_id: &str) -> Message {
    emulator::interpret_generated_text(&result.generated_text, call_id)
}

/// Convert one streamed delta into a message chunk.
///
/// The delta's own `role` wins; without one, `default_role` (the role of the
/// previous chunk) is used.
///
/// # Errors
///
/// [`WatsonxError::InvalidResponse`] for a function delta without `name` or a
/// tool delta without `tool_call_id`.
pub fn delta_to_message_chunk(delta: &Value, default_role: &MessageRole) -> Result<MessageChunk> {
    let role = match delta.get("role").and_then(Value::as_str) {
        Some(explicit) => match explicit.parse::<MessageRole>() {
            Ok(role) => role,
            Err(never) => match never {},
        },
        None => default_role.clone(),
    };
    let content = delta
        .get("generated_text")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut chunk = MessageChunk::new(role.clone(), content);
    if let Some(id) = delta.get("id").and_then(Value::as_str) {
        chunk.id = Some(id.to_string());
    }
    if let Some(reason) = delta.get("stop_reason").filter(|v| !v.is_null()) {
        chunk
            .response_metadata
            .insert("finish_reason".to_string(), reason.clone());
    }

    match &role {
        MessageRole::Assistant => {
            if let Some(Value::Object(function_call)) = delta.get("function_call") {
                let mut function_call = function_call.clone();
                if matches!(function_call.get("name"), Some(Value::Null)) {
                    function_call.insert("name".to_string(), Value::String(String::new()));
                }
                chunk
                    .additional_kwargs
                    .insert("function_call".to_string(), Value::Object(function_call));
            }
            if let Some(Value::Array(raw_calls)) = delta.get("tool_calls") {
                if !raw_calls.is_empty() {
                    chunk
                        .additional_kwargs
                        .insert("tool_calls".to_string(), Value::Array(raw_calls.clone()));
                    chunk.tool_call_chunks = raw_calls.iter().filter_map(tool_call_fragment).collect();
                }
            }
        }
        MessageRole::Function => {
            let name = delta.get("name").and_then(Value::as_str).ok_or_else(|| {
                WatsonxError::InvalidResponse("function delta without a name".to_string())
            })?;
            chunk.name = Some(name.to_string());
        }
        MessageRole::Tool => {
            let id = delta
                .get("tool_call_id")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    WatsonxError::InvalidResponse("tool delta without a tool_call_id".to_string())
                })?;
            chunk.tool_call_id = Some(id.to_string());
        }
        _ => {}
    }

    Ok(chunk)
}

fn tool_call_fragment(raw: &Value) -> Option<ToolCallChunk> {
    let function = raw.get("function")?;
    let index = match raw.get("index").and_then(Value::as_u64) {
        Some(index) => index as usize,
        None => {
            debug!("Skipping tool call fragment without an index");
            return None;
        }
    };
    Some(ToolCallChunk {
        name: function.get("name").and_then(Value::as_str).map(String::from),
        args: function
            .get("arguments")
            .and_then(Value::as_str)
            .map(String::from),
        id: raw.get("id").and_then(Value::as_str).map(String::from),
        index: Some(index),
    })
}

/// Check that only assistant messages go without content.
///
/// # Errors
///
/// [`WatsonxError::InvalidArgument`] naming the first offending role.
pub fn validate_dicts(dicts: &[MessageDict]) -> Result<()> {
    match dicts
        .iter()
        .find(|dict| dict.content.is_none() && dict.role != "assistant")
    {
        Some(dict) => Err(WatsonxError::InvalidArgument(format!(
            "Message with role '{}' has no content.",
            dict.role
        ))),
        None => Ok(()),
    }
}

/// Build the messages-form request body: `{"messages": [...], ...params}`.
///
/// # Errors
///
/// Fails like [`validate_dicts`].
pub fn build_payload(dicts: &[MessageDict], params: &GenerationParams) -> Result<Value> {
    validate_dicts(dicts)?;
    let mut body = Map::new();
    body.insert("messages".to_string(), serde_json::to_value(dicts)?);
    body.extend(params.to_map());
    Ok(Value::Object(body))
}

/// Decode messages serialized as JSON role dictionaries.
///
/// Recognizes system, assistant (with framework-form `tool_calls`), user and
/// tool roles; other roles are skipped.
pub fn messages_from_json<S: AsRef<str>>(encoded: &[S]) -> Result<Vec<Message>> {
    let mut messages = Vec::with_capacity(encoded.len());
    for item in encoded {
        let value: Value = serde_json::from_str(item.as_ref())?;
        let content = value
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        match value.get("role").and_then(Value::as_str) {
            Some("system") => messages.push(Message::system(content)),
            Some("user") => messages.push(Message::human(content)),
            Some("assistant") => {
                let mut tool_calls = Vec::new();
                if let Some(Value::Array(raw_calls)) = value.get("tool_calls") {
                    for raw in raw_calls {
                        match decode_tool_call(raw, "") {
                            Ok(call) => tool_calls.push(call),
                            Err(e) => warn!("Skipping undecodable tool call: {}", e),
                        }
                    }
                }
                messages.push(Message::assistant(content).with_tool_calls(tool_calls));
            }
            Some("tool") => {
                let id = value
                    .get("tool_call_id")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                messages.push(Message::tool(content, id));
            }
            other => debug!("Skipping message with role {:?}", other),
        }
    }
    Ok(messages)
}
