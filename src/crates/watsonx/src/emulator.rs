//! Tool calling on top of plain text generation.
//!
//! The service only completes prompts. To offer tools, the conversation gets
//! a synthetic system instruction describing them, and the generated text is
//! classified afterwards: a JSON tool call becomes a [`ToolCall`], a JSON
//! message object is unpacked, anything else is sanitized text.
//!
//! [`interpret_generated_text`] is the single entry point of that
//! classification.

use crate::codec::{decode_tool_call, MessageDict};
use crate::error::{Result, WatsonxError};
use chat_core::{Message, MessageRole, ToolCall, ToolDefinition};
use regex::Regex;
use serde_json::{json, Value};
use std::sync::LazyLock;
use tracing::{debug, warn};

/// Models the tool instruction has been validated against.
pub const TOOL_CALLING_MODELS: &[&str] = &["meta-llama/llama-3-1-70b-instruct"];

/// Control tokens some models emit before a tool call.
pub const CONTROL_TOKENS: &str = "<|python_tag|><|start_header_id|>assistant<|end_header_id|>";

/// Appended to every part of the merged system message.
pub const ROLE_REMINDER: &str = "\n When responding to the user your role should always be assistant";

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

static PLAIN_TEXT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[A-Za-z0-9\s,.-]+").expect("plain text pattern is valid"));

/// JSON schema of the tool call format the model is asked to produce.
pub fn tool_schema() -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "name": {"type": "string", "description": "The name of the tool."},
            "description": {
                "type": "string",
                "description": "A description of what the tool does."
            },
            "args": {
                "type": "object",
                "properties": {
                    "query": {
                        "type": "object",
                        "properties": {
                            "description": {
                                "type": "string",
                                "description": "The description of the query argument."
                            }
                        },
                        "required": ["description"]
                    }
                },
                "required": ["query"]
            }
        },
        "required": ["name", "description", "args"]
    })
}

/// Fail unless `model_id` supports emulated tool calling.
pub fn ensure_tool_calling_supported(model_id: &str) -> Result<()> {
    if TOOL_CALLING_MODELS.contains(&model_id) {
        Ok(())
    } else {
        Err(WatsonxError::InvalidArgument(format!(
            "bind_tools() is only supported for the following models: {:?}, got '{}'",
            TOOL_CALLING_MODELS, model_id
        )))
    }
}

/// The synthetic system instruction describing `tools`.
pub fn tool_instruction(tools: &[ToolDefinition]) -> String {
    let descriptions: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "args": tool.properties(),
            })
        })
        .collect();

    let instruction = format!(
        "Given the following functions, please respond with a JSON for a function call \
         with its proper arguments that best answers the given prompt.\n\n\
         {}\n\n\
         Tools should use the following format:\n\
         {}\n\n\
         Reminder:\n\
         -Required parameters MUST be specified\n\
         -Put the entire function call reply on one line\n\
         -ONLY use the function arguments provided in the tool description.\n\
         -If you do not need to use a tool or you have the answer then respond directly to the user.",
        Value::Array(descriptions),
        tool_schema()
    );
    WHITESPACE.replace_all(&instruction, " ").trim().to_string()
}

/// Prepend the tool instruction and merge every system message into one.
///
/// The merged system message holds the instruction followed by the original
/// system contents, each part followed by [`ROLE_REMINDER`]. Non-system
/// messages follow in their original order.
pub fn inject_tools(messages: &[MessageDict], tools: &[ToolDefinition]) -> Vec<MessageDict> {
    let mut system = tool_instruction(tools);
    system.push_str(ROLE_REMINDER);

    let mut rest = Vec::with_capacity(messages.len());
    for message in messages {
        if message.role == MessageRole::System.as_str() {
            system.push_str(&message.content_text());
            system.push_str(ROLE_REMINDER);
        } else {
            rest.push(message.clone());
        }
    }

    let mut merged = Vec::with_capacity(rest.len() + 1);
    merged.push(MessageDict::new(MessageRole::System.as_str(), system));
    merged.extend(rest);
    merged
}

/// Remove [`CONTROL_TOKENS`] and surrounding whitespace.
pub fn strip_control_tokens(text: &str) -> String {
    text.replace(CONTROL_TOKENS, "").trim().to_string()
}

/// Whether `value` looks like a single tool call.
///
/// A one-element list is unwrapped first. The call must be an object whose
/// `args` is an object containing `query`.
pub fn is_valid_tool_call_format(value: &Value) -> bool {
    let candidate = match value {
        Value::Array(items) if items.len() == 1 => &items[0],
        Value::Array(_) => return false,
        other => other,
    };
    candidate
        .get("args")
        .and_then(Value::as_object)
        .is_some_and(|args| args.contains_key("query"))
}

/// Text fallback: no code fences, no line breaks, only `[A-Za-z0-9\s,.-]`.
pub fn sanitize_text(text: &str) -> String {
    let flattened = text.replace("```", "").replace('\n', "");
    PLAIN_TEXT
        .find_iter(&flattened)
        .map(|m| m.as_str())
        .collect()
}

/// Tool calls from a tool-shaped value, all carrying `call_id`.
fn tool_calls_from(value: &Value, call_id: &str) -> Result<Vec<ToolCall>> {
    let candidates: Vec<&Value> = match value {
        Value::Array(items) if items.len() == 1 && items[0].is_object() => vec![&items[0]],
        Value::Array(_) => {
            return Err(WatsonxError::MalformedToolOutput(
                "expected a list with a single tool call".to_string(),
            ))
        }
        other => vec![other],
    };

    candidates
        .into_iter()
        .map(|candidate| {
            let mut call = decode_tool_call(candidate, call_id)?;
            call.id = call_id.to_string();
            Ok(call)
        })
        .collect()
}

/// Unpack a JSON message object that is not a tool call.
fn message_from_object(object: &serde_json::Map<String, Value>, call_id: &str) -> Message {
    let content = match object.get("content") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    };
    let tool_calls = match object.get("tool_calls") {
        Some(Value::Array(raw_calls)) => raw_calls
            .iter()
            .filter_map(|raw| match decode_tool_call(raw, call_id) {
                Ok(call) => Some(call),
                Err(e) => {
                    warn!("Dropping undecodable tool call: {}", e);
                    None
                }
            })
            .collect(),
        _ => Vec::new(),
    };
    Message::ai(content).with_tool_calls(tool_calls)
}

/// Classify generated text into an assistant message.
///
/// 1. Strip control tokens. Text that is not JSON is retried without code
///    fences.
/// 2. A JSON object or array in tool-call shape becomes a tool call with id
///    `call_id`.
/// 3. Any other JSON object is read as a message (`content`, `tool_calls`).
/// 4. Everything else, including tool calls that fail to decode, goes
///    through [`sanitize_text`].
pub fn interpret_generated_text(text: &str, call_id: &str) -> Message {
    let cleaned = strip_control_tokens(text);
    let parsed = serde_json::from_str::<Value>(&cleaned)
        .or_else(|_| serde_json::from_str::<Value>(cleaned.replace("```", "").trim()));

    match parsed {
        Ok(value) if is_valid_tool_call_format(&value) => match tool_calls_from(&value, call_id) {
            Ok(calls) => {
                debug!(count = calls.len(), "Parsed emulated tool call");
                return Message::ai("").with_tool_calls(calls);
            }
            Err(e) => warn!("Falling back to text for malformed tool output: {}", e),
        },
        Ok(Value::Object(object)) => return message_from_object(&object, call_id),
        Ok(_) | Err(_) => {}
    }

    Message::ai(sanitize_text(&cleaned))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn search_tool() -> ToolDefinition {
        ToolDefinition::new("search", "Search the web").with_parameters(json!({
            "type": "object",
            "properties": {"query": {"type": "string"}},
            "required": ["query"]
        }))
    }

    #[test]
    fn test_valid_tool_call_format() {
        assert!(is_valid_tool_call_format(&json!({"name": "s", "args": {"query": "q"}})));
        assert!(!is_valid_tool_call_format(&json!({"name": "s", "args": {}})));
        assert!(!is_valid_tool_call_format(&json!({"name": "s"})));
        assert!(is_valid_tool_call_format(&json!([{"name": "s", "args": {"query": "q"}}])));
        assert!(!is_valid_tool_call_format(&json!([
            {"name": "s", "args": {"query": "q"}},
            {"name": "t", "args": {"query": "r"}}
        ])));
        assert!(!is_valid_tool_call_format(&json!("args")));
    }

    #[test]
    fn test_control_tokens_stripped_before_parsing() {
        let text = format!(
            "{}{{\"name\": \"search\", \"args\": {{\"query\": \"q\"}}}}",
            CONTROL_TOKENS
        );
        let message = interpret_generated_text(&text, "abc123");
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.content.to_text(), "");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "search");
        assert_eq!(message.tool_calls[0].arguments, json!({"query": "q"}));
        assert_eq!(message.tool_calls[0].id, "abc123");
    }

    #[test]
    fn test_single_element_list_is_a_call() {
        let message = interpret_generated_text(r#"[{"name": "search", "args": {"query": "x"}}]"#, "id1");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].id, "id1");
    }

    #[test]
    fn test_message_object_branch() {
        let message = interpret_generated_text(r#"{"role": "tool", "content": "ok"}"#, "id1");
        assert_eq!(message.content.to_text(), "ok");
        assert!(message.tool_calls.is_empty());

        let message = interpret_generated_text(
            r#"{"role": "tool", "content": "ok", "args": {"query": "q"}, "name": "search"}"#,
            "id1",
        );
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.content.to_text(), "");

        let message = interpret_generated_text(r#"{"answer": 42}"#, "id1");
        assert_eq!(message.content.to_text(), "");
    }

    #[test]
    fn test_text_fallback() {
        let message = interpret_generated_text("```\nHello 👋 world!\n```", "id1");
        assert_eq!(message.content.to_text(), "Hello  world");
        assert!(message.tool_calls.is_empty());

        // JSON scalars and non-tool arrays are text too.
        assert_eq!(interpret_generated_text("42", "id").content.to_text(), "42");
        assert_eq!(interpret_generated_text("[1, 2]", "id").content.to_text(), "1, 2");
    }

    #[test]
    fn test_fenced_tool_call_is_a_call() {
        let message = interpret_generated_text(
            "```\n{\"name\": \"search\", \"args\": {\"query\": \"q\"}}\n```",
            "id1",
        );
        assert_eq!(message.content.to_text(), "");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "search");
        assert_eq!(message.tool_calls[0].arguments, json!({"query": "q"}));
    }

    #[test]
    fn test_malformed_tool_output_degrades_to_text() {
        let message = interpret_generated_text(r#"{"args": {"query": "q"}}"#, "id1");
        assert!(message.tool_calls.is_empty());
        assert_eq!(message.content.to_text(), "args query q");
    }

    #[test]
    fn test_tool_instruction_collapses_whitespace() {
        let instruction = tool_instruction(&[search_tool()]);
        assert!(instruction.starts_with("Given the following functions"));
        assert!(instruction.contains(r#""name":"search""#));
        assert!(instruction.contains(r#""args":{"query":{"type":"string"}}"#));
        assert!(instruction.contains("Tools should use the following format:"));
        assert!(!instruction.contains('\n'));
        assert!(!instruction.contains("  "));
    }

    #[test]
    fn test_inject_tools_merges_system_messages() {
        let messages = vec![
            MessageDict::new("user", "Hi"),
            MessageDict::new("system", "Be brief."),
            MessageDict::new("assistant", "Hello"),
        ];
        let injected = inject_tools(&messages, &[search_tool()]);
        assert_eq!(injected.len(), 3);
        assert_eq!(injected[0].role, "system");
        assert_eq!(injected[1].role, "user");
        assert_eq!(injected[2].role, "assistant");

        let system = injected[0].content_text();
        let instruction = tool_instruction(&[search_tool()]);
        assert_eq!(
            system,
            format!("{}{}Be brief.{}", instruction, ROLE_REMINDER, ROLE_REMINDER)
        );
    }

    #[test]
    fn test_supported_models() {
        assert!(ensure_tool_calling_supported("meta-llama/llama-3-1-70b-instruct").is_ok());
        assert!(matches!(
            ensure_tool_calling_supported("ibm/granite-13b-chat-v2"),
            Err(WatsonxError::InvalidArgument(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_text_fallback_only_keeps_plain_characters(tail in any::<String>()) {
            let message = interpret_generated_text(&format!("x{}", tail), "id");
            let content = message.content.to_text();
            prop_assert!(!content.contains('\n'));
            let only_plain = content.chars().all(|c| {
                c.is_ascii_alphanumeric() || c.is_whitespace() || matches!(c, ',' | '.' | '-')
            });
            prop_assert!(only_plain);
        }
    }
}
