//! Tool calling abstractions for function-calling models.
//!
//! # Function Calling Flow
//!
//! 1. **Define tools**: create [`ToolDefinition`]s with name, description, parameters
//! 2. **Bind to request**: add tools via `ChatRequest::with_tools()` or a model's `bind_tools`
//! 3. **Model requests tool**: the response message carries `tool_calls`
//! 4. **Execute tool**: the application runs the function
//! 5. **Return results**: send a `Message::tool` with the matching `tool_call_id`
//!
//! Tool definitions travel to providers in the widely used "OpenAI tool"
//! shape (`{"type": "function", "function": {...}}`); see
//! [`ToolDefinition::to_openai_tool`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

/// Definition of a tool/function that an LLM can call.
///
/// `parameters` is a JSON Schema object, typically
/// `{"type": "object", "properties": {...}, "required": [...]}`.
///
/// ```rust
/// use chat_core::ToolDefinition;
/// use serde_json::json;
///
/// let tool = ToolDefinition::new("get_weather", "Get current weather for a location")
///     .with_parameters(json!({
///         "type": "object",
///         "properties": {"location": {"type": "string"}},
///         "required": ["location"]
///     }));
/// assert_eq!(tool.to_openai_tool()["function"]["name"], "get_weather");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique name within the tool list.
    pub name: String,

    /// What the tool does; the model uses this to decide when to call it.
    #[serde(default)]
    pub description: String,

    /// JSON Schema describing the function's parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
}

impl ToolDefinition {
    /// Create a new tool definition with name and description.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: None,
        }
    }

    /// Add a JSON Schema for the tool's parameters.
    pub fn with_parameters(mut self, parameters: JsonValue) -> Self {
        self.parameters = Some(parameters);
        self
    }

    /// Parameter schema, defaulting to an empty object schema.
    pub fn parameters_or_default(&self) -> JsonValue {
        self.parameters
            .clone()
            .unwrap_or_else(|| json!({"type": "object", "properties": {}}))
    }

    /// The `properties` map of the parameter schema (empty when absent).
    pub fn properties(&self) -> JsonValue {
        self.parameters
            .as_ref()
            .and_then(|p| p.get("properties"))
            .cloned()
            .unwrap_or_else(|| JsonValue::Object(Map::new()))
    }

    /// Function form: `{"name", "description", "parameters"}`.
    pub fn to_openai_function(&self) -> JsonValue {
        json!({
            "name": self.name,
            "description": self.description,
            "parameters": self.parameters_or_default(),
        })
    }

    /// Tool form: `{"type": "function", "function": {...}}`.
    pub fn to_openai_tool(&self) -> JsonValue {
        json!({
            "type": "function",
            "function": self.to_openai_function(),
        })
    }

    /// Read a definition from either the tool form or the bare function form.
    pub fn from_openai_value(value: &JsonValue) -> Option<Self> {
        let function = value.get("function").unwrap_or(value);
        let name = function.get("name")?.as_str()?;
        Some(Self {
            name: name.to_string(),
            description: function
                .get("description")
                .and_then(JsonValue::as_str)
                .unwrap_or_default()
                .to_string(),
            parameters: function.get("parameters").cloned(),
        })
    }
}

/// A request from the model to call a specific tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier used to associate tool results with this call.
    pub id: String,

    /// Name of the tool to call.
    pub name: String,

    /// Arguments as a JSON object, never a JSON-encoded string.
    pub arguments: JsonValue,
}

impl ToolCall {
    /// Create a new tool call.
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: JsonValue) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// The framework's dictionary form: `{"name", "args", "id", "type"}`.
    pub fn to_value(&self) -> JsonValue {
        json!({
            "name": self.name,
            "args": self.arguments,
            "id": self.id,
            "type": "tool_call",
        })
    }

    /// Provider form with stringified arguments.
    pub fn to_openai_tool_call(&self) -> JsonValue {
        json!({
            "type": "function",
            "id": self.id,
            "function": {
                "name": self.name,
                "arguments": self.arguments.to_string(),
            },
        })
    }
}

/// A fragment of a tool call received while streaming.
///
/// Fragments sharing an `index` belong to the same call; `args` holds a
/// partial JSON string that only parses once every fragment is joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCallChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

/// Which tool, if any, the model must call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    /// Model decides.
    Auto,
    /// Model must not call tools.
    None,
    /// Model must call at least one tool.
    Required,
    /// Model must call the named tool.
    Tool(String),
}

impl ToolChoice {
    /// Provider form of the choice.
    pub fn to_value(&self) -> JsonValue {
        match self {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::None => json!("none"),
            ToolChoice::Required => json!("required"),
            ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
        }
    }
}
