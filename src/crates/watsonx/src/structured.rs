//! Structured output: answers parsed into a schema's type.
//!
//! Function calling forces a single tool call built from the schema and
//! parses its arguments; JSON mode asks for a JSON object and parses the
//! message text. With `include_raw`, parse failures are reported next to
//! the raw message instead of failing the call.

use crate::error::{Result, WatsonxError};
use crate::model::ChatWatsonx;
use chat_core::{
    ChatRequest, JsonOutputParser, Message, OutputParser, ToolChoice, ToolDefinition,
    ToolsOutputParser,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::warn;

/// Output schema.
#[derive(Debug, Clone, PartialEq)]
pub enum Schema {
    /// A JSON schema with a `title`, a function definition, or a tool
    /// definition in `{"type": "function", "function": {...}}` form.
    Mapping(Value),
    /// Definition describing a Rust type the output deserializes into.
    Typed(ToolDefinition),
}

impl Schema {
    /// Normalize the schema into one tool definition.
    pub fn to_tool_definition(&self) -> Result<ToolDefinition> {
        match self {
            Schema::Typed(definition) => Ok(definition.clone()),
            Schema::Mapping(value) => mapping_to_tool(value),
        }
    }

    pub fn is_typed(&self) -> bool {
        matches!(self, Schema::Typed(_))
    }
}

fn mapping_to_tool(value: &Value) -> Result<ToolDefinition> {
    let object = value.as_object().ok_or_else(|| {
        WatsonxError::InvalidArgument(format!("schema must be a JSON object, got {}", value))
    })?;

    if object.contains_key("function") || object.contains_key("name") {
        return ToolDefinition::from_openai_value(value).ok_or_else(|| {
            WatsonxError::InvalidArgument("function definition without a name".to_string())
        });
    }

    if let Some(title) = object.get("title").and_then(Value::as_str) {
        let description = object
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let parameters: Map<String, Value> = object
            .iter()
            .filter(|(key, _)| key.as_str() != "title" && key.as_str() != "description")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        return Ok(ToolDefinition::new(title, description).with_parameters(Value::Object(parameters)));
    }

    Err(WatsonxError::InvalidArgument(
        "schema needs a 'title' or a function 'name'".to_string(),
    ))
}

/// How structured output is obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StructuredOutputMethod {
    #[default]
    FunctionCalling,
    JsonMode,
}

impl FromStr for StructuredOutputMethod {
    type Err = WatsonxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "function_calling" => Ok(StructuredOutputMethod::FunctionCalling),
            "json_mode" => Ok(StructuredOutputMethod::JsonMode),
            other => Err(WatsonxError::InvalidArgument(format!(
                "Unrecognized method argument. Expected one of 'function_calling' or \
                 'json_mode'. Received: '{}'",
                other
            ))),
        }
    }
}

/// A structured answer.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredOutput<T> {
    /// The parsed value; `None` when the model made no matching tool call.
    Parsed(Option<T>),
    /// The raw message with the parse outcome.
    WithRaw {
        raw: Message,
        parsed: Option<T>,
        parsing_error: Option<String>,
    },
}

impl<T> StructuredOutput<T> {
    pub fn parsed(&self) -> Option<&T> {
        match self {
            StructuredOutput::Parsed(parsed) | StructuredOutput::WithRaw { parsed, .. } => {
                parsed.as_ref()
            }
        }
    }

    pub fn into_parsed(self) -> Option<T> {
        match self {
            StructuredOutput::Parsed(parsed) | StructuredOutput::WithRaw { parsed, .. } => parsed,
        }
    }

    pub fn raw(&self) -> Option<&Message> {
        match self {
            StructuredOutput::Parsed(_) => None,
            StructuredOutput::WithRaw { raw, .. } => Some(raw),
        }
    }

    pub fn parsing_error(&self) -> Option<&str> {
        match self {
            StructuredOutput::Parsed(_) => None,
            StructuredOutput::WithRaw { parsing_error, .. } => parsing_error.as_deref(),
        }
    }
}

enum StructuredParser<T> {
    Tools(ToolsOutputParser<T>),
    Json(JsonOutputParser<T>),
}

impl<T: DeserializeOwned> StructuredParser<T> {
    fn parse(&self, message: &Message) -> chat_core::Result<Option<T>> {
        match self {
            StructuredParser::Tools(parser) => parser.parse_message(message),
            StructuredParser::Json(parser) => parser.parse_message(message).map(Some),
        }
    }
}

/// A [`ChatWatsonx`] whose answers are parsed into `T`.
pub struct StructuredChatWatsonx<T> {
    model: ChatWatsonx,
    parser: StructuredParser<T>,
    include_raw: bool,
}

impl<T: DeserializeOwned> StructuredChatWatsonx<T> {
    /// The bound model used for generation.
    pub fn model(&self) -> &ChatWatsonx {
        &self.model
    }

    /// Generate and parse an answer.
    ///
    /// # Errors
    ///
    /// Generation errors always propagate. Parse errors propagate as
    /// [`WatsonxError::OutputParsing`] unless `include_raw` was requested.
    pub async fn invoke(&self, messages: Vec<Message>) -> Result<StructuredOutput<T>> {
        let raw = self
            .model
            .generate_result(ChatRequest::new(messages))
            .await?
            .into_message()
            .ok_or_else(|| WatsonxError::InvalidResponse("model returned no generations".to_string()))?;

        match self.parser.parse(&raw).map_err(WatsonxError::from) {
            Ok(parsed) if self.include_raw => Ok(StructuredOutput::WithRaw {
                raw,
                parsed,
                parsing_error: None,
            }),
            Ok(parsed) => Ok(StructuredOutput::Parsed(parsed)),
            Err(e) if self.include_raw && e.is_recoverable() => {
                warn!("Structured output did not parse: {}", e);
                Ok(StructuredOutput::WithRaw {
                    raw,
                    parsed: None,
                    parsing_error: Some(e.to_string()),
                })
            }
            Err(e) => Err(e),
        }
    }
}

impl ChatWatsonx {
    /// Bind this model so that answers are parsed into `T`.
    ///
    /// `T = serde_json::Value` yields the plain mapping.
    ///
    /// # Errors
    ///
    /// [`WatsonxError::InvalidArgument`] when function calling is requested
    /// without a schema, the schema cannot be normalized, or the model does
    /// not support tool calling.
    pub fn with_structured_output<T: DeserializeOwned>(
        &self,
        schema: Option<Schema>,
        method: StructuredOutputMethod,
        include_raw: bool,
    ) -> Result<StructuredChatWatsonx<T>> {
        let (model, parser) = match method {
            StructuredOutputMethod::FunctionCalling => {
                let schema = schema.ok_or_else(|| {
                    WatsonxError::InvalidArgument(
                        "schema must be specified when method is 'function_calling'. Received None."
                            .to_string(),
                    )
                })?;
                let tool = schema.to_tool_definition()?;
                let name = tool.name.clone();
                let model = self.bind_tools(vec![tool], Some(ToolChoice::Tool(name.clone())))?;
                (model, StructuredParser::Tools(ToolsOutputParser::for_tool(name)))
            }
            StructuredOutputMethod::JsonMode => (
                self.bind_response_format(json!({"type": "json_object"})),
                StructuredParser::Json(JsonOutputParser::new()),
            ),
        };

        Ok(StructuredChatWatsonx {
            model,
            parser,
            include_raw,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_str() {
        assert_eq!(
            "function_calling".parse::<StructuredOutputMethod>().unwrap(),
            StructuredOutputMethod::FunctionCalling
        );
        assert_eq!(
            "json_mode".parse::<StructuredOutputMethod>().unwrap(),
            StructuredOutputMethod::JsonMode
        );
        assert!(matches!(
            "json_format".parse::<StructuredOutputMethod>(),
            Err(WatsonxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_json_schema_mapping() {
        let schema = Schema::Mapping(json!({
            "title": "Answer",
            "description": "An answer with a justification",
            "type": "object",
            "properties": {"answer": {"type": "string"}}
        }));
        let tool = schema.to_tool_definition().unwrap();
        assert_eq!(tool.name, "Answer");
        assert_eq!(tool.description, "An answer with a justification");
        assert_eq!(tool.properties()["answer"]["type"], "string");
        assert!(tool.parameters.unwrap().get("title").is_none());
    }

    #[test]
    fn test_function_and_tool_mappings() {
        let function = json!({"name": "Answer", "description": "d", "parameters": {"type": "object"}});
        let tool = Schema::Mapping(function.clone()).to_tool_definition().unwrap();
        assert_eq!(tool.name, "Answer");

        let wrapped = json!({"type": "function", "function": function});
        assert_eq!(Schema::Mapping(wrapped).to_tool_definition().unwrap(), tool);

        assert!(Schema::Mapping(json!({"type": "object"})).to_tool_definition().is_err());
        assert!(Schema::Mapping(json!("Answer")).to_tool_definition().is_err());
        assert!(Schema::Typed(ToolDefinition::new("T", "")).is_typed());
    }

    #[test]
    fn test_structured_output_accessors() {
        let output = StructuredOutput::WithRaw {
            raw: Message::ai("x"),
            parsed: None::<Value>,
            parsing_error: Some("bad".to_string()),
        };
        assert!(output.parsed().is_none());
        assert_eq!(output.parsing_error(), Some("bad"));
        assert_eq!(output.raw().and_then(Message::text), Some("x"));

        let output = StructuredOutput::Parsed(Some(json!({"a": 1})));
        assert!(output.raw().is_none());
        assert_eq!(output.into_parsed(), Some(json!({"a": 1})));
    }
}
