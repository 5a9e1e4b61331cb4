//! The watsonx chat model.
//!
//! [`ChatWatsonx`] implements [`ChatModel`] over a [`ModelInference`] client:
//!
//! ```text
//! messages ─► codec ─► (tools?) emulator ─► payload check ─► template ─► client
//!                                                                          │
//! ChatResult ◄─ assembler ◄─ emulator classification ◄─ raw response ◄─────┘
//! ```
//!
//! Binding methods (`bind_tools`, `bind_functions`, `bind_response_format`)
//! return a new model carrying request defaults; the original is unchanged.

use crate::assembler::{assemble, check_error};
use crate::codec::{delta_to_message_chunk, message_to_dict, validate_dicts};
use crate::config::{secret_env_vars, Credentials, EnvSource, ProcessEnv, WatsonxConfig};
use crate::emulator::{ensure_tool_calling_supported, inject_tools};
use crate::error::{Result, WatsonxError};
use crate::inference::ModelInference;
use crate::params::GenerationParams;
use crate::template::render;
use async_trait::async_trait;
use chat_core::{
    ChatConfig, ChatError, ChatModel, ChatRequest, ChatResult, ChunkBuffer, Generation, LlmOutput,
    MessageChunk, MessageChunkStream, MessageRole, TokenUsage, ToolChoice, ToolDefinition,
    UsageMetadata,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifier reported by [`ChatModel::llm_type`].
pub const LLM_TYPE: &str = "watsonx-chat";

/// Provider name recorded on generation spans.
pub const PROVIDER: &str = "ibm";

/// Which function the model must call when functions are bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FunctionCall {
    Auto,
    None,
    Named(String),
}

impl FunctionCall {
    fn to_value(&self) -> Value {
        match self {
            FunctionCall::Auto => json!("auto"),
            FunctionCall::None => json!("none"),
            FunctionCall::Named(name) => json!({"name": name}),
        }
    }
}

impl From<&str> for FunctionCall {
    fn from(value: &str) -> Self {
        match value {
            "auto" => FunctionCall::Auto,
            "none" => FunctionCall::None,
            name => FunctionCall::Named(name.to_string()),
        }
    }
}

/// Everything needed to call the client for one request.
#[derive(Debug, Clone)]
pub(crate) struct PreparedCall {
    pub(crate) prompt: String,
    pub(crate) params: GenerationParams,
    pub(crate) uses_tools: bool,
}

/// IBM watsonx.ai chat model.
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use chat_core::{ChatModel, Message};
/// use watsonx_chat::{ChatWatsonx, GenerationParams, WatsonxConfig};
///
/// let config = WatsonxConfig::new("meta-llama/llama-3-1-70b-instruct")
///     .with_url("https://us-south.ml.cloud.ibm.com")
///     .with_project_id("my-project")
///     .with_params(GenerationParams::new().with_max_new_tokens(200));
/// let model = ChatWatsonx::new(config, Arc::new(my_client))?;
/// let reply = model.invoke(vec![Message::human("Hello")]).await?;
/// ```
#[derive(Clone)]
pub struct ChatWatsonx {
    config: WatsonxConfig,
    credentials: Credentials,
    inference: Arc<dyn ModelInference>,
    bound: ChatConfig,
}

impl fmt::Debug for ChatWatsonx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatWatsonx")
            .field("model_id", &self.model_id())
            .field("streaming", &self.config.streaming)
            .field("credentials", &self.credentials)
            .field(
                "bound_tools",
                &self.bound.tools.iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ChatWatsonx {
    /// Create a model, resolving missing credentials from the process
    /// environment.
    pub fn new(config: WatsonxConfig, inference: Arc<dyn ModelInference>) -> Result<Self> {
        Self::with_env(config, inference, &ProcessEnv)
    }

    /// Create a model, resolving missing credentials from `env`.
    pub fn with_env(
        config: WatsonxConfig,
        inference: Arc<dyn ModelInference>,
        env: &dyn EnvSource,
    ) -> Result<Self> {
        let credentials = config.resolve(env)?;
        info!(
            model_id = %config.model_id,
            deployment_id = %config.deployment_id,
            cloud = credentials.is_cloud(),
            "Created watsonx chat model"
        );
        Ok(Self {
            config,
            credentials,
            inference,
            bound: ChatConfig::default(),
        })
    }

    /// Map of constructor field names to the environment variables they
    /// fall back to.
    pub fn secret_env_vars() -> BTreeMap<&'static str, &'static str> {
        secret_env_vars()
    }

    pub fn config(&self) -> &WatsonxConfig {
        &self.config
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// The model id, or the deployment id for deployed models.
    pub fn model_id(&self) -> &str {
        if self.config.model_id.is_empty() {
            &self.config.deployment_id
        } else {
            &self.config.model_id
        }
    }

    /// Request defaults attached by the `bind_*` methods.
    pub fn bound_config(&self) -> &ChatConfig {
        &self.bound
    }

    /// Bind tools for emulated tool calling.
    ///
    /// # Errors
    ///
    /// [`WatsonxError::InvalidArgument`] when the model does not support tool
    /// calling. Nothing is sent to the service.
    pub fn bind_tools(
        &self,
        tools: Vec<ToolDefinition>,
        tool_choice: Option<ToolChoice>,
    ) -> Result<Self> {
        ensure_tool_calling_supported(self.model_id())?;
        let mut bound = self.clone();
        bound.bound.tools = tools;
        bound.bound.tool_choice = tool_choice;
        debug!(tools = bound.bound.tools.len(), "Bound tools");
        Ok(bound)
    }

    /// Bind legacy function definitions.
    ///
    /// A named `function_call` requires exactly one function with that name.
    pub fn bind_functions(
        &self,
        functions: Vec<ToolDefinition>,
        function_call: Option<FunctionCall>,
    ) -> Result<Self> {
        if let Some(FunctionCall::Named(name)) = &function_call {
            if functions.len() != 1 {
                return Err(WatsonxError::InvalidArgument(
                    "When specifying `function_call`, you must provide exactly one function."
                        .to_string(),
                ));
            }
            if functions[0].name != *name {
                return Err(WatsonxError::InvalidArgument(format!(
                    "Function call '{}' was specified, but the only provided function was '{}'.",
                    name, functions[0].name
                )));
            }
        }
        let mut bound = self.clone();
        bound.bound.functions = functions;
        bound.bound.function_call = function_call.map(|call| call.to_value());
        Ok(bound)
    }

    /// Bind a response format such as `{"type": "json_object"}`.
    pub fn bind_response_format(&self, format: Value) -> Self {
        let mut bound = self.clone();
        bound.bound.response_format = Some(format);
        bound
    }

    /// Per-call configuration layered over the bound defaults.
    fn effective_config(&self, call: &ChatConfig) -> ChatConfig {
        let bound = &self.bound;
        let pick = |call: &Vec<ToolDefinition>, bound: &Vec<ToolDefinition>| {
            if call.is_empty() {
                bound.clone()
            } else {
                call.clone()
            }
        };
        let mut params = bound.params.clone();
        params.extend(call.params.clone());
        ChatConfig {
            stop: call.stop.clone().or_else(|| bound.stop.clone()),
            tools: pick(&call.tools, &bound.tools),
            tool_choice: call.tool_choice.clone().or_else(|| bound.tool_choice.clone()),
            functions: pick(&call.functions, &bound.functions),
            function_call: call.function_call.clone().or_else(|| bound.function_call.clone()),
            response_format: call
                .response_format
                .clone()
                .or_else(|| bound.response_format.clone()),
            params,
        }
    }

    /// Translate a request into the prompt and parameters for the client.
    pub(crate) fn prepare(&self, request: &ChatRequest) -> Result<PreparedCall> {
        let config = self.effective_config(&request.config);

        let call_params = GenerationParams::from_map(&config.params)?;
        let mut params = self.config.params.merge(&call_params).with_stop(config.stop)?;
        if let Some(format) = config.response_format {
            params.extra.insert("response_format".to_string(), format);
        }

        let mut dicts = request
            .messages
            .iter()
            .map(message_to_dict)
            .collect::<Result<Vec<_>>>()?;

        let tools: Vec<ToolDefinition> = config
            .tools
            .into_iter()
            .chain(config.functions)
            .collect();
        let uses_tools = !tools.is_empty();
        if uses_tools {
            dicts = inject_tools(&dicts, &tools);
        }

        validate_dicts(&dicts)?;
        let prompt = render(&dicts, self.model_id())?;

        debug!(
            messages = dicts.len(),
            uses_tools,
            prompt_chars = prompt.len(),
            "Prepared watsonx call"
        );
        Ok(PreparedCall {
            prompt,
            params,
            uses_tools,
        })
    }

    /// Generate a complete result.
    #[tracing::instrument(
        name = "watsonx_generate",
        skip_all,
        fields(provider = PROVIDER, model_id = %self.model_id(), llm_type = LLM_TYPE)
    )]
    pub async fn generate_result(&self, request: ChatRequest) -> Result<ChatResult> {
        let prepared = self.prepare(&request)?;

        if self.config.streaming && !prepared.uses_tools {
            return self.generate_from_stream(prepared).await;
        }
        self.generate_prepared(&prepared).await
    }

    async fn generate_prepared(&self, prepared: &PreparedCall) -> Result<ChatResult> {
        let raw = self
            .inference
            .generate(&prepared.prompt, &prepared.params)
            .await?;
        let result = assemble(&raw, self.model_id())?;
        info!(
            generations = result.generations.len(),
            total_tokens = result.llm_output.token_usage.total(),
            "Generation complete"
        );
        Ok(result)
    }

    /// Stream message chunks.
    ///
    /// With tools in play the answer is generated in one piece and classified,
    /// then yielded as one chunk per generation.
    #[tracing::instrument(
        name = "watsonx_stream",
        skip_all,
        fields(provider = PROVIDER, model_id = %self.model_id(), llm_type = LLM_TYPE)
    )]
    pub async fn stream_chunks(&self, request: ChatRequest) -> Result<MessageChunkStream> {
        let prepared = self.prepare(&request)?;
        if !prepared.uses_tools {
            return self.open_stream(&prepared).await;
        }

        let result = self.generate_prepared(&prepared).await?;
        let chunks: Vec<chat_core::Result<MessageChunk>> = result
            .generations
            .iter()
            .map(|generation| {
                let mut chunk = MessageChunk::from_message(&generation.message);
                if let Some(reason) = generation.generation_info.get("finish_reason") {
                    chunk = chunk.with_metadata("finish_reason", reason.clone());
                }
                Ok(chunk)
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }

    async fn open_stream(&self, prepared: &PreparedCall) -> Result<MessageChunkStream> {
        let mut inner = self
            .inference
            .generate_stream(&prepared.prompt, &prepared.params)
            .await?;

        let stream = async_stream::stream! {
            let mut role = MessageRole::Assistant;
            while let Some(delta) = inner.next().await {
                match delta.and_then(|delta| chunks_from_delta(&delta, &mut role)) {
                    Ok(chunks) => {
                        for chunk in chunks {
                            yield Ok(chunk);
                        }
                    }
                    Err(e) => {
                        yield Err(ChatError::from(e));
                        return;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    /// Drive the streaming endpoint and aggregate it into one generation.
    ///
    /// Token counts are summed over every delta entry.
    async fn generate_from_stream(&self, prepared: PreparedCall) -> Result<ChatResult> {
        let mut inner = self
            .inference
            .generate_stream(&prepared.prompt, &prepared.params)
            .await?;
        let mut role = MessageRole::Assistant;
        let mut buffer = ChunkBuffer::new();
        let mut usage = TokenUsage::default();
        while let Some(delta) = inner.next().await {
            let delta = delta?;
            for chunk in chunks_from_delta(&delta, &mut role)? {
                buffer.add_chunk(&chunk);
            }
            for entry in delta_entries(&delta) {
                usage.generated_token_count += token_count(entry, "generated_token_count");
                usage.input_token_count += token_count(entry, "input_token_count");
            }
        }
        debug!(
            chunks = buffer.chunk_count(),
            total_tokens = usage.total(),
            "Aggregated streamed chunks"
        );

        let finish_reason = buffer
            .response_metadata()
            .get("finish_reason")
            .cloned()
            .unwrap_or(Value::Null);
        let mut message = buffer.into_message();
        if usage.total() > 0 && message.role == MessageRole::Assistant {
            message.usage_metadata = Some(UsageMetadata::new(
                usage.input_token_count,
                usage.generated_token_count,
            ));
        }
        Ok(ChatResult {
            generations: vec![Generation::new(message).with_info("finish_reason", finish_reason)],
            llm_output: LlmOutput {
                token_usage: usage,
                model_name: self.model_id().to_string(),
                ..LlmOutput::default()
            },
        })
    }
}

/// A delta's `results` entries, or the delta itself.
fn delta_entries(delta: &Value) -> Vec<&Value> {
    match delta.get("results").and_then(Value::as_array) {
        Some(results) => results.iter().collect(),
        None => vec![delta],
    }
}

fn token_count(entry: &Value, key: &str) -> usize {
    entry.get(key).and_then(Value::as_u64).unwrap_or(0) as usize
}

/// Chunks for one raw delta, one per entry.
fn chunks_from_delta(delta: &Value, role: &mut MessageRole) -> Result<Vec<MessageChunk>> {
    check_error(delta)?;
    let entries = delta_entries(delta);
    let mut chunks = Vec::with_capacity(entries.len());
    for entry in entries {
        let chunk = delta_to_message_chunk(entry, role)?;
        *role = chunk.role.clone();
        chunks.push(chunk);
    }
    Ok(chunks)
}

#[async_trait]
impl ChatModel for ChatWatsonx {
    async fn generate(&self, request: ChatRequest) -> chat_core::Result<ChatResult> {
        Ok(self.generate_result(request).await?)
    }

    async fn stream(&self, request: ChatRequest) -> chat_core::Result<MessageChunkStream> {
        Ok(self.stream_chunks(request).await?)
    }

    fn llm_type(&self) -> &str {
        LLM_TYPE
    }

    fn bound_tools(&self) -> Vec<ToolDefinition> {
        self.bound.tools.clone()
    }

    fn clone_box(&self) -> Box<dyn ChatModel> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::ResponseStream;
    use chat_core::Message;
    use std::collections::HashMap;

    struct Unused;

    #[async_trait]
    impl ModelInference for Unused {
        async fn generate(&self, _prompt: &str, _params: &GenerationParams) -> Result<Value> {
            Err(WatsonxError::Provider("not scripted".into()))
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _params: &GenerationParams,
        ) -> Result<ResponseStream> {
            Err(WatsonxError::Provider("not scripted".into()))
        }
    }

    fn model(model_id: &str) -> ChatWatsonx {
        let env: HashMap<String, String> = HashMap::new();
        let config = WatsonxConfig::new(model_id)
            .with_url("https://us-south.ml.cloud.ibm.com")
            .with_apikey("k");
        ChatWatsonx::with_env(config, Arc::new(Unused), &env).unwrap()
    }

    fn search_tool() -> ToolDefinition {
        ToolDefinition::new("search", "Search").with_parameters(json!({
            "type": "object",
            "properties": {"query": {"type": "string"}}
        }))
    }

    #[test]
    fn test_llm_type_and_model_id() {
        let model = model("ibm/granite-13b-chat-v2");
        assert_eq!(model.llm_type(), "watsonx-chat");
        assert_eq!(model.model_id(), "ibm/granite-13b-chat-v2");
        assert!(!format!("{:?}", model).contains("\"k\""));
        assert_eq!(ChatWatsonx::secret_env_vars()["url"], "WATSONX_URL");
    }

    #[test]
    fn test_deployment_id_used_without_model_id() {
        let env: HashMap<String, String> = HashMap::new();
        let config = WatsonxConfig::for_deployment("dep-1")
            .with_url("https://us-south.ml.cloud.ibm.com")
            .with_apikey("k");
        let model = ChatWatsonx::with_env(config, Arc::new(Unused), &env).unwrap();
        assert_eq!(model.model_id(), "dep-1");
    }

    #[test]
    fn test_bind_tools_allow_list() {
        let err = model("ibm/granite-13b-chat-v2")
            .bind_tools(vec![search_tool()], None)
            .err()
            .unwrap();
        assert!(matches!(err, WatsonxError::InvalidArgument(_)));

        let base = model("meta-llama/llama-3-1-70b-instruct");
        let bound = base.bind_tools(vec![search_tool()], Some(ToolChoice::Auto)).unwrap();
        assert_eq!(bound.bound_tools().len(), 1);
        assert!(base.bound_tools().is_empty());
    }

    #[test]
    fn test_bind_functions_validation() {
        let base = model("ibm/granite-13b-chat-v2");
        let two = vec![search_tool(), ToolDefinition::new("other", "")];

        assert!(base.bind_functions(two.clone(), Some("search".into())).is_err());
        assert!(base
            .bind_functions(vec![search_tool()], Some("other".into()))
            .is_err());

        let bound = base.bind_functions(two, Some("auto".into())).unwrap();
        assert_eq!(bound.bound_config().function_call, Some(json!("auto")));

        let bound = base
            .bind_functions(vec![search_tool()], Some("search".into()))
            .unwrap();
        assert_eq!(bound.bound_config().function_call, Some(json!({"name": "search"})));
    }

    #[test]
    fn test_prepare_injects_tools_and_renders() {
        let model = model("meta-llama/llama-3-1-70b-instruct")
            .bind_tools(vec![search_tool()], None)
            .unwrap();
        let request = ChatRequest::new(vec![Message::system("Be brief."), Message::human("Hi")]);
        let prepared = model.prepare(&request).unwrap();
        assert!(prepared.uses_tools);
        assert!(prepared
            .prompt
            .starts_with("<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n Given the following functions"));
        assert!(prepared.prompt.contains("Be brief."));
        assert!(prepared.prompt.ends_with("<|assistant|>\n"));
    }

    #[test]
    fn test_prepare_param_layering() {
        let env: HashMap<String, String> = HashMap::new();
        let config = WatsonxConfig::new("ibm/granite-13b-chat-v2")
            .with_url("https://us-south.ml.cloud.ibm.com")
            .with_apikey("k")
            .with_params(GenerationParams::new().with_max_new_tokens(50).with_temperature(0.1));
        let model = ChatWatsonx::with_env(config, Arc::new(Unused), &env).unwrap();

        let request = ChatRequest::new(vec![Message::human("Hi")])
            .with_param("temperature", json!(0.7))
            .with_stop(vec!["END".into()]);
        let prepared = model.prepare(&request).unwrap();
        assert_eq!(prepared.params.max_new_tokens, Some(50));
        assert_eq!(prepared.params.temperature, Some(0.7));
        assert_eq!(prepared.params.stop_sequences, Some(vec!["END".to_string()]));

        let conflicting = ChatRequest::new(vec![Message::human("Hi")])
            .with_param("stop_sequences", json!(["\n"]))
            .with_stop(vec!["END".into()]);
        assert!(matches!(
            model.prepare(&conflicting),
            Err(WatsonxError::Configuration(_))
        ));
    }

    #[test]
    fn test_response_format_forwarded() {
        let model = model("ibm/granite-13b-chat-v2").bind_response_format(json!({"type": "json_object"}));
        let prepared = model.prepare(&ChatRequest::new(vec![Message::human("Hi")])).unwrap();
        assert_eq!(prepared.params.extra["response_format"]["type"], "json_object");
        assert!(!prepared.uses_tools);
    }

    #[test]
    fn test_chunks_from_delta_tracks_role() {
        let mut role = MessageRole::Assistant;
        let chunks = chunks_from_delta(
            &json!({"results": [{"generated_text": "a", "role": "tool", "tool_call_id": "c1"}]}),
            &mut role,
        )
        .unwrap();
        assert_eq!(chunks[0].role, MessageRole::Tool);
        assert_eq!(role, MessageRole::Tool);

        assert!(matches!(
            chunks_from_delta(&json!({"error": "boom"}), &mut role),
            Err(WatsonxError::Provider(_))
        ));
    }
}
