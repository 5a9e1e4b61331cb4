//! Emulated tool calling with a canned inference client.
//!
//! Run with `RUST_LOG=debug cargo run -p watsonx-chat --example emulated_tools`
//! to see the prepared prompt sizes and classification decisions.

use anyhow::Context;
use async_trait::async_trait;
use chat_core::{ChatModel, Message, ToolDefinition};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use watsonx_chat::{
    ChatWatsonx, GenerationParams, ModelInference, ResponseStream, WatsonxConfig, WatsonxError,
};

/// Answers with a tool call first, then with plain text.
#[derive(Default)]
struct CannedInference {
    turn: AtomicUsize,
}

#[async_trait]
impl ModelInference for CannedInference {
    async fn generate(&self, prompt: &str, _params: &GenerationParams) -> watsonx_chat::Result<Value> {
        tracing::info!(prompt_chars = prompt.len(), "Canned generate");
        let text = match self.turn.fetch_add(1, Ordering::SeqCst) {
            0 => r#"<|python_tag|><|start_header_id|>assistant<|end_header_id|>{"name": "get_weather", "args": {"query": "Paris"}}"#,
            _ => "It is sunny in Paris, 24 degrees.",
        };
        Ok(json!({
            "results": [{
                "generated_text": text,
                "generated_token_count": 18,
                "input_token_count": prompt.len() / 4,
                "stop_reason": "eos_token"
            }]
        }))
    }

    async fn generate_stream(
        &self,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> watsonx_chat::Result<ResponseStream> {
        Err(WatsonxError::InvalidArgument("streaming is not canned".to_string()))
    }
}

fn get_weather(city: &str) -> String {
    format!("{{\"city\": \"{}\", \"sky\": \"sunny\", \"celsius\": 24}}", city)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let env: HashMap<String, String> = HashMap::new();
    let config = WatsonxConfig::new("meta-llama/llama-3-1-70b-instruct")
        .with_url("https://us-south.ml.cloud.ibm.com")
        .with_apikey("demo-key")
        .with_project_id("demo-project")
        .with_params(GenerationParams::new().with_max_new_tokens(200));

    let weather = ToolDefinition::new("get_weather", "Current weather for a city").with_parameters(json!({
        "type": "object",
        "properties": {"query": {"type": "string", "description": "City name"}},
        "required": ["query"]
    }));

    let model = ChatWatsonx::with_env(config, Arc::new(CannedInference::default()), &env)?
        .bind_tools(vec![weather], None)?;

    let mut history = vec![
        Message::system("You are a concise assistant."),
        Message::human("What's the weather in Paris?"),
    ];

    let reply = model.invoke(history.clone()).await?;
    let call = reply
        .tool_calls
        .first()
        .cloned()
        .context("expected the model to call a tool")?;
    println!("tool call: {} {} (id {})", call.name, call.arguments, call.id);

    let city = call.arguments["query"].as_str().unwrap_or("unknown");
    history.push(reply);
    history.push(Message::tool(get_weather(city), call.id.clone()));

    let answer = model.invoke(history).await?;
    println!("answer: {}", answer.content.to_text());
    if let Some(usage) = answer.usage_metadata {
        println!("tokens: {} in / {} out", usage.input_tokens, usage.output_tokens);
    }
    Ok(())
}
