//! Common test utilities: a scripted inference client and model builders.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use watsonx_chat::{
    ChatWatsonx, GenerationParams, ModelInference, ResponseStream, WatsonxConfig, WatsonxError,
};

pub const TOOL_MODEL: &str = "meta-llama/llama-3-1-70b-instruct";
pub const GRANITE: &str = "ibm/granite-13b-chat-v2";

/// One recorded client call.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub params: GenerationParams,
    pub streamed: bool,
}

/// Inference client that replays scripted responses and records every call.
#[derive(Default)]
pub struct ScriptedInference {
    responses: Mutex<VecDeque<Value>>,
    stream_deltas: Mutex<Vec<Value>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedInference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_response(response: Value) -> Arc<Self> {
        let inference = Self::default();
        inference.responses.lock().unwrap().push_back(response);
        Arc::new(inference)
    }

    /// Respond with one result holding `text`.
    pub fn with_text(text: &str) -> Arc<Self> {
        Self::with_response(json!({
            "results": [{
                "generated_text": text,
                "generated_token_count": 5,
                "input_token_count": 12,
                "stop_reason": "eos_token"
            }]
        }))
    }

    pub fn with_stream(deltas: Vec<Value>) -> Arc<Self> {
        let inference = Self::default();
        *inference.stream_deltas.lock().unwrap() = deltas;
        Arc::new(inference)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, prompt: &str, params: &GenerationParams, streamed: bool) {
        self.calls.lock().unwrap().push(RecordedCall {
            prompt: prompt.to_string(),
            params: params.clone(),
            streamed,
        });
    }
}

#[async_trait]
impl ModelInference for ScriptedInference {
    async fn generate(&self, prompt: &str, params: &GenerationParams) -> watsonx_chat::Result<Value> {
        self.record(prompt, params, false);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| WatsonxError::Provider("no scripted response left".to_string()))
    }

    async fn generate_stream(
        &self,
        prompt: &str,
        params: &GenerationParams,
    ) -> watsonx_chat::Result<ResponseStream> {
        self.record(prompt, params, true);
        let deltas: Vec<watsonx_chat::Result<Value>> = self
            .stream_deltas
            .lock()
            .unwrap()
            .drain(..)
            .map(Ok)
            .collect();
        Ok(Box::pin(futures::stream::iter(deltas)))
    }
}

/// Cloud configuration with an explicit api key.
pub fn cloud_config(model_id: &str) -> WatsonxConfig {
    WatsonxConfig::new(model_id)
        .with_url("https://us-south.ml.cloud.ibm.com")
        .with_apikey("test-key")
        .with_project_id("test-project")
}

pub fn model(model_id: &str, inference: Arc<ScriptedInference>) -> ChatWatsonx {
    model_with_config(cloud_config(model_id), inference)
}

pub fn model_with_config(config: WatsonxConfig, inference: Arc<ScriptedInference>) -> ChatWatsonx {
    let env: HashMap<String, String> = HashMap::new();
    ChatWatsonx::with_env(config, inference, &env).unwrap()
}
