//! Turns a raw service response into a [`ChatResult`].

use crate::codec::result_to_message;
use crate::error::{Result, WatsonxError};
use crate::inference::GenerationResult;
use chat_core::{ChatResult, Generation, LlmOutput, MessageRole, TokenUsage, UsageMetadata};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

/// Fresh tool call id for one generation.
pub fn new_call_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Fail with [`WatsonxError::Provider`] when the document has a top-level
/// `error` key, whatever its value.
pub fn check_error(raw: &Value) -> Result<()> {
    match raw.get("error") {
        Some(Value::String(message)) => Err(WatsonxError::Provider(message.clone())),
        Some(other) => Err(WatsonxError::Provider(other.to_string())),
        None => Ok(()),
    }
}

/// Assemble every entry of `results` into one generation each.
///
/// Token counts accumulate across entries. Each assistant message carries
/// the running totals up to and including its own entry, so the last
/// generation holds the full usage.
pub fn assemble(raw: &Value, model_id: &str) -> Result<ChatResult> {
    check_error(raw)?;

    let results: Vec<GenerationResult> = match raw.get("results") {
        Some(results) => serde_json::from_value(results.clone())
            .map_err(|e| WatsonxError::InvalidResponse(format!("malformed results: {}", e)))?,
        None => {
            return Err(WatsonxError::InvalidResponse(
                "response has no results".to_string(),
            ))
        }
    };

    let mut generated_tokens = 0;
    let mut input_tokens = 0;
    let mut generations = Vec::with_capacity(results.len());

    for result in &results {
        let mut message = result_to_message(result, &new_call_id());

        generated_tokens += result.generated_token_count.unwrap_or(0);
        input_tokens += result.input_token_count.unwrap_or(0);
        if generated_tokens + input_tokens > 0 && message.role == MessageRole::Assistant {
            message.usage_metadata = Some(UsageMetadata::new(input_tokens, generated_tokens));
        }

        let finish_reason = result
            .stop_reason
            .clone()
            .map(Value::String)
            .unwrap_or(Value::Null);
        generations.push(Generation::new(message).with_info("finish_reason", finish_reason));
    }

    debug!(
        generations = generations.len(),
        generated_tokens, input_tokens, "Assembled chat result"
    );

    Ok(ChatResult {
        generations,
        llm_output: LlmOutput {
            token_usage: TokenUsage {
                generated_token_count: generated_tokens,
                input_token_count: input_tokens,
            },
            model_name: model_id.to_string(),
            system_fingerprint: raw
                .get("system_fingerprint")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
    })
}
