//! Text generation parameters.
//!
//! Field names match the service's parameter names, so a `GenerationParams`
//! serializes straight into the request body. Parameters without a typed
//! field go into `extra`.

use crate::error::{Result, WatsonxError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecodingMethod {
    Greedy,
    Sample,
}

/// Generation parameters for one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decoding_method: Option<DecodingMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_new_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    /// Any other service parameter, passed through untouched.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl GenerationParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read parameters from a free-form map (as carried by a chat request).
    pub fn from_map(map: &Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map.clone())).map_err(|e| {
            WatsonxError::InvalidArgument(format!("invalid generation parameters: {}", e))
        })
    }

    /// Serialize into a JSON map.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_map().is_empty()
    }

    /// Layer `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(&self, overrides: &GenerationParams) -> GenerationParams {
        let mut extra = self.extra.clone();
        extra.extend(overrides.extra.clone());
        GenerationParams {
            decoding_method: overrides.decoding_method.or(self.decoding_method),
            max_new_tokens: overrides.max_new_tokens.or(self.max_new_tokens),
            min_new_tokens: overrides.min_new_tokens.or(self.min_new_tokens),
            temperature: overrides.temperature.or(self.temperature),
            top_k: overrides.top_k.or(self.top_k),
            top_p: overrides.top_p.or(self.top_p),
            repetition_penalty: overrides.repetition_penalty.or(self.repetition_penalty),
            random_seed: overrides.random_seed.or(self.random_seed),
            stop_sequences: overrides
                .stop_sequences
                .clone()
                .or_else(|| self.stop_sequences.clone()),
            extra,
        }
    }

    /// Apply positional stop sequences.
    ///
    /// # Errors
    ///
    /// [`WatsonxError::Configuration`] when `stop_sequences` is already set.
    pub fn with_stop(mut self, stop: Option<Vec<String>>) -> Result<Self> {
        if let Some(stop) = stop {
            if self.stop_sequences.is_some() {
                return Err(WatsonxError::Configuration(
                    "`stop_sequences` found in both the input and default params.".to_string(),
                ));
            }
            self.stop_sequences = Some(stop);
        }
        Ok(self)
    }

    pub fn with_decoding_method(mut self, method: DecodingMethod) -> Self {
        self.decoding_method = Some(method);
        self
    }

    pub fn with_max_new_tokens(mut self, tokens: u32) -> Self {
        self.max_new_tokens = Some(tokens);
        self
    }

    pub fn with_min_new_tokens(mut self, tokens: u32) -> Self {
        self.min_new_tokens = Some(tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_repetition_penalty(mut self, penalty: f64) -> Self {
        self.repetition_penalty = Some(penalty);
        self
    }

    pub fn with_random_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    pub fn with_stop_sequences(mut self, stop: Vec<String>) -> Self {
        self.stop_sequences = Some(stop);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}
