//! IBM watsonx.ai chat model for `chat-core`.
//!
//! The watsonx text generation service completes a single prompt string.
//! This crate bridges it to the chat abstraction:
//!
//! - [`codec`] converts messages to and from the service's role dictionaries
//! - [`template`] renders those dictionaries into a model family's prompt format
//! - [`emulator`] offers tool calling by instruction and output classification
//! - [`assembler`] turns raw responses into [`ChatResult`](chat_core::ChatResult)s
//! - [`structured`] parses answers into a schema's type
//!
//! Network transport is not part of this crate: callers provide a
//! [`ModelInference`] client.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use chat_core::{ChatModel, Message, ToolDefinition};
//! use watsonx_chat::{ChatWatsonx, WatsonxConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = WatsonxConfig::new("meta-llama/llama-3-1-70b-instruct")
//!         .with_url("https://us-south.ml.cloud.ibm.com")
//!         .with_project_id("my-project");
//!     let model = ChatWatsonx::new(config, Arc::new(my_client()))?
//!         .bind_tools(vec![ToolDefinition::new("search", "Search the web")], None)?;
//!
//!     let reply = model.invoke(vec![Message::human("What's new in Rust?")]).await?;
//!     for call in &reply.tool_calls {
//!         println!("{} {}", call.name, call.arguments);
//!     }
//!     Ok(())
//! }
//! ```

pub mod assembler;
pub mod codec;
pub mod config;
pub mod emulator;
pub mod error;
pub mod inference;
pub mod model;
pub mod params;
pub mod structured;
pub mod template;

pub use codec::MessageDict;
pub use config::{Credentials, EnvSource, ProcessEnv, Secret, TlsVerify, WatsonxConfig};
pub use emulator::interpret_generated_text;
pub use error::{Result, WatsonxError};
pub use inference::{GenerationResult, ModelInference, ResponseStream};
pub use model::{ChatWatsonx, FunctionCall, LLM_TYPE};
pub use params::{DecodingMethod, GenerationParams};
pub use structured::{Schema, StructuredChatWatsonx, StructuredOutput, StructuredOutputMethod};
