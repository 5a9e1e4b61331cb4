//! Provider-neutral chat model abstractions.
//!
//! This crate defines the vocabulary every chat provider speaks:
//!
//! - **Messages** - [`Message`], [`MessageRole`], [`MessageContent`]
//! - **Tools** - [`ToolDefinition`], [`ToolCall`], [`ToolCallChunk`], [`ToolChoice`]
//! - **Requests** - [`ChatRequest`] with its per-call [`ChatConfig`]
//! - **Results** - [`ChatResult`], [`Generation`], [`LlmOutput`]
//! - **Streaming** - [`MessageChunk`], [`MessageChunkStream`], [`ChunkBuffer`]
//! - **The trait** - [`ChatModel`], implemented by provider crates
//! - **Output parsers** - [`JsonOutputParser`], [`ToolsOutputParser`]
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_core::{ChatModel, ChatRequest, Message};
//! use std::sync::Arc;
//!
//! async fn ask(model: Arc<dyn ChatModel>) -> chat_core::Result<()> {
//!     let result = model
//!         .generate(ChatRequest::new(vec![Message::human("What is Rust?")]))
//!         .await?;
//!     if let Some(message) = result.message() {
//!         println!("{}", message.content.to_text());
//!     }
//!     Ok(())
//! }
//! ```

pub mod chunk;
pub mod config;
pub mod error;
pub mod messages;
pub mod output_parsers;
pub mod outputs;
pub mod prompt;
pub mod tools;
pub mod traits;

pub use chunk::{ChunkBuffer, MessageChunk, MessageChunkStream};
pub use config::{ChatConfig, ChatRequest};
pub use error::{ChatError, Result};
pub use messages::{Message, MessageContent, MessageRole};
pub use output_parsers::{strip_code_fence, JsonOutputParser, OutputParser, ToolsOutputParser};
pub use outputs::{ChatResult, Generation, LlmOutput, TokenUsage, UsageMetadata};
pub use prompt::{get_buffer_string, AI_PREFIX, HUMAN_PREFIX};
pub use tools::{ToolCall, ToolCallChunk, ToolChoice, ToolDefinition};
pub use traits::ChatModel;
