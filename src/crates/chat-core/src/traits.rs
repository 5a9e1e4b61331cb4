//! Core trait for chat model integrations.
//!
//! The framework is provider-agnostic: it defines [`ChatModel`] and the
//! message/result types, and provider crates implement the trait.
//!
//! ```rust,ignore
//! use chat_core::{ChatModel, ChatRequest, ChatResult, MessageChunkStream, Result};
//! use async_trait::async_trait;
//!
//! #[derive(Clone)]
//! struct MyProvider;
//!
//! #[async_trait]
//! impl ChatModel for MyProvider {
//!     async fn generate(&self, request: ChatRequest) -> Result<ChatResult> {
//!         // 1. Convert messages to the provider format
//!         // 2. Call the provider
//!         // 3. Convert the response back into a ChatResult
//!         todo!()
//!     }
//!
//!     async fn stream(&self, request: ChatRequest) -> Result<MessageChunkStream> {
//!         todo!()
//!     }
//!
//!     fn llm_type(&self) -> &str {
//!         "my-provider"
//!     }
//!
//!     fn clone_box(&self) -> Box<dyn ChatModel> {
//!         Box::new(self.clone())
//!     }
//! }
//! ```

use crate::chunk::MessageChunkStream;
use crate::config::ChatRequest;
use crate::error::{ChatError, Result};
use crate::messages::Message;
use crate::outputs::ChatResult;
use crate::tools::ToolDefinition;
use async_trait::async_trait;

/// Core trait for chat-based language models.
///
/// Implementations must be `Send + Sync`; share them as `Arc<dyn ChatModel>`.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Generate a complete result for the request.
    ///
    /// # Errors
    ///
    /// Implementations return [`ChatError::Configuration`] or
    /// [`ChatError::InvalidArgument`] before contacting the provider when the
    /// request cannot be served, and [`ChatError::Provider`] when the provider
    /// reports a failure.
    async fn generate(&self, request: ChatRequest) -> Result<ChatResult>;

    /// Stream the response as message chunks.
    ///
    /// The stream is forward-only; dropping it stops consumption.
    async fn stream(&self, request: ChatRequest) -> Result<MessageChunkStream>;

    /// Convenience wrapper: generate and return the first message.
    async fn invoke(&self, messages: Vec<Message>) -> Result<Message> {
        self.generate(ChatRequest::new(messages))
            .await?
            .into_message()
            .ok_or_else(|| ChatError::InvalidResponse("model returned no generations".to_string()))
    }

    /// Short identifier of the implementation, used in tracing.
    fn llm_type(&self) -> &str;

    /// Tools bound to this model instance.
    fn bound_tools(&self) -> Vec<ToolDefinition> {
        Vec::new()
    }

    /// Clone this model into a boxed trait object.
    fn clone_box(&self) -> Box<dyn ChatModel>;
}

impl Clone for Box<dyn ChatModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
