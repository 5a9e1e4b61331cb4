//! Streaming message chunks.
//!
//! Providers translate each streamed delta into a [`MessageChunk`]. Chunks are
//! independent: joining content and the indexed [`ToolCallChunk`] fragments
//! is the consumer's job, and [`ChunkBuffer`] is the stock way to do it.

use crate::error::Result;
use crate::messages::{Message, MessageRole};
use crate::tools::{ToolCall, ToolCallChunk};
use futures::stream::Stream;
use serde_json::{Map, Value};
use std::pin::Pin;
use tracing::warn;

/// Stream of message chunks produced by `ChatModel::stream`.
pub type MessageChunkStream = Pin<Box<dyn Stream<Item = Result<MessageChunk>> + Send>>;

/// A partial message received while streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageChunk {
    pub role: MessageRole,
    pub content: String,
    pub id: Option<String>,
    pub name: Option<String>,
    pub tool_call_id: Option<String>,
    pub additional_kwargs: Map<String, Value>,
    pub tool_call_chunks: Vec<ToolCallChunk>,
    /// Provider data such as `finish_reason`.
    pub response_metadata: Map<String, Value>,
}

impl MessageChunk {
    /// Create a chunk with the given role and content.
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            id: None,
            name: None,
            tool_call_id: None,
            additional_kwargs: Map::new(),
            tool_call_chunks: Vec::new(),
            response_metadata: Map::new(),
        }
    }

    /// A single chunk carrying a complete message.
    ///
    /// Tool calls become indexed fragments with serialized arguments, so
    /// [`ChunkBuffer`] rebuilds the same calls.
    pub fn from_message(message: &Message) -> Self {
        Self {
            role: message.role.clone(),
            content: message.content.to_text(),
            id: message.id.clone(),
            name: message.name.clone(),
            tool_call_id: message.tool_call_id.clone(),
            additional_kwargs: message.additional_kwargs.clone(),
            tool_call_chunks: message
                .tool_calls
                .iter()
                .enumerate()
                .map(|(index, call)| ToolCallChunk {
                    name: Some(call.name.clone()),
                    args: Some(call.arguments.to_string()),
                    id: Some(call.id.clone()),
                    index: Some(index),
                })
                .collect(),
            response_metadata: Map::new(),
        }
    }

    /// Set the message ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a response metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.response_metadata.insert(key.into(), value);
        self
    }
}

/// Accumulates chunks of one streamed message.
///
/// Content is concatenated in arrival order. Tool-call fragments are merged
/// by `index`: names and argument strings are appended, the first non-empty
/// id wins. Fragments without an index each start a new call.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    role: Option<MessageRole>,
    id: Option<String>,
    name: Option<String>,
    tool_call_id: Option<String>,
    content: String,
    additional_kwargs: Map<String, Value>,
    tool_calls: Vec<ToolCallChunk>,
    response_metadata: Map<String, Value>,
    chunk_count: usize,
}

impl ChunkBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a chunk to the buffer.
    pub fn add_chunk(&mut self, chunk: &MessageChunk) {
        if self.role.is_none() {
            self.role = Some(chunk.role.clone());
        }
        self.id = self.id.take().or_else(|| chunk.id.clone());
        self.name = self.name.take().or_else(|| chunk.name.clone());
        self.tool_call_id = self.tool_call_id.take().or_else(|| chunk.tool_call_id.clone());
        self.content.push_str(&chunk.content);
        for (key, value) in &chunk.additional_kwargs {
            self.additional_kwargs.insert(key.clone(), value.clone());
        }
        for (key, value) in &chunk.response_metadata {
            self.response_metadata.insert(key.clone(), value.clone());
        }
        for fragment in &chunk.tool_call_chunks {
            self.merge_tool_call(fragment);
        }
        self.chunk_count += 1;
    }

    fn merge_tool_call(&mut self, fragment: &ToolCallChunk) {
        let existing = fragment.index.and_then(|index| {
            self.tool_calls
                .iter_mut()
                .find(|call| call.index == Some(index))
        });

        match existing {
            Some(call) => {
                if let Some(name) = &fragment.name {
                    call.name.get_or_insert_with(String::new).push_str(name);
                }
                if let Some(args) = &fragment.args {
                    call.args.get_or_insert_with(String::new).push_str(args);
                }
                if call.id.is_none() {
                    call.id = fragment.id.clone();
                }
            }
            None => self.tool_calls.push(fragment.clone()),
        }
    }

    /// Accumulated content so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Number of chunks received.
    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    /// Merged tool-call fragments so far.
    pub fn tool_call_chunks(&self) -> &[ToolCallChunk] {
        &self.tool_calls
    }

    /// Provider metadata merged across chunks (later chunks win).
    pub fn response_metadata(&self) -> &Map<String, Value> {
        &self.response_metadata
    }

    /// Finish the stream and build the complete message.
    ///
    /// Merged fragments whose arguments do not parse as JSON are dropped.
    pub fn into_message(self) -> Message {
        let mut tool_calls = Vec::with_capacity(self.tool_calls.len());
        for fragment in self.tool_calls {
            let raw_args = fragment.args.unwrap_or_default();
            let arguments = if raw_args.trim().is_empty() {
                Value::Object(Map::new())
            } else {
                match serde_json::from_str(&raw_args) {
                    Ok(value) => value,
                    Err(e) => {
                        warn!("Dropping streamed tool call with invalid arguments: {}", e);
                        continue;
                    }
                }
            };
            tool_calls.push(ToolCall::new(
                fragment.id.unwrap_or_default(),
                fragment.name.unwrap_or_default(),
                arguments,
            ));
        }

        let mut message = Message::new(self.role.unwrap_or(MessageRole::Assistant), self.content)
            .with_tool_calls(tool_calls);
        if self.id.is_some() {
            message.id = self.id;
        }
        message.name = self.name;
        message.tool_call_id = self.tool_call_id;
        message.additional_kwargs = self.additional_kwargs;
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fragment(index: usize, name: Option<&str>, args: &str, id: Option<&str>) -> ToolCallChunk {
        ToolCallChunk {
            name: name.map(String::from),
            args: Some(args.to_string()),
            id: id.map(String::from),
            index: Some(index),
        }
    }

    #[test]
    fn test_content_accumulation() {
        let mut buffer = ChunkBuffer::new();
        buffer.add_chunk(&MessageChunk::new(MessageRole::Assistant, "Hello"));
        buffer.add_chunk(&MessageChunk::new(MessageRole::Assistant, " "));
        buffer.add_chunk(
            &MessageChunk::new(MessageRole::Assistant, "world")
                .with_metadata("finish_reason", json!("eos_token")),
        );

        assert_eq!(buffer.content(), "Hello world");
        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.response_metadata()["finish_reason"], "eos_token");

        let message = buffer.into_message();
        assert_eq!(message.role, MessageRole::Assistant);
        assert_eq!(message.text(), Some("Hello world"));
        assert!(message.tool_calls.is_empty());
    }

    #[test]
    fn test_tool_call_fragments_merge_by_index() {
        let mut first = MessageChunk::new(MessageRole::Assistant, "");
        first.tool_call_chunks = vec![fragment(0, Some("search"), "{\"query\": ", Some("call_1"))];
        let mut second = MessageChunk::new(MessageRole::Assistant, "");
        second.tool_call_chunks = vec![fragment(0, None, "\"rust\"}", None)];
        let mut third = MessageChunk::new(MessageRole::Assistant, "");
        third.tool_call_chunks = vec![fragment(1, Some("noop"), "", Some("call_2"))];

        let mut buffer = ChunkBuffer::new();
        for chunk in [&first, &second, &third] {
            buffer.add_chunk(chunk);
        }
        assert_eq!(buffer.tool_call_chunks().len(), 2);

        let message = buffer.into_message();
        assert_eq!(message.tool_calls.len(), 2);
        assert_eq!(message.tool_calls[0].id, "call_1");
        assert_eq!(message.tool_calls[0].arguments, json!({"query": "rust"}));
        assert_eq!(message.tool_calls[1].arguments, json!({}));
    }

    #[test]
    fn test_invalid_arguments_dropped() {
        let mut chunk = MessageChunk::new(MessageRole::Assistant, "");
        chunk.tool_call_chunks = vec![fragment(0, Some("search"), "{\"query\": ", None)];

        let mut buffer = ChunkBuffer::new();
        buffer.add_chunk(&chunk);
        assert!(buffer.into_message().tool_calls.is_empty());
    }

    #[test]
    fn test_from_message_round_trips_through_buffer() {
        let message = Message::ai("").with_tool_calls(vec![
            ToolCall::new("call_1", "search", json!({"query": "rust"})),
            ToolCall::new("call_2", "noop", json!({})),
        ]);
        let chunk = MessageChunk::from_message(&message);
        assert_eq!(chunk.tool_call_chunks[1].index, Some(1));

        let mut buffer = ChunkBuffer::new();
        buffer.add_chunk(&chunk);
        let rebuilt = buffer.into_message();
        assert_eq!(rebuilt.tool_calls, message.tool_calls);
        assert_eq!(rebuilt.content.to_text(), "");
    }

    #[test]
    fn test_first_role_wins() {
        let mut buffer = ChunkBuffer::new();
        buffer.add_chunk(&MessageChunk::new(MessageRole::Tool, "a").with_id("msg_1"));
        buffer.add_chunk(&MessageChunk::new(MessageRole::Assistant, "b"));
        let message = buffer.into_message();
        assert_eq!(message.role, MessageRole::Tool);
        assert_eq!(message.id.as_deref(), Some("msg_1"));
    }
}
