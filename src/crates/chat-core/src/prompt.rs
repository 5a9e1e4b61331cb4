//! Default chat-prompt stringification.
//!
//! Used by providers that only accept a single prompt string and have no
//! model-specific template for the requested model.

use crate::messages::{Message, MessageRole};

/// Prefix used for human messages by [`get_buffer_string`].
pub const HUMAN_PREFIX: &str = "Human";

/// Prefix used for assistant messages by [`get_buffer_string`].
pub const AI_PREFIX: &str = "AI";

/// Render messages as `"<Role>: <content>"` lines joined by newlines.
///
/// ```rust
/// use chat_core::{get_buffer_string, Message};
///
/// let text = get_buffer_string(&[Message::system("Be brief."), Message::human("Hi"), Message::ai("")]);
/// assert_eq!(text, "System: Be brief.\nHuman: Hi\nAI: ");
/// ```
pub fn get_buffer_string(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|message| {
            let prefix = match &message.role {
                MessageRole::Human => HUMAN_PREFIX,
                MessageRole::Assistant => AI_PREFIX,
                MessageRole::System => "System",
                MessageRole::Function => "Function",
                MessageRole::Tool => "Tool",
                MessageRole::Custom(role) => role.as_str(),
            };
            format!("{}: {}", prefix, message.content.to_text())
        })
        .collect::<Vec<_>>()
        .join("\n")
}
