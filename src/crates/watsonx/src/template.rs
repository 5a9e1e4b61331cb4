//! Prompt rendering per model family.
//!
//! Each [`Dialect`] is a table entry: the model ids it serves, prefix and
//! suffix per role, affixes for unlisted roles, and the trailer that opens
//! the assistant turn. Models without a dialect use the generic
//! `"Role: content"` rendering.

use crate::codec::{dict_to_message, MessageDict};
use crate::error::Result;
use chat_core::{get_buffer_string, Message};

/// Text wrapped around one message's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Affixes {
    pub prefix: &'static str,
    pub suffix: &'static str,
}

const fn affixes(prefix: &'static str, suffix: &'static str) -> Affixes {
    Affixes { prefix, suffix }
}

/// Prompt format of one model family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    pub name: &'static str,
    pub model_ids: &'static [&'static str],
    pub roles: &'static [(&'static str, Affixes)],
    /// Affixes for roles missing from `roles`.
    pub default: Affixes,
    pub trailer: &'static str,
}

impl Dialect {
    /// Affixes for a role.
    pub fn affixes(&self, role: &str) -> Affixes {
        self.roles
            .iter()
            .find(|(name, _)| *name == role)
            .map(|(_, affixes)| *affixes)
            .unwrap_or(self.default)
    }

    /// Render messages in order, then the trailer.
    pub fn render(&self, messages: &[MessageDict]) -> String {
        let mut prompt = String::new();
        for message in messages {
            let Affixes { prefix, suffix } = self.affixes(&message.role);
            prompt.push_str(prefix);
            prompt.push_str(&message.content_text());
            prompt.push_str(suffix);
        }
        prompt.push_str(self.trailer);
        prompt
    }
}

/// Known dialects.
pub static DIALECTS: &[Dialect] = &[
    Dialect {
        name: "role-tag",
        model_ids: &["ibm/granite-13b-chat-v1", "ibm/granite-13b-chat-v2"],
        roles: &[
            ("system", affixes("<|system|>\n", "\n\n")),
            ("assistant", affixes("<|assistant|>\n", "\n\n")),
            ("function", affixes("<|function|>\n", "\n\n")),
            ("tool", affixes("<|tool|>\n", "\n\n")),
        ],
        default: affixes("<|user|>:\n", "\n\n"),
        trailer: "<|assistant|>\n",
    },
    Dialect {
        name: "inst-bracket",
        model_ids: &["meta-llama/llama-2-13b-chat", "meta-llama/llama-2-70b-chat"],
        roles: &[
            ("system", affixes("[INST] <<SYS>>\n", "<</SYS>>\n\n")),
            ("assistant", affixes("", "\n[INST]\n\n")),
        ],
        default: affixes("", "\n[/INST]\n"),
        // The user suffix already opens the assistant turn.
        trailer: "",
    },
    Dialect {
        name: "header-token",
        model_ids: &["meta-llama/llama-3-1-70b-instruct"],
        roles: &[
            (
                "system",
                affixes(
                    "<|begin_of_text|><|start_header_id|>system<|end_header_id|>\n ",
                    " <|eot_id|>\n",
                ),
            ),
            (
                "assistant",
                affixes(
                    "<|begin_of_text|><|start_header_id|>assistant<|end_header_id|>\n ",
                    " <|eot_id|>\n",
                ),
            ),
            (
                "tool_call",
                affixes(
                    "<|begin_of_text|><|start_header_id|>tool_call<|end_header_id|>\n ",
                    " <|eot_id|>\n",
                ),
            ),
        ],
        default: affixes(
            "<|begin_of_text|><|start_header_id|>user<|end_header_id|>\n ",
            " <|eot_id|>\n",
        ),
        trailer: "<|assistant|>\n",
    },
];

/// The dialect serving `model_id`, if any.
pub fn dialect_for(model_id: &str) -> Option<&'static Dialect> {
    DIALECTS
        .iter()
        .find(|dialect| dialect.model_ids.contains(&model_id))
}

/// Render `messages` into the literal prompt for `model_id`.
///
/// Unknown models get `"System: ...\nHuman: ...\nAI: "`, the generic
/// rendering followed by an empty assistant turn.
pub fn render(messages: &[MessageDict], model_id: &str) -> Result<String> {
    if let Some(dialect) = dialect_for(model_id) {
        return Ok(dialect.render(messages));
    }
    let mut typed = messages
        .iter()
        .map(dict_to_message)
        .collect::<Result<Vec<_>>>()?;
    typed.push(Message::ai(""));
    Ok(get_buffer_string(&typed))
}
