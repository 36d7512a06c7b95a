//! OpenAI-compatible request serialization and chunk parsing.
//!
//! Providers speaking the chat-completions dialect accept the same body and
//! stream the same `choices[].delta` chunks. Reasoning deltas
//! (`reasoning_content`) are folded into the visible text inside a
//! `<thinking>` block, which downstream extraction skips.

use portal_core::{Message, Role};
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

const THINKING_OPEN: &str = "<thinking>";
const THINKING_CLOSE: &str = "\n</thinking>\n";

/// Convert turns to the OpenAI `messages` array. Every turn is flattened to
/// its text; a default system turn is prepended when the conversation does
/// not start with one.
pub fn messages_to_openai_compat_json(turns: &[Message]) -> Vec<Value> {
    let needs_system = turns.first().map_or(true, |turn| turn.role != Role::System);

    let mut messages = Vec::with_capacity(turns.len() + 1);
    if needs_system {
        messages.push(json!({ "role": "system", "content": DEFAULT_SYSTEM_PROMPT }));
    }
    messages.extend(turns.iter().map(|turn| {
        json!({
            "role": turn.role.as_str(),
            "content": turn.text_content(),
        })
    }));
    messages
}

pub fn build_chat_body(model: &str, turns: &[Message], stream: bool) -> Value {
    json!({
        "model": model,
        "messages": messages_to_openai_compat_json(turns),
        "stream": stream,
    })
}

// --- streaming chunks ---

#[derive(Debug, Deserialize)]
pub struct CompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub index: usize,
    #[serde(default)]
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

/// `finish_reason` reported when the reply hit the token limit.
pub const FINISH_LENGTH: &str = "length";

impl CompletionChunk {
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|choice| &choice.delta)
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|choice| choice.finish_reason.as_deref())
    }
}

// --- non-streamed responses ---

#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct ResponseMessage {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

impl ChatResponse {
    pub fn finish_reason(&self) -> Option<&str> {
        self.choices.first().and_then(|choice| choice.finish_reason.as_deref())
    }

    /// Reply text with any reasoning prepended as a closed thinking block.
    pub fn into_text(self) -> String {
        let Some(choice) = self.choices.into_iter().next() else {
            return String::new();
        };
        let content = choice.message.content.unwrap_or_default();
        match choice.message.reasoning_content {
            Some(reasoning) if !reasoning.is_empty() => {
                format!("{THINKING_OPEN}{reasoning}{THINKING_CLOSE}{content}")
            }
            _ => content,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ThinkingState {
    #[default]
    None,
    Thinking,
    Ended,
}

/// Turns a sequence of deltas into display text, opening a thinking block on
/// the first reasoning delta and closing it when content starts.
#[derive(Debug, Default)]
pub struct ThinkingTagger {
    state: ThinkingState,
}

impl ThinkingTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: &ChunkDelta) -> String {
        if let Some(content) = delta.content.as_deref().filter(|c| !c.is_empty()) {
            if self.state == ThinkingState::Thinking {
                self.state = ThinkingState::Ended;
                return format!("{THINKING_CLOSE}{content}");
            }
            return content.to_string();
        }

        if let Some(reasoning) = delta.reasoning_content.as_deref().filter(|r| !r.is_empty()) {
            if self.state == ThinkingState::None {
                self.state = ThinkingState::Thinking;
                return format!("{THINKING_OPEN}{reasoning}");
            }
            return reasoning.to_string();
        }

        String::new()
    }

    /// Closing marker for a stream that ended while still thinking.
    pub fn finish(&mut self) -> Option<&'static str> {
        if self.state == ThinkingState::Thinking {
            self.state = ThinkingState::Ended;
            Some(THINKING_CLOSE)
        } else {
            None
        }
    }
}
