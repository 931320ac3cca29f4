//! LLM backend abstraction.
//!
//! A backend turns a system prompt plus messages into generated text. The
//! Anthropic Messages API is one implementation; [`ScriptedBackend`] replays
//! canned responses for tests and offline runs.

mod anthropic;
mod scripted;

pub use anthropic::{
    AnthropicBackend, AnthropicBackendBuilder, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE,
};
pub use scripted::{RecordedRequest, ScriptedBackend};

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// A message in the conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Request to send to an LLM backend.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub system: Option<&'a str>,
}

/// Token usage reported by the backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Response from an LLM backend.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub usage: Usage,
}

/// Trait for LLM backends.
///
/// Calls are blocking and single-shot: no streaming, no retries.
pub trait LlmBackend: Send + Sync {
    /// Send a chat request and get a response.
    fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse>;
}

impl<B: LlmBackend + ?Sized> LlmBackend for &B {
    fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        (**self).chat(request)
    }
}

impl<B: LlmBackend + ?Sized> LlmBackend for Box<B> {
    fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        (**self).chat(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_total_tokens() {
        let usage = Usage {
            input_tokens: 100,
            output_tokens: 50,
        };
        assert_eq!(usage.total_tokens(), 150);
    }

    #[test]
    fn boxed_backends_delegate() {
        let backend: Box<dyn LlmBackend> = Box::new(ScriptedBackend::new(["hello"]));
        let messages = [Message::user("hi")];
        let response = backend
            .chat(ChatRequest {
                messages: &messages,
                system: None,
            })
            .unwrap();
        assert_eq!(response.content, "hello");
    }
}
