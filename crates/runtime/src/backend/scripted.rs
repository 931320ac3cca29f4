//! Backend that replays canned responses.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{ChatRequest, ChatResponse, LlmBackend, Message, Usage};
use crate::{Error, Result};

/// A request as seen by [`ScriptedBackend`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
}

/// Returns queued responses in order and records every request.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().map(Into::into).collect()),
            requests: Mutex::default(),
        }
    }

    /// Queue another response.
    pub fn push(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response.into());
    }

    /// Requests received so far, oldest first.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn remaining(&self) -> usize {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl std::fmt::Display for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "scripted({} queued)", self.remaining())
    }
}

impl LlmBackend for ScriptedBackend {
    fn chat(&self, request: ChatRequest<'_>) -> Result<ChatResponse> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedRequest {
                system: request.system.map(str::to_string),
                messages: request.messages.to_vec(),
            });
        let content = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .ok_or_else(|| Error::Api("no scripted response left".to_string()))?;
        Ok(ChatResponse {
            content,
            usage: Usage::default(),
        })
    }
}
