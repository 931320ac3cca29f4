//! Codecall runtime: model backends and the question-answering pipeline.
//!
//! The model is asked to write an `answer_user_question` function against the
//! weather tool interface. Its reply is cleaned of markdown and run in the
//! sandbox, and the function's return value is the answer.
//!
//! # Overview
//!
//! - **LlmBackend**: a blocking chat-completion trait, implemented for the
//!   Anthropic Messages API and by [`ScriptedBackend`] for canned replies.
//! - **interface / prompt**: extract the tool stubs from the interface file
//!   and wrap them in the system prompt.
//! - **sanitize**: strip code fences and language labels from model output.
//! - **App**: ties the pieces together.
//!
//! # Example
//!
//! ```no_run
//! use runtime::{AnthropicBackend, App, DEFAULT_MODEL};
//!
//! # fn example() -> runtime::Result<()> {
//! let backend = AnthropicBackend::builder("sk-ant-api03-...", DEFAULT_MODEL).build()?;
//! let app = App::new(backend);
//! let answer = app.answer("is it going to rain today?")?;
//! println!("Answer: {answer}");
//! # Ok(())
//! # }
//! ```

mod app;
mod backend;
mod error;
pub mod interface;
pub mod prompt;
pub mod sanitize;

pub use app::{App, AppBuilder, DEFAULT_FOLLOW_UP};

pub use backend::{
    AnthropicBackend, AnthropicBackendBuilder, ChatRequest, ChatResponse, DEFAULT_BASE_URL,
    DEFAULT_MAX_TOKENS, DEFAULT_MODEL, DEFAULT_TEMPERATURE, LlmBackend, Message, RecordedRequest,
    Role, ScriptedBackend, Usage,
};

pub use error::{Error, Result};
