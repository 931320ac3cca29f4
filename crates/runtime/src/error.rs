use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A one-shot model call failed; wraps the underlying cause.
    #[error("Error calling LLM with system prompt: {0}")]
    Model(Box<Error>),
}

pub type Result<T> = std::result::Result<T, Error>;
