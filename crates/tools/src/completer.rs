use sandbox::ToolError;

/// One-shot model completion used by the `call_llm` tool.
///
/// The prompt becomes the system prompt of a fresh, tool-free request.
pub trait Completer {
    fn complete(&self, prompt: &str) -> Result<String, ToolError>;
}

impl<F> Completer for F
where
    F: Fn(&str) -> Result<String, ToolError>,
{
    fn complete(&self, prompt: &str) -> Result<String, ToolError> {
        self(prompt)
    }
}

/// A completer for runs without a model; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoModel;

impl Completer for NoModel {
    fn complete(&self, _prompt: &str) -> Result<String, ToolError> {
        Err(ToolError::Execution(
            "call_llm is unavailable: no model is configured".to_string(),
        ))
    }
}
