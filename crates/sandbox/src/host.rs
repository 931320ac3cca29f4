//! Tool host boundary between the interpreter and side effects.

use crate::Value;
use thiserror::Error;

/// Errors that can occur during tool execution.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

/// Declared type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Str,
    /// Accepts ints and floats; ints are widened.
    Float,
    Int,
    Any,
}

impl ParamType {
    pub fn name(self) -> &'static str {
        match self {
            Self::Str => "str",
            Self::Float => "float",
            Self::Int => "int",
            Self::Any => "object",
        }
    }
}

/// A tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: ParamType,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A tool definition exposed to generated code.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub params: Vec<Param>,
    pub returns: String,
    pub description: String,
}

impl ToolSpec {
    pub fn new(name: impl Into<String>, returns: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            returns: returns.into(),
            description: String::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, ty: ParamType) -> Self {
        self.params.push(Param::new(name, ty));
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Render as a Python-style signature, e.g. `f(a: str) -> str`.
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| format!("{}: {}", p.name, p.ty.name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({params}) -> {}", self.name, self.returns)
    }
}

/// A tool call made by generated code, with arguments already type-checked
/// against the tool's [`ToolSpec`].
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub args: Vec<Value>,
}

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// The interpreter resolves no other callable names from the host.
pub trait ToolHost {
    /// Get available tool specifications.
    fn specs(&self) -> &[ToolSpec];

    /// Execute a tool call.
    fn execute(&self, call: &ToolCall) -> Result<Value, ToolError>;

    /// Look up a spec by name.
    fn spec(&self, name: &str) -> Option<&ToolSpec> {
        self.specs().iter().find(|s| s.name == name)
    }
}

/// A tool host with no tools.
///
/// Useful for testing or when tools are not needed.
#[derive(Debug, Default)]
pub struct EmptyToolHost;

impl ToolHost for EmptyToolHost {
    fn specs(&self) -> &[ToolSpec] {
        &[]
    }

    fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        Err(ToolError::NotFound(call.name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_rendering() {
        let spec = ToolSpec::new("get_geo_from_county", "tuple[float, float]")
            .param("county", ParamType::Str)
            .param("state", ParamType::Str);
        assert_eq!(
            spec.signature(),
            "get_geo_from_county(county: str, state: str) -> tuple[float, float]"
        );
    }

    #[test]
    fn empty_host_has_no_tools() {
        let host = EmptyToolHost;
        assert!(host.specs().is_empty());
        assert!(host.spec("anything").is_none());
        let err = host
            .execute(&ToolCall {
                name: "x".into(),
                args: vec![],
            })
            .unwrap_err();
        assert_eq!(err, ToolError::NotFound("x".into()));
    }
}
