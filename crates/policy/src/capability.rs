use serde::{Deserialize, Serialize};

/// Capability types that sandboxed code can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    /// Calling a host-provided tool.
    Tool,
    /// Calling an interpreter builtin function.
    Builtin,
    /// Importing a module.
    Import,
}

/// A capability request with optional scope.
#[derive(Debug, Clone)]
pub struct CapabilityRequest {
    pub kind: CapabilityKind,
    pub scope: Option<String>, // tool, builtin or module name
}

impl CapabilityRequest {
    pub fn new(kind: CapabilityKind) -> Self {
        Self { kind, scope: None }
    }

    pub fn with_scope(kind: CapabilityKind, scope: impl Into<String>) -> Self {
        Self {
            kind,
            scope: Some(scope.into()),
        }
    }

    pub fn tool(name: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::Tool, name)
    }

    pub fn builtin(name: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::Builtin, name)
    }

    pub fn import(module: impl Into<String>) -> Self {
        Self::with_scope(CapabilityKind::Import, module)
    }
}
