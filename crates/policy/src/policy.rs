//! Policy configuration and enforcement.

use crate::{CapabilityKind, CapabilityRequest, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Policy configuration loaded from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Capabilities that are explicitly allowed.
    #[serde(default)]
    pub allow: AllowRules,

    /// Capabilities that are explicitly denied (overrides allow).
    #[serde(default)]
    pub deny: DenyRules,
}

/// Rules for allowed capabilities.
///
/// Entries are exact names or `"*"` for any name of that kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowRules {
    /// Allowed tool names.
    #[serde(default = "wildcard")]
    pub tools: Vec<String>,

    /// Allowed builtin function names.
    #[serde(default = "wildcard")]
    pub builtins: Vec<String>,

    /// Allowed module imports.
    #[serde(default = "default_imports")]
    pub imports: Vec<String>,
}

impl Default for AllowRules {
    fn default() -> Self {
        Self {
            tools: wildcard(),
            builtins: wildcard(),
            imports: default_imports(),
        }
    }
}

fn wildcard() -> Vec<String> {
    vec!["*".to_string()]
}

fn default_imports() -> Vec<String> {
    vec!["typing".to_string()]
}

/// Rules for denied capabilities.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DenyRules {
    /// Deny all capabilities of these kinds.
    #[serde(default)]
    pub all: HashSet<CapabilityKind>,

    /// Denied tool names.
    #[serde(default)]
    pub tools: Vec<String>,

    /// Denied builtin names.
    #[serde(default)]
    pub builtins: Vec<String>,
}

/// Result of a capability check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

impl Policy {
    /// Load policy from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse policy from TOML string.
    pub fn parse(toml: &str) -> Result<Self> {
        toml::from_str(toml).map_err(|e| Error::Parse(e.to_string()))
    }

    /// Every declared tool and builtin, and `typing` imports.
    pub fn standard() -> Self {
        Self::default()
    }

    /// Builtins only: no tool calls and no imports.
    pub fn restrictive() -> Self {
        let mut deny_all = HashSet::new();
        deny_all.insert(CapabilityKind::Tool);
        deny_all.insert(CapabilityKind::Import);

        Self {
            allow: AllowRules {
                tools: Vec::new(),
                imports: Vec::new(),
                ..Default::default()
            },
            deny: DenyRules {
                all: deny_all,
                ..Default::default()
            },
        }
    }

    /// Check if a capability request is allowed.
    pub fn check(&self, request: &CapabilityRequest) -> Decision {
        if self.deny.all.contains(&request.kind) {
            return Decision::Deny {
                reason: format!("{:?} is denied by policy", request.kind),
            };
        }

        let denied: &[String] = match request.kind {
            CapabilityKind::Tool => &self.deny.tools,
            CapabilityKind::Builtin => &self.deny.builtins,
            CapabilityKind::Import => &[],
        };
        if let Some(name) = &request.scope {
            if denied.iter().any(|d| d == name) {
                return Decision::Deny {
                    reason: format!("{:?} '{name}' is denied by policy", request.kind),
                };
            }
        }

        let allowlist = match request.kind {
            CapabilityKind::Tool => &self.allow.tools,
            CapabilityKind::Builtin => &self.allow.builtins,
            CapabilityKind::Import => &self.allow.imports,
        };

        if Self::check_name_allowed(allowlist, &request.scope) {
            Decision::Allow
        } else {
            Decision::Deny {
                reason: format!(
                    "{:?} not in allowlist{}",
                    request.kind,
                    request
                        .scope
                        .as_ref()
                        .map(|s| format!(" (scope: {s})"))
                        .unwrap_or_default()
                ),
            }
        }
    }

    fn check_name_allowed(allowlist: &[String], scope: &Option<String>) -> bool {
        let Some(name) = scope else {
            return !allowlist.is_empty(); // No scope = any name, allow if list non-empty
        };

        allowlist.iter().any(|a| a == "*" || a == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_allows_tools_and_builtins() {
        let policy = Policy::standard();
        assert!(policy.check(&CapabilityRequest::tool("get_user_location")).is_allowed());
        assert!(policy.check(&CapabilityRequest::builtin("round")).is_allowed());
        assert!(policy.check(&CapabilityRequest::import("typing")).is_allowed());
    }

    #[test]
    fn test_standard_denies_other_imports() {
        let policy = Policy::standard();
        assert!(!policy.check(&CapabilityRequest::import("os")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::import("subprocess")).is_allowed());
    }

    #[test]
    fn test_restrictive_denies_tools() {
        let policy = Policy::restrictive();
        let decision = policy.check(&CapabilityRequest::tool("call_llm"));
        assert_eq!(
            decision,
            Decision::Deny {
                reason: "Tool is denied by policy".to_string()
            }
        );
        assert!(policy.check(&CapabilityRequest::builtin("len")).is_allowed());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[allow]
tools = ["get_user_location", "get_local_weather"]
imports = ["typing", "math"]

[deny]
builtins = ["print"]
"#;
        let policy = Policy::parse(toml).unwrap();

        // Allowed
        assert!(policy.check(&CapabilityRequest::tool("get_user_location")).is_allowed());
        assert!(policy.check(&CapabilityRequest::import("math")).is_allowed());
        assert!(policy.check(&CapabilityRequest::builtin("str")).is_allowed());

        // Denied
        assert!(!policy.check(&CapabilityRequest::tool("call_llm")).is_allowed());
        assert!(!policy.check(&CapabilityRequest::builtin("print")).is_allowed());
    }

    #[test]
    fn test_deny_all_kind() {
        let toml = r#"
[deny]
all = ["builtin"]
"#;
        let policy = Policy::parse(toml).unwrap();
        assert!(!policy.check(&CapabilityRequest::builtin("len")).is_allowed());
        assert!(policy.check(&CapabilityRequest::tool("call_llm")).is_allowed());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, b"[allow]\ntools = []\n").unwrap();

        let policy = Policy::load(file.path()).unwrap();
        assert!(!policy.check(&CapabilityRequest::tool("get_user_location")).is_allowed());
    }

    #[test]
    fn test_unscoped_request() {
        let policy = Policy::standard();
        assert!(policy.check(&CapabilityRequest::new(CapabilityKind::Tool)).is_allowed());
        assert!(!Policy::restrictive()
            .check(&CapabilityRequest::new(CapabilityKind::Import))
            .is_allowed());
    }
}
