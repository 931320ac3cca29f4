//! Capability-based policy for sandboxed code.
//!
//! Core principle: **generated code reaches nothing that is not on the allow-list.**
//! The sandbox asks the policy before every tool call, builtin call and import.

mod capability;
mod error;
mod policy;

pub use capability::{CapabilityKind, CapabilityRequest};
pub use error::{Error, Result};
pub use policy::{AllowRules, Decision, DenyRules, Policy};
