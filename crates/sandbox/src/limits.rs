use serde::{Deserialize, Serialize};

/// Resource bounds for a single program run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Statements plus loop iterations plus calls.
    pub max_steps: u64,
    pub max_call_depth: usize,
    /// Longest list, tuple or string a program may build.
    pub max_sequence_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: 100_000,
            max_call_depth: 32,
            max_sequence_len: 1_000_000,
        }
    }
}
