//! Turn raw model text into program text.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:python3?|py)?\n?").ok());

const LABELS: [&str; 4] = ["python", "python3", ">>> python", "$ python"];

/// Strip markdown fences and stray language labels.
pub fn clean(raw: &str) -> String {
    let code = match FENCE.as_ref() {
        Some(fence) => fence.replace_all(raw, ""),
        None => Cow::Borrowed(raw),
    };
    code.split('\n')
        .filter(|line| !LABELS.contains(&line.trim().to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join("\n")
}
