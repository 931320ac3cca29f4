//! Tool interface extraction.
//!
//! The interface file is a Python-style stub module. Everything after the
//! marker line (a docstring mentioning `INTERFACE`) is shown to the model.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

fn is_marker(line: &str) -> bool {
    line.to_ascii_uppercase().contains("INTERFACE") && (line.contains("\"\"\"") || line.contains("'''"))
}

/// Return the text after the first marker line, or the whole source when
/// there is none.
pub fn extract_interface(source: &str) -> String {
    let mut offset = 0;
    for line in source.split_inclusive('\n') {
        offset += line.len();
        if is_marker(line) {
            return source[offset..].to_string();
        }
    }
    source.to_string()
}

/// Read an interface file and extract the part shown to the model.
///
/// Never fails: read errors become a `# Error ...` comment line so the
/// prompt can still be built.
pub fn read_interface(path: impl AsRef<Path>) -> String {
    let path = path.as_ref();
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    match std::fs::read_to_string(path) {
        Ok(source) => {
            debug!(path = %path.display(), "read interface file");
            extract_interface(&source)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!(path = %path.display(), "interface file not found");
            format!("# Error: Could not find file {name}")
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read interface file");
            format!("# Error reading file {name}: {e}")
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn takes_text_after_marker() {
        let source = "from typing import Callable\n\n\"\"\"INTERFACE DEFINITIONS\"\"\"\ndef f() -> int:\n    ...\n";
        assert_eq!(extract_interface(source), "def f() -> int:\n    ...\n");
    }

    #[test]
    fn marker_accepts_single_quotes_and_any_case() {
        let source = "import os\n'''tool interface'''\r\nx = 1\r\n";
        assert_eq!(extract_interface(source), "x = 1\r\n");
    }

    #[test]
    fn first_marker_wins() {
        let source = "\"\"\"INTERFACE\"\"\"\na\n\"\"\"INTERFACE\"\"\"\nb\n";
        assert_eq!(extract_interface(source), "a\n\"\"\"INTERFACE\"\"\"\nb\n");
    }

    #[test]
    fn marker_needs_a_triple_quote() {
        let source = "# INTERFACE\nimport typing\n";
        assert_eq!(extract_interface(source), source);
    }

    #[test]
    fn no_marker_returns_everything() {
        let source = "import typing\ndef f(): ...";
        assert_eq!(extract_interface(source), source);
    }

    #[test]
    fn marker_on_last_line() {
        assert_eq!(extract_interface("x\n\"\"\"INTERFACE\"\"\""), "");
    }

    #[test]
    fn reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "import typing\n\"\"\"INTERFACE\"\"\"\ndef g(): ...\n").unwrap();
        assert_eq!(read_interface(file.path()), "def g(): ...\n");
    }

    #[test]
    fn missing_file_is_a_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let text = read_interface(dir.path().join("nope.py"));
        assert_eq!(text, "# Error: Could not find file nope.py");
    }

    #[test]
    fn unreadable_file_is_a_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let name = dir
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        let text = read_interface(dir.path());
        assert!(text.starts_with(&format!("# Error reading file {name}: ")), "{text}");
    }

    #[test]
    fn shipped_interface_lists_tools() {
        let text = read_interface(tools::DEFAULT_INTERFACE_FILE);
        for name in ["get_user_location", "get_geo_from_county", "get_local_weather", "call_llm"] {
            assert!(text.contains(name), "{name} missing");
        }
        assert!(!text.contains("INTERFACE DEFINITIONS"));
    }
}
