//! Runs generated programs and reduces every outcome to answer text.

use policy::Policy;
use tracing::{debug, warn};

use crate::host::ToolHost;
use crate::interp::Interpreter;
use crate::limits::Limits;
use crate::parser::parse;
use crate::value::Value;
use crate::{Error, Result};

/// Function the generated program must define.
pub const ENTRY_FUNCTION: &str = "answer_user_question";

/// Result text when the program defines no entry function.
pub const MISSING_ENTRY: &str =
    "Error: No 'answer_user_question' function found in the generated code.";

const FAILURE_PREFIX: &str = "Error executing LLM code: ";

/// Executes toolscript against a tool host under a capability policy.
///
/// Each run gets a fresh interpreter; nothing survives between runs.
pub struct Executor<H> {
    host: H,
    policy: Policy,
    limits: Limits,
}

impl<H: ToolHost> Executor<H> {
    pub fn new(host: H, policy: Policy) -> Self {
        Self {
            host,
            policy,
            limits: Limits::default(),
        }
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Run `code` and call its entry function with `question`.
    ///
    /// Returns `Ok(None)` when the program defines no entry function.
    pub fn run(&self, code: &str, question: &str) -> Result<Option<String>> {
        let program = parse(code)?;
        let mut interp = Interpreter::new(&self.host, &self.policy, self.limits);
        interp.run(&program)?;

        let Some(entry) = interp.global(ENTRY_FUNCTION).cloned() else {
            return Ok(None);
        };
        let answer = interp.call_value(&entry, vec![Value::from(question)], Vec::new());
        debug!(
            steps = interp.steps(),
            printed = interp.output().len(),
            "script finished"
        );
        Ok(Some(answer?.to_string()))
    }

    /// Run `code` and return the answer, or a description of what went wrong.
    pub fn execute(&self, code: &str, question: &str) -> String {
        match self.run(code, question) {
            Ok(Some(answer)) => answer,
            Ok(None) => {
                warn!("generated code has no {ENTRY_FUNCTION} function");
                MISSING_ENTRY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "generated code failed");
                format!("{FAILURE_PREFIX}{}", describe(&e))
            }
        }
    }
}

fn describe(error: &Error) -> String {
    match error {
        Error::Runtime { line, .. } if *line > 0 => format!("{error} (line {line})"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{EmptyToolHost, ParamType, ToolCall, ToolError, ToolSpec};

    fn executor() -> Executor<EmptyToolHost> {
        Executor::new(EmptyToolHost, Policy::standard())
    }

    #[test]
    fn calls_entry_function_with_question() {
        let code = "\
def answer_user_question(question: str) -> str:
    return 'You asked: ' + question
";
        assert_eq!(
            executor().execute(code, "is it cold?"),
            "You asked: is it cold?"
        );
    }

    #[test]
    fn non_string_results_are_stringified() {
        let code = "def answer_user_question(q):\n    return 42\n";
        assert_eq!(executor().execute(code, "x"), "42");
        let code = "def answer_user_question(q):\n    pass\n";
        assert_eq!(executor().execute(code, "x"), "None");
    }

    #[test]
    fn missing_entry_function() {
        assert_eq!(executor().execute("x = 1\n", "q"), MISSING_ENTRY);
        assert_eq!(executor().execute("", "q"), MISSING_ENTRY);
    }

    #[test]
    fn syntax_errors_become_text() {
        let out = executor().execute("def answer_user_question(q)\n    return q\n", "q");
        assert!(out.starts_with("Error executing LLM code: invalid syntax (line 1"), "{out}");
    }

    #[test]
    fn unsupported_constructs_become_text() {
        let code = "import os\nclass Foo:\n    pass\n";
        let out = executor().execute(code, "q");
        assert_eq!(
            out,
            "Error executing LLM code: unsupported construct 'class' (line 2)"
        );
    }

    #[test]
    fn runtime_errors_carry_line() {
        let code = "\
def answer_user_question(q):
    data = {}
    return data['temperature']
";
        assert_eq!(
            executor().execute(code, "q"),
            "Error executing LLM code: KeyError: 'temperature' (line 3)"
        );
    }

    #[test]
    fn denied_imports_become_text() {
        let code = "import subprocess\ndef answer_user_question(q):\n    return q\n";
        let out = executor().execute(code, "q");
        assert!(out.starts_with("Error executing LLM code: capability denied"), "{out}");
    }

    #[test]
    fn limits_apply() {
        let code = "def answer_user_question(q):\n    while True:\n        pass\n";
        let exec = executor().with_limits(Limits {
            max_steps: 1_000,
            ..Limits::default()
        });
        assert_eq!(
            exec.execute(code, "q"),
            "Error executing LLM code: execution step limit of 1000 exceeded"
        );
    }

    #[test]
    fn runs_are_isolated() {
        let exec = executor();
        let first = "counter = 1\ndef answer_user_question(q):\n    return counter\n";
        assert_eq!(exec.execute(first, "q"), "1");
        let second = "def answer_user_question(q):\n    return counter\n";
        assert_eq!(
            exec.execute(second, "q"),
            "Error executing LLM code: NameError: name 'counter' is not defined (line 2)"
        );
    }

    #[test]
    fn deeply_nested_programs_become_text() {
        let brackets = format!(
            "def answer_user_question(q):\n    return {}1{}\n",
            "[".repeat(500),
            "]".repeat(500)
        );
        let unary = format!("def answer_user_question(q):\n    return {}1\n", "-".repeat(50_000));
        let mut blocks = String::from("def answer_user_question(q):\n");
        for depth in 1..=300 {
            blocks.push_str(&format!("{}if q:\n", "    ".repeat(depth)));
        }
        blocks.push_str(&format!("{}return q\n", "    ".repeat(301)));

        for code in [brackets, unary, blocks] {
            let out = executor().execute(&code, "q");
            assert!(out.starts_with("Error executing LLM code: invalid syntax"), "{out}");
        }
    }

    #[test]
    fn main_guard_does_not_run() {
        let code = "\
def answer_user_question(q):
    return 'answered'

if __name__ == '__main__':
    print(answer_user_question(input()))
";
        assert_eq!(executor().execute(code, "q"), "answered");
    }

    #[test]
    fn nested_helpers_share_the_entry_scope() {
        let code = "\
def answer_user_question(question):
    county, state = 'King County', 'Washington'

    def place():
        return f'{county}, {state}'

    def sentence(temp):
        return f'It is {temp}F in {place()}.'

    return sentence(61)
";
        assert_eq!(
            executor().execute(code, "q"),
            "It is 61F in King County, Washington."
        );
    }

    struct Echo {
        specs: Vec<ToolSpec>,
    }

    impl ToolHost for Echo {
        fn specs(&self) -> &[ToolSpec] {
            &self.specs
        }

        fn execute(&self, call: &ToolCall) -> std::result::Result<Value, ToolError> {
            Ok(call.args[0].clone())
        }
    }

    #[test]
    fn tools_resolve_only_from_host() {
        let host = Echo {
            specs: vec![ToolSpec::new("echo", "str").param("text", ParamType::Str)],
        };
        let exec = Executor::new(host, Policy::standard());
        let code = "def answer_user_question(q):\n    return echo(q.upper())\n";
        assert_eq!(exec.execute(code, "hi"), "HI");
        assert_eq!(exec.host().specs().len(), 1);

        let denied = Executor::new(
            Echo {
                specs: exec.host().specs.clone(),
            },
            Policy::restrictive(),
        );
        assert!(denied.execute(code, "hi").contains("capability denied"));
    }
}
