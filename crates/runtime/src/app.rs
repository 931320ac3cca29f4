//! Question answering: prompt the model for code, then run it.

use std::path::PathBuf;

use policy::Policy;
use sandbox::{Executor, Limits, ToolError};
use tools::{Completer, Location, WeatherTools};
use tracing::{debug, info};

use crate::backend::{ChatRequest, LlmBackend, Message};
use crate::interface::read_interface;
use crate::prompt::build_system_prompt;
use crate::sanitize::clean;
use crate::{Error, Result};

/// User message sent along with a prompt written by generated code.
pub const DEFAULT_FOLLOW_UP: &str = "Provide answer to my request, given the context above.";

/// Builder for [`App`].
pub struct AppBuilder<B> {
    backend: B,
    interface_file: PathBuf,
    policy: Policy,
    limits: Limits,
    seed: Option<u64>,
    location: Option<Location>,
}

impl<B: LlmBackend> AppBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            interface_file: PathBuf::from(tools::DEFAULT_INTERFACE_FILE),
            policy: Policy::standard(),
            limits: Limits::default(),
            seed: None,
            location: None,
        }
    }

    /// Interface file shown to the model.
    pub fn interface_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.interface_file = path.into();
        self
    }

    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Seed the mock weather data so runs repeat.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Override the mock user location.
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Read the interface file and build the system prompt.
    pub fn build(self) -> App<B> {
        let interface = read_interface(&self.interface_file);
        let system_prompt = build_system_prompt(&interface);
        debug!(
            interface_file = %self.interface_file.display(),
            prompt_len = system_prompt.len(),
            "built system prompt"
        );
        App {
            backend: self.backend,
            system_prompt,
            policy: self.policy,
            limits: self.limits,
            seed: self.seed,
            location: self.location,
        }
    }
}

/// Answers questions by asking the model for a program and running it
/// in the sandbox with the weather tools.
pub struct App<B> {
    backend: B,
    system_prompt: String,
    policy: Policy,
    limits: Limits,
    seed: Option<u64>,
    location: Option<Location>,
}

impl<B: LlmBackend> App<B> {
    pub fn builder(backend: B) -> AppBuilder<B> {
        AppBuilder::new(backend)
    }

    /// Create an app with default settings.
    pub fn new(backend: B) -> Self {
        AppBuilder::new(backend).build()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer a question.
    ///
    /// Only model failures are errors; anything that goes wrong in the
    /// generated code is reported in the returned text.
    pub fn answer(&self, question: &str) -> Result<String> {
        info!(question, "answering question");
        let raw = self.answer_with_prompt(&self.system_prompt, question)?;
        debug!(response = %raw, "model responded");
        let answer = self.execute(&clean(&raw), question);
        info!(answer_len = answer.len(), "answered question");
        Ok(answer)
    }

    /// One model call with `system` as the system prompt and `message` as the
    /// only user message.
    pub fn answer_with_prompt(&self, system: &str, message: &str) -> Result<String> {
        complete(&self.backend, system, message)
    }

    /// Run generated program text with a fresh set of tools.
    pub fn execute(&self, code: &str, question: &str) -> String {
        debug!(code, "executing generated code");
        let mut tools = WeatherTools::new(BackendCompleter {
            backend: &self.backend,
        });
        if let Some(seed) = self.seed {
            tools = tools.with_seed(seed);
        }
        if let Some(location) = &self.location {
            tools = tools.with_location(location.clone());
        }
        Executor::new(tools, self.policy.clone())
            .with_limits(self.limits)
            .execute(code, question)
    }

    /// Clean raw model output and run it without asking the model.
    pub fn run_output(&self, raw: &str, question: &str) -> String {
        self.execute(&clean(raw), question)
    }
}

fn complete<B: LlmBackend + ?Sized>(backend: &B, system: &str, message: &str) -> Result<String> {
    let messages = [Message::user(message)];
    let response = backend
        .chat(ChatRequest {
            messages: &messages,
            system: Some(system),
        })
        .map_err(|e| Error::Model(Box::new(e)))?;
    debug!(
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "model call finished"
    );
    Ok(response.content)
}

/// `call_llm` straight to the backend, without tools or another round of
/// code generation.
struct BackendCompleter<'a, B> {
    backend: &'a B,
}

impl<B: LlmBackend> Completer for BackendCompleter<'_, B> {
    fn complete(&self, prompt: &str) -> std::result::Result<String, ToolError> {
        complete(self.backend, prompt, DEFAULT_FOLLOW_UP)
            .map_err(|e| ToolError::Execution(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use sandbox::MISSING_ENTRY;

    const LOCATION_CODE: &str = "\
```python
def answer_user_question(question: str) -> str:
    county, state = get_user_location()
    return f\"You are in {county}, {state}.\"
```";

    const RAIN_CODE: &str = "\
python
from typing import Tuple

def answer_user_question(question: str) -> str:
    county, state = get_user_location()
    lat, lon = get_geo_from_county(county, state)
    weather = get_local_weather(lat, lon)
    chance = weather.precipitation_chance_percent
    verdict = \"likely\" if chance >= 50 else \"unlikely\"
    return f\"Rain is {verdict} in {county}, {state}: {chance:.0f}% chance of precipitation.\"
";

    const ADVICE_CODE: &str = "\
def answer_user_question(question: str) -> str:
    county, state = get_user_location()
    return call_llm(f\"The user is in {county}, {state}. Question: {question}\")
";

    fn app(responses: &[&str]) -> App<ScriptedBackend> {
        App::builder(ScriptedBackend::new(responses.iter().copied()))
            .seed(42)
            .build()
    }

    #[test]
    fn location_question() {
        let app = app(&[LOCATION_CODE]);
        let answer = app.answer("where am I located?").unwrap();
        assert_eq!(answer, "You are in King County, Washington.");

        let requests = app.backend().requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].system.as_deref(), Some(app.system_prompt()));
        assert_eq!(requests[0].messages, vec![Message::user("where am I located?")]);
    }

    #[test]
    fn rain_question() {
        let app = app(&[RAIN_CODE]);
        let answer = app.answer("is it going to rain today?").unwrap();
        assert!(answer.contains("King County, Washington"), "{answer}");
        assert!(answer.contains('%'), "{answer}");
        assert!(answer.contains("Rain is"), "{answer}");
    }

    #[test]
    fn seeded_answers_repeat() {
        let first = app(&[RAIN_CODE]).answer("rain?").unwrap();
        let second = app(&[RAIN_CODE]).answer("rain?").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn call_llm_reaches_the_backend() {
        let app = app(&[ADVICE_CODE, "Wear a light jacket."]);
        let answer = app.answer("what should I wear today?").unwrap();
        assert_eq!(answer, "Wear a light jacket.");

        let requests = app.backend().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].system.as_deref(),
            Some("The user is in King County, Washington. Question: what should I wear today?")
        );
        assert_eq!(requests[1].messages, vec![Message::user(DEFAULT_FOLLOW_UP)]);
    }

    #[test]
    fn call_llm_failure_can_be_handled_by_the_script() {
        let code = "\
def answer_user_question(question):
    try:
        return call_llm('context')
    except RuntimeError:
        return 'model unavailable'
";
        let app = app(&[code]);
        assert_eq!(app.answer("q").unwrap(), "model unavailable");
    }

    #[test]
    fn model_error_propagates() {
        let app = app(&[]);
        let err = app.answer("anything").unwrap_err();
        assert!(matches!(err, Error::Model(_)));
        assert_eq!(
            err.to_string(),
            "Error calling LLM with system prompt: API error: no scripted response left"
        );
    }

    #[test]
    fn missing_entry_function() {
        let app = app(&["x = 1"]);
        assert_eq!(app.answer("q").unwrap(), MISSING_ENTRY);
    }

    #[test]
    fn broken_code_is_reported_as_text() {
        let app = app(&["def answer_user_question(q):\n    return 1 / 0\n"]);
        let answer = app.answer("q").unwrap();
        assert!(answer.starts_with("Error executing LLM code: "), "{answer}");
    }

    #[test]
    fn missing_interface_file_still_builds_a_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let app = App::builder(ScriptedBackend::default())
            .interface_file(dir.path().join("gone.py"))
            .build();
        assert!(
            app.system_prompt()
                .contains("# Error: Could not find file gone.py")
        );
    }

    #[test]
    fn default_prompt_embeds_the_tools() {
        let app = App::new(ScriptedBackend::default());
        assert!(app.system_prompt().contains("def get_local_weather("));
        assert!(!app.system_prompt().contains("Callable"));
    }

    #[test]
    fn run_output_skips_the_model() {
        let app = app(&[]);
        let answer = app.run_output(LOCATION_CODE, "where am I?");
        assert_eq!(answer, "You are in King County, Washington.");
        assert!(app.backend().requests().is_empty());
    }

    #[test]
    fn location_override() {
        let app = App::builder(ScriptedBackend::default())
            .location(Location::new("Cook County", "Illinois"))
            .build();
        assert_eq!(
            app.run_output(LOCATION_CODE, "q"),
            "You are in Cook County, Illinois."
        );
    }

    #[test]
    fn restrictive_policy_blocks_tools() {
        let app = App::builder(ScriptedBackend::default())
            .policy(Policy::restrictive())
            .build();
        let answer = app.run_output(LOCATION_CODE, "q");
        assert!(answer.starts_with("Error executing LLM code: "), "{answer}");
    }
}
