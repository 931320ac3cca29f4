//! Configuration loading from codecall.toml.

use std::path::{Path, PathBuf};

use policy::Policy;
use runtime::{
    AnthropicBackend, App, DEFAULT_BASE_URL, DEFAULT_MAX_TOKENS, DEFAULT_MODEL,
    DEFAULT_TEMPERATURE, LlmBackend,
};
use sandbox::Limits;
use serde::Deserialize;
use tools::Location;

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "codecall.toml";

pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";
pub const MODEL_VAR: &str = "CODECALL_MODEL";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Backend configuration.
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    /// Interpreter resource limits.
    #[serde(default)]
    pub sandbox: Limits,

    /// Capability rules (allow/deny).
    #[serde(flatten)]
    pub policy: Policy,
}

/// Backend provider configuration.
#[derive(Debug, Deserialize)]
pub struct BackendConfig {
    /// Provider name (only "anthropic" is supported).
    #[serde(default = "default_provider")]
    pub provider: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Anthropic API key; falls back to `ANTHROPIC_API_KEY`.
    pub api_key: Option<String>,

    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_key: None,
            base_url: default_base_url(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_provider() -> String {
    "anthropic".to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

fn default_max_tokens() -> u32 {
    DEFAULT_MAX_TOKENS
}

/// Tool registry configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ToolsConfig {
    /// Interface file shown to the model.
    pub interface_file: Option<PathBuf>,

    /// Seed for the mock weather data.
    pub seed: Option<u64>,

    /// Mock user location.
    pub location: Option<Location>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Load `path` if given, else the default file when it exists, else
    /// built-in defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => Self::load(DEFAULT_CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }

    /// Apply environment overrides: the API key fills in when the file has
    /// none, and the model variable always wins.
    pub fn with_env(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if self.backend.api_key.is_none() {
            self.backend.api_key = var(API_KEY_VAR).filter(|key| !key.is_empty());
        }
        if let Some(model) = var(MODEL_VAR).filter(|model| !model.is_empty()) {
            self.backend.model = model;
        }
        self
    }

    /// Build the configured model backend.
    pub fn backend(&self) -> Result<AnthropicBackend, ConfigError> {
        if self.backend.provider != "anthropic" {
            return Err(ConfigError::UnsupportedProvider(
                self.backend.provider.clone(),
            ));
        }
        let api_key = self
            .backend
            .api_key
            .clone()
            .ok_or(ConfigError::MissingAuth)?;
        AnthropicBackend::builder(api_key, &self.backend.model)
            .base_url(&self.backend.base_url)
            .temperature(self.backend.temperature)
            .max_tokens(self.backend.max_tokens)
            .build()
            .map_err(|e| ConfigError::Backend(e.to_string()))
    }

    /// Build the app around `backend` with the configured tools and sandbox.
    pub fn app<B: LlmBackend>(&self, backend: B) -> App<B> {
        let mut builder = App::builder(backend)
            .policy(self.policy.clone())
            .limits(self.sandbox);
        if let Some(path) = &self.tools.interface_file {
            builder = builder.interface_file(path);
        }
        if let Some(seed) = self.tools.seed {
            builder = builder.seed(seed);
        }
        if let Some(location) = &self.tools.location {
            builder = builder.location(location.clone());
        }
        builder.build()
    }

    pub fn interface_file(&self) -> PathBuf {
        self.tools
            .interface_file
            .clone()
            .unwrap_or_else(|| PathBuf::from(tools::DEFAULT_INTERFACE_FILE))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("authentication not configured: set backend.api_key or {API_KEY_VAR}")]
    MissingAuth,

    #[error("unsupported provider '{0}': only 'anthropic' is available")]
    UnsupportedProvider(String),

    #[error("failed to create backend: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use policy::{CapabilityKind, CapabilityRequest};

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.backend.provider, "anthropic");
        assert_eq!(config.backend.model, "claude-sonnet-4-20250514");
        assert_eq!(config.backend.base_url, "https://api.anthropic.com");
        assert_eq!(config.backend.temperature, 0.7);
        assert_eq!(config.backend.max_tokens, 1000);
        assert_eq!(config.sandbox, Limits::default());
        assert!(config.tools.seed.is_none());
        assert_eq!(config.policy.allow.imports, vec!["typing".to_string()]);
    }

    #[test]
    fn parses_every_section() {
        let config = Config::parse(
            r#"
[backend]
model = "claude-test"
api_key = "sk-file"
base_url = "https://gateway.example"
temperature = 0.2
max_tokens = 500

[tools]
interface_file = "custom.py"
seed = 7
location = { county = "Cook County", state = "Illinois" }

[sandbox]
max_steps = 500

[allow]
tools = ["get_user_location"]

[deny]
all = ["import"]
builtins = ["print"]
"#,
        )
        .unwrap();
        assert_eq!(config.backend.model, "claude-test");
        assert_eq!(config.backend.max_tokens, 500);
        assert_eq!(config.tools.interface_file, Some(PathBuf::from("custom.py")));
        assert_eq!(config.tools.seed, Some(7));
        assert_eq!(
            config.tools.location,
            Some(Location::new("Cook County", "Illinois"))
        );
        assert_eq!(config.sandbox.max_steps, 500);
        assert_eq!(config.sandbox.max_call_depth, 32);
        assert!(config.policy.deny.all.contains(&CapabilityKind::Import));
        assert!(
            config
                .policy
                .check(&CapabilityRequest::tool("get_user_location"))
                .is_allowed()
        );
        assert!(
            !config
                .policy
                .check(&CapabilityRequest::tool("call_llm"))
                .is_allowed()
        );
        assert!(
            !config
                .policy
                .check(&CapabilityRequest::builtin("print"))
                .is_allowed()
        );
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        let err = Config::parse("[backend\nmodel = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_a_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[tools]\nseed = 3").unwrap();
        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.tools.seed, Some(3));
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(Some(dir.path().join("absent.toml").as_path())).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn env_fills_in_key_and_overrides_model() {
        let env = |name: &str| match name {
            API_KEY_VAR => Some("sk-env".to_string()),
            MODEL_VAR => Some("claude-env".to_string()),
            _ => None,
        };
        let config = Config::default().with_env(env);
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-env"));
        assert_eq!(config.backend.model, "claude-env");

        let config = Config::parse("[backend]\napi_key = \"sk-file\"")
            .unwrap()
            .with_env(env);
        assert_eq!(config.backend.api_key.as_deref(), Some("sk-file"));
    }

    #[test]
    fn backend_requires_a_key() {
        let config = Config::default().with_env(no_env);
        assert!(matches!(config.backend(), Err(ConfigError::MissingAuth)));

        let config = Config::parse("[backend]\napi_key = \"sk\"").unwrap();
        assert_eq!(
            config.backend().unwrap().to_string(),
            "anthropic(claude-sonnet-4-20250514)"
        );
    }

    #[test]
    fn backend_rejects_other_providers() {
        let config = Config::parse("[backend]\nprovider = \"bedrock\"\napi_key = \"k\"").unwrap();
        assert!(matches!(
            config.backend(),
            Err(ConfigError::UnsupportedProvider(p)) if p == "bedrock"
        ));
    }

    #[test]
    fn app_uses_configured_interface() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tools.py");
        std::fs::write(&path, "import typing\n\"\"\"INTERFACE\"\"\"\ndef only_tool() -> str: ...\n")
            .unwrap();
        let config = Config {
            tools: ToolsConfig {
                interface_file: Some(path.clone()),
                ..ToolsConfig::default()
            },
            ..Config::default()
        };
        assert_eq!(config.interface_file(), path);
        let app = config.app(runtime::ScriptedBackend::default());
        assert!(app.system_prompt().contains("def only_tool() -> str: ..."));
        assert!(!app.system_prompt().contains("import typing"));
    }
}
