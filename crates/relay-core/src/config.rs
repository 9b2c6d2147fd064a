//! Configuration loading and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Top-level relay configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<EngineConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

/// Remote execution engine endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// URL that accepts the engine input and answers with an SSE event stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Graph/assistant to run, forwarded with the input.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
}

impl EngineConfig {
    /// Resolve the API key: check `api_key` field first, then `api_key_env` environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        resolve_secret_field(&self.api_key, &self.api_key_env)
    }
}

/// Event discriminants and emission defaults for the normalizer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_token_event")]
    pub token_event: String,

    #[serde(default = "default_generation_end_event")]
    pub generation_end_event: String,

    #[serde(default = "default_node_entry_event")]
    pub node_entry_event: String,

    /// Engine bookkeeping nodes that never count as the current node.
    #[serde(default = "default_reserved_nodes")]
    pub reserved_nodes: Vec<String>,

    #[serde(default = "default_true")]
    pub emit_messages: bool,

    #[serde(default = "default_true")]
    pub emit_tool_calls: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            token_event: default_token_event(),
            generation_end_event: default_generation_end_event(),
            node_entry_event: default_node_entry_event(),
            reserved_nodes: default_reserved_nodes(),
            emit_messages: true,
            emit_tool_calls: true,
        }
    }
}

fn default_token_event() -> String {
    "on_chat_model_stream".into()
}

fn default_generation_end_event() -> String {
    "on_chat_model_end".into()
}

fn default_node_entry_event() -> String {
    "on_chain_start".into()
}

fn default_reserved_nodes() -> Vec<String> {
    vec!["__start__".into(), "__end__".into()]
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format: "plain" (default) or "json".
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Log level override (trace/debug/info/warn/error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Per-crate log level overrides (e.g. "relay_stream=debug").
    #[serde(default)]
    pub filters: Vec<String>,

    /// Output target: "stderr" (default) or "stdout".
    #[serde(default = "default_log_output")]
    pub output: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
            level: None,
            filters: Vec::new(),
            output: default_log_output(),
        }
    }
}

fn default_log_format() -> String {
    "plain".into()
}

fn default_log_output() -> String {
    "stderr".into()
}

/// Resolve a secret: check the direct value first, then the env-var reference.
pub fn resolve_secret_field(direct: &Option<String>, env_var: &Option<String>) -> Option<String> {
    if let Some(val) = direct {
        if !val.is_empty() {
            return Some(val.clone());
        }
    }
    if let Some(env) = env_var {
        if let Ok(val) = std::env::var(env) {
            if !val.is_empty() {
                return Some(val);
            }
        }
    }
    None
}

/// Substitute `${ENV_VAR}` patterns in a string with their environment variable values.
fn substitute_env_vars(input: &str) -> crate::error::Result<String> {
    let re = regex::Regex::new(r"\$\{([^}]+)\}")
        .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;
    Ok(re
        .replace_all(input, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned())
}

impl RelayConfig {
    /// Load config from a JSON5 file, substituting `${ENV_VAR}` references.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(crate::error::RelayError::Io)?;

        // Substitute ${ENV_VAR} references before parsing
        let substituted = substitute_env_vars(&raw)?;

        let config: RelayConfig = json5::from_str(&substituted)
            .map_err(|e| crate::error::RelayError::Config(e.to_string()))?;

        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    /// Default config file path.
    pub fn config_path() -> PathBuf {
        data_dir().join("config.json")
    }

    /// Stream settings, falling back to defaults.
    pub fn stream(&self) -> StreamConfig {
        self.stream.clone().unwrap_or_default()
    }

    /// Engine URL, if configured.
    pub fn engine_url(&self) -> Option<&str> {
        self.engine
            .as_ref()
            .and_then(|e| e.url.as_deref())
            .filter(|u| !u.is_empty())
    }

    /// Validate config, returning (warnings, errors).
    ///
    /// `needs_engine` is set for commands that talk to a live engine; only
    /// those are warned about a missing engine URL.
    pub fn validate(&self, needs_engine: bool) -> (Vec<String>, Vec<String>) {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        if needs_engine && self.engine_url().is_none() {
            warnings.push("No engine url configured; only replay is available".to_string());
        }

        if let Some(stream) = &self.stream {
            for (field, value) in [
                ("token_event", &stream.token_event),
                ("generation_end_event", &stream.generation_end_event),
                ("node_entry_event", &stream.node_entry_event),
            ] {
                if value.trim().is_empty() {
                    errors.push(format!("stream.{field} cannot be empty"));
                }
            }
        }

        if let Some(logging) = &self.logging {
            if logging.format != "plain" && logging.format != "json" {
                errors.push(format!("Unknown logging format: {}", logging.format));
            }
        }

        (warnings, errors)
    }
}

/// Base directory for relay data: `~/.relay/`
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}
