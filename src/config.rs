//! Configuration loading.
//!
//! Reads an optional `soc-agent.yaml`, resolves `${VAR}` / `${VAR:-default}`
//! references, then applies the deployment environment overrides
//! (`MCP_SERVER_URL`, `OLLAMA_URL`, `OLLAMA_MODEL`, `MAX_ITERATIONS`,
//! `SOC_HOST_BIND`). Every field has a default, so no file is required.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::reasoning_loop::LoopConfig;

/// File name searched for when no explicit path is given.
pub const CONFIG_FILE_NAME: &str = "soc-agent.yaml";

/// Task sent when none is given on the command line.
pub const DEFAULT_TASK: &str = "Please review our recent security alerts and investigate any \
    suspicious IP addresses. I need a threat assessment report with your recommended actions.";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: String, reason: String },
}

// ─── Public Types ────────────────────────────────────────────────────────────

/// Planner-side settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Tool host locator (`tcp://host:port` or `stdio:<command> [args]`).
    pub endpoint: String,
    pub connect_timeout_secs: u64,
    pub oracle: OracleConfig,
    #[serde(rename = "loop")]
    pub reasoning: LoopSettings,
    /// Default task when none is passed on the command line.
    pub task: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: "tcp://127.0.0.1:8000".to_string(),
            connect_timeout_secs: 10,
            oracle: OracleConfig::default(),
            reasoning: LoopSettings::default(),
            task: DEFAULT_TASK.to_string(),
        }
    }
}

impl AgentConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// OpenAI-compatible chat endpoint (Ollama by default).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Base URL including `/v1`.
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            model: "llama3.1:8b".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
        }
    }
}

/// Reasoning loop bounds, as written in the file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    pub max_iterations: u32,
    pub oracle_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub parallel_tool_calls: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        let defaults = LoopConfig::default();
        Self {
            max_iterations: defaults.max_iterations,
            oracle_timeout_secs: defaults.oracle_timeout.as_secs(),
            tool_timeout_secs: defaults.tool_timeout.as_secs(),
            parallel_tool_calls: defaults.parallel_tool_calls,
        }
    }
}

impl LoopSettings {
    pub fn to_loop_config(&self) -> LoopConfig {
        LoopConfig {
            max_iterations: self.max_iterations,
            oracle_timeout: Duration::from_secs(self.oracle_timeout_secs),
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
            parallel_tool_calls: self.parallel_tool_calls,
        }
    }
}

/// Tool host settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub bind: String,
    /// JSON alert feed; the built-in simulated feed when absent.
    pub alerts_path: Option<PathBuf>,
    pub geo_api_url: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            alerts_path: None,
            geo_api_url: crate::mcp_server::tools::geolocation::DEFAULT_GEO_API_URL.to_string(),
        }
    }
}

/// Whole file: `agent:` and `host:` sections, both optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentConfig,
    pub host: HostConfig,
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Locate the config file.
///
/// `SOC_AGENT_CONFIG` wins; otherwise walk upward from `start` looking for
/// `soc-agent.yaml`. `None` means run on defaults.
pub fn find_config_path(start: &Path) -> Option<PathBuf> {
    if let Ok(path) = std::env::var("SOC_AGENT_CONFIG") {
        let candidate = PathBuf::from(expand_tilde(&path));
        if candidate.exists() {
            return Some(candidate);
        }
        tracing::warn!(path = %candidate.display(), "SOC_AGENT_CONFIG points at a missing file");
    }

    let mut dir = start.to_path_buf();
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Load and parse a config file, with `${VAR}` interpolation.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    parse_config(&raw)
}

pub fn parse_config(raw: &str) -> Result<Config, ConfigError> {
    let interpolated = interpolate_env_vars(raw);
    if interpolated.trim().is_empty() {
        return Ok(Config::default());
    }
    let mut config: Config =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::Parse(e.to_string()))?;
    if let Some(ref path) = config.host.alerts_path {
        config.host.alerts_path = Some(PathBuf::from(expand_tilde(&path.to_string_lossy())));
    }
    Ok(config)
}

/// Find, load, and apply environment overrides.
pub fn load_from_env(start: &Path) -> Result<Config, ConfigError> {
    let mut config = match find_config_path(start) {
        Some(path) => {
            tracing::info!(path = %path.display(), "loading config");
            load_config(&path)?
        }
        None => Config::default(),
    };
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

/// Apply the deployment environment variables on top of the file.
pub fn apply_env_overrides<F>(config: &mut Config, get: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = get("MCP_SERVER_URL") {
        config.agent.endpoint = url;
    }
    if let Some(url) = get("OLLAMA_URL") {
        config.agent.oracle.base_url = openai_base_url(&url);
    }
    if let Some(model) = get("OLLAMA_MODEL") {
        config.agent.oracle.model = model;
    }
    if let Some(raw) = get("MAX_ITERATIONS") {
        config.agent.reasoning.max_iterations =
            raw.trim().parse().map_err(|e| ConfigError::Invalid {
                key: "MAX_ITERATIONS".into(),
                reason: format!("'{raw}': {e}"),
            })?;
    }
    if let Some(bind) = get("SOC_HOST_BIND") {
        config.host.bind = bind;
    }
    Ok(())
}

/// `http://ollama:11434` → `http://ollama:11434/v1`.
fn openai_base_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next();
            let mut var_expr = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_expr.push(c);
            }
            result.push_str(&resolve_var_expr(&var_expr));
        } else {
            result.push(ch);
        }
    }

    result
}

/// Resolve a variable expression like `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> String {
    if let Some(idx) = expr.find(":-") {
        let var_name = &expr[..idx];
        let default = &expr[idx + 2..];
        std::env::var(var_name).unwrap_or_else(|_| expand_tilde(default))
    } else {
        std::env::var(expr).unwrap_or_default()
    }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if let Some(home) = dirs::home_dir() {
            return format!("{}{rest}", home.display());
        }
    }
    path.to_string()
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.agent.endpoint, "tcp://127.0.0.1:8000");
        assert_eq!(config.agent.oracle.model, "llama3.1:8b");
        assert_eq!(config.agent.reasoning.max_iterations, 10);
        assert!(config.agent.task.contains("threat assessment"));
        assert_eq!(config.host.bind, "127.0.0.1:8000");
    }

    #[test]
    fn test_interpolate_env_vars_with_default() {
        std::env::remove_var("__SOC_TEST_NONEXISTENT_VAR__");
        let input = "${__SOC_TEST_NONEXISTENT_VAR__:-/fallback/path}";
        assert_eq!(interpolate_env_vars(input), "/fallback/path");
    }

    #[test]
    fn test_interpolate_env_vars_with_value() {
        std::env::set_var("__SOC_TEST_CONFIG_VAR__", "qwen2.5:7b");
        let input = "model: ${__SOC_TEST_CONFIG_VAR__:-llama3.1:8b}";
        assert_eq!(interpolate_env_vars(input), "model: qwen2.5:7b");
        std::env::remove_var("__SOC_TEST_CONFIG_VAR__");
    }

    #[test]
    fn test_interpolate_no_vars() {
        let input = "plain text with no variables";
        assert_eq!(interpolate_env_vars(input), input);
    }

    #[test]
    fn test_expand_tilde() {
        let result = expand_tilde("~/alerts.json");
        assert!(!result.starts_with('~'), "tilde should be expanded");
        assert!(result.ends_with("/alerts.json"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
agent:
  endpoint: "stdio:soc-host --stdio"
  loop:
    max_iterations: 4
    parallel_tool_calls: false
host:
  alerts_path: /var/lib/soc/alerts.json
"#;
        let config = parse_config(yaml).unwrap();
        assert_eq!(config.agent.endpoint, "stdio:soc-host --stdio");
        assert_eq!(config.agent.reasoning.max_iterations, 4);
        assert!(!config.agent.reasoning.parallel_tool_calls);
        assert_eq!(config.agent.reasoning.tool_timeout_secs, 30);
        assert_eq!(config.agent.oracle.model, "llama3.1:8b");
        assert_eq!(
            config.host.alerts_path,
            Some(PathBuf::from("/var/lib/soc/alerts.json"))
        );

        let lc = config.agent.reasoning.to_loop_config();
        assert_eq!(lc.max_iterations, 4);
        assert_eq!(lc.tool_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_empty_file_is_defaults() {
        assert_eq!(parse_config("").unwrap(), Config::default());
    }

    #[test]
    fn test_bad_yaml_is_parse_error() {
        assert!(matches!(
            parse_config("agent: [unclosed"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "agent:\n  oracle:\n    model: mistral:7b").unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.agent.oracle.model, "mistral:7b");

        assert!(matches!(
            load_config(Path::new("/nonexistent/soc-agent.yaml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_find_config_walks_upward() {
        let root = tempfile::tempdir().unwrap();
        std::fs::write(root.path().join(CONFIG_FILE_NAME), "agent: {}\n").unwrap();
        let nested = root.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        std::env::remove_var("SOC_AGENT_CONFIG");
        let found = find_config_path(&nested).unwrap();
        assert_eq!(found, root.path().join(CONFIG_FILE_NAME));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        apply_env_overrides(
            &mut config,
            env(&[
                ("MCP_SERVER_URL", "tcp://mcp-server:8000"),
                ("OLLAMA_URL", "http://ollama:11434/"),
                ("OLLAMA_MODEL", "llama3.2:3b"),
                ("MAX_ITERATIONS", "6"),
                ("SOC_HOST_BIND", "0.0.0.0:8000"),
            ]),
        )
        .unwrap();
        assert_eq!(config.agent.endpoint, "tcp://mcp-server:8000");
        assert_eq!(config.agent.oracle.base_url, "http://ollama:11434/v1");
        assert_eq!(config.agent.oracle.model, "llama3.2:3b");
        assert_eq!(config.agent.reasoning.max_iterations, 6);
        assert_eq!(config.host.bind, "0.0.0.0:8000");
    }

    #[test]
    fn test_bad_max_iterations_override() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env(&[("MAX_ITERATIONS", "ten")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));
    }
}
