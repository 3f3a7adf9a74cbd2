//! Configuration system (layered: defaults < config file < env).

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AgentError, Result};
use crate::types::ReasoningEffort;

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "AGENT_TURN_";

/// Top-level configuration for a turn loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub model: String,
    pub reasoning_effort: Option<ReasoningEffort>,
    /// Reference handlers describe side effects instead of performing them.
    pub dry_run: bool,
    pub cwd: Option<PathBuf>,
    /// Delay before a completed turn flushes; a `cancel()` inside it wins.
    pub flush_delay_ms: u64,
    /// Silence on the provider stream longer than this is a timeout; `0` disables.
    pub stream_idle_timeout_ms: u64,
    pub max_rounds: u32,
    pub retry: RetryConfig,
    pub loop_guard: LoopGuardConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            reasoning_effort: None,
            dry_run: false,
            cwd: None,
            flush_delay_ms: 30,
            stream_idle_timeout_ms: 120_000,
            max_rounds: 50,
            retry: RetryConfig::default(),
            loop_guard: LoopGuardConfig::default(),
        }
    }
}

/// `[retry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub rate_limit_base_ms: u64,
    pub transient_delay_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            rate_limit_base_ms: 2_500,
            transient_delay_ms: 1_000,
            max_backoff_ms: 60_000,
        }
    }
}

/// `[loop_guard]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopGuardConfig {
    /// Prior identical failures after which a call is blocked.
    pub failure_threshold: u32,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 2,
        }
    }
}

impl AgentConfig {
    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Platform config location, e.g. `~/.config/agent-turn/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "agent-turn")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Resolve configuration from a file and the environment.
    ///
    /// An explicit `path` must exist. Without one, the platform default is
    /// used when present. Environment variables (and a `.env` file, if
    /// any) override file values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::from_file(&path)?,
                _ => Self::default(),
            },
        };
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        config.apply_env()?;
        Ok(config)
    }

    /// Defaults overridden by the environment only.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            AgentError::Configuration(format!("failed to read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Apply `AGENT_TURN_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `AGENT_TURN_*` overrides from an arbitrary lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |suffix: &str| {
            let key = format!("{ENV_PREFIX}{suffix}");
            lookup(&key).map(|value| (key, value))
        };

        if let Some((_, value)) = var("MODEL") {
            self.model = value;
        }
        if let Some((key, value)) = var("REASONING_EFFORT") {
            self.reasoning_effort = Some(parse_value(&key, &value)?);
        }
        if let Some((key, value)) = var("DRY_RUN") {
            self.dry_run = parse_bool(&key, &value)?;
        }
        if let Some((_, value)) = var("CWD") {
            self.cwd = Some(PathBuf::from(value));
        }
        if let Some((key, value)) = var("FLUSH_DELAY_MS") {
            self.flush_delay_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("STREAM_IDLE_TIMEOUT_MS") {
            self.stream_idle_timeout_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_ROUNDS") {
            self.max_rounds = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("RATE_LIMIT_BASE_MS") {
            self.retry.rate_limit_base_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("TRANSIENT_DELAY_MS") {
            self.retry.transient_delay_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("MAX_BACKOFF_MS") {
            self.retry.max_backoff_ms = parse_value(&key, &value)?;
        }
        if let Some((key, value)) = var("LOOP_FAILURE_THRESHOLD") {
            self.loop_guard.failure_threshold = parse_value(&key, &value)?;
        }
        Ok(())
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }

    pub fn stream_idle_timeout(&self) -> Option<Duration> {
        (self.stream_idle_timeout_ms > 0).then(|| Duration::from_millis(self.stream_idle_timeout_ms))
    }

    /// Working directory for tool handlers, defaulting to the process cwd.
    pub fn resolved_cwd(&self) -> PathBuf {
        self.cwd
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| AgentError::Configuration(format!("{key}: invalid value `{raw}`")))
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(AgentError::Configuration(format!(
            "{key}: invalid boolean `{raw}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AgentConfig::from_toml_str(
            r#"
            model = "o3"
            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "o3");
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.rate_limit_base_ms, 2_500);
        assert_eq!(config.flush_delay_ms, 30);
        assert_eq!(config.loop_guard.failure_threshold, 2);
    }

    #[test]
    fn env_overrides_file_values() {
        let mut config = AgentConfig::from_toml_str("dry_run = false\nmax_rounds = 4").unwrap();
        config
            .apply_env_with(lookup(&[
                ("AGENT_TURN_DRY_RUN", "true"),
                ("AGENT_TURN_REASONING_EFFORT", "high"),
            ]))
            .unwrap();
        assert!(config.dry_run);
        assert_eq!(config.max_rounds, 4);
        assert_eq!(config.reasoning_effort, Some(ReasoningEffort::High));
    }

    #[test]
    fn invalid_env_value_is_a_configuration_error() {
        let mut config = AgentConfig::default();
        let err = config
            .apply_env_with(lookup(&[("AGENT_TURN_MAX_ROUNDS", "many")]))
            .unwrap_err();
        assert!(matches!(err, AgentError::Configuration(ref msg) if msg.contains("AGENT_TURN_MAX_ROUNDS")));
    }

    #[test]
    fn zero_idle_timeout_disables_it() {
        let config = AgentConfig {
            stream_idle_timeout_ms: 0,
            ..AgentConfig::default()
        };
        assert_eq!(config.stream_idle_timeout(), None);
    }
}
