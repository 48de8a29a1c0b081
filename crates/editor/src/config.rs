// Editor configuration.
//
// File: `~/.atelier/editor.toml` (or an explicit path), overlaid with
// `ATELIER_*` environment variables. Missing keys fall back to local
// development defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

pub const DEFAULT_PLAN_TIMEOUT_MS: u64 = 45_000;
pub const DEFAULT_LOAD_TIMEOUT_MS: u64 = 15_000;
pub const DEFAULT_AUTOSAVE_DELAY_MS: u64 = 1_500;
const MIN_AUTOSAVE_DELAY_MS: u64 = 250;
const MAX_AUTOSAVE_DELAY_MS: u64 = 30_000;

/// Root directory for Atelier user state: `~/.atelier/`.
pub fn global_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".atelier"))
}

/// Path to the editor config file: `~/.atelier/editor.toml`.
pub fn editor_config_path() -> Option<PathBuf> {
    global_dir().map(|d| d.join("editor.toml"))
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read or write config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("`{field}` is not a valid http(s) URL: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EditorConfig {
    pub endpoints: EndpointConfig,
    pub models: ModelConfig,
    pub planning: PlanningConfig,
    pub autosave: AutosaveConfig,
}

/// HTTP endpoints the engine talks to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EndpointConfig {
    /// Editable working document (`GET`).
    pub document_url: String,
    /// Planning service (`POST`).
    pub plan_url: String,
    /// Streaming execution service (`POST`, NDJSON response).
    pub execute_url: String,
    /// Local persistence service (`POST`).
    pub save_url: String,
    /// Read-only display tokens (`GET`, falls back to the bundled default).
    pub tokens_url: String,
    /// Timeout for document and token fetches, in milliseconds.
    pub load_timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            document_url: "http://127.0.0.1:3001/design.json".into(),
            plan_url: "http://127.0.0.1:8787/api/design/plan".into(),
            execute_url: "http://127.0.0.1:8787/api/design/execute".into(),
            save_url: "http://127.0.0.1:3001/api/save-design".into(),
            tokens_url: "http://127.0.0.1:3001/design.json".into(),
            load_timeout_ms: DEFAULT_LOAD_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub planner: String,
    pub executor: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { planner: "planner-default".into(), executor: "executor-default".into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlanningConfig {
    pub timeout_ms: u64,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self { timeout_ms: DEFAULT_PLAN_TIMEOUT_MS }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AutosaveConfig {
    pub enabled: bool,
    pub delay_ms: u64,
}

impl Default for AutosaveConfig {
    fn default() -> Self {
        Self { enabled: false, delay_ms: DEFAULT_AUTOSAVE_DELAY_MS }
    }
}

impl AutosaveConfig {
    /// Debounce window, clamped to [250 ms, 30 s].
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms.clamp(MIN_AUTOSAVE_DELAY_MS, MAX_AUTOSAVE_DELAY_MS))
    }
}

impl EditorConfig {
    /// Load from `~/.atelier/editor.toml` and apply environment overrides.
    /// Returns defaults if the file doesn't exist or can't be parsed.
    pub fn load() -> Self {
        let from_file = match editor_config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|error| {
                warn!(path = %path.display(), %error, "ignoring unreadable editor config");
                Self::default()
            }),
            _ => Self::default(),
        };
        from_file.with_env_overrides()
    }

    /// Load from a specific path without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Save to a specific path (creates parent directories).
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn with_env_overrides(self) -> Self {
        self.with_env_fn(|key| std::env::var(key))
    }

    /// Testable overlay that accepts an environment lookup function.
    ///
    /// | Variable | Field |
    /// |---|---|
    /// | `ATELIER_DOCUMENT_URL` | `endpoints.document_url` |
    /// | `ATELIER_PLAN_URL` | `endpoints.plan_url` |
    /// | `ATELIER_EXECUTE_URL` | `endpoints.execute_url` |
    /// | `ATELIER_SAVE_URL` | `endpoints.save_url` |
    /// | `ATELIER_TOKENS_URL` | `endpoints.tokens_url` |
    /// | `ATELIER_PLANNER_MODEL` | `models.planner` |
    /// | `ATELIER_EXECUTOR_MODEL` | `models.executor` |
    /// | `ATELIER_PLAN_TIMEOUT_MS` | `planning.timeout_ms` |
    /// | `ATELIER_AUTOSAVE` | `autosave.enabled` |
    /// | `ATELIER_AUTOSAVE_DELAY_MS` | `autosave.delay_ms` |
    fn with_env_fn<F>(mut self, env: F) -> Self
    where
        F: Fn(&str) -> Result<String, std::env::VarError>,
    {
        let string_overrides: [(&str, &mut String); 7] = [
            ("ATELIER_DOCUMENT_URL", &mut self.endpoints.document_url),
            ("ATELIER_PLAN_URL", &mut self.endpoints.plan_url),
            ("ATELIER_EXECUTE_URL", &mut self.endpoints.execute_url),
            ("ATELIER_SAVE_URL", &mut self.endpoints.save_url),
            ("ATELIER_TOKENS_URL", &mut self.endpoints.tokens_url),
            ("ATELIER_PLANNER_MODEL", &mut self.models.planner),
            ("ATELIER_EXECUTOR_MODEL", &mut self.models.executor),
        ];
        for (key, slot) in string_overrides {
            if let Ok(value) = env(key) {
                if !value.trim().is_empty() {
                    *slot = value.trim().to_string();
                }
            }
        }

        if let Some(ms) = env("ATELIER_PLAN_TIMEOUT_MS").ok().and_then(|v| v.parse().ok()) {
            self.planning.timeout_ms = ms;
        }
        if let Some(enabled) = env("ATELIER_AUTOSAVE").ok().and_then(|v| parse_flag(&v)) {
            self.autosave.enabled = enabled;
        }
        if let Some(ms) = env("ATELIER_AUTOSAVE_DELAY_MS").ok().and_then(|v| v.parse().ok()) {
            self.autosave.delay_ms = ms;
        }
        self
    }

    /// Check that every endpoint is an absolute http(s) URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoints = [
            ("endpoints.document_url", &self.endpoints.document_url),
            ("endpoints.plan_url", &self.endpoints.plan_url),
            ("endpoints.execute_url", &self.endpoints.execute_url),
            ("endpoints.save_url", &self.endpoints.save_url),
            ("endpoints.tokens_url", &self.endpoints.tokens_url),
        ];
        for (field, value) in endpoints {
            let valid = Url::parse(value)
                .map(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
                .unwrap_or(false);
            if !valid {
                return Err(ConfigError::InvalidUrl { field, value: value.clone() });
            }
        }
        Ok(())
    }

    pub fn plan_timeout(&self) -> Duration {
        Duration::from_millis(self.planning.timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.endpoints.load_timeout_ms)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env_from_map(
        map: HashMap<&'static str, &'static str>,
    ) -> impl Fn(&str) -> Result<String, std::env::VarError> {
        move |key: &str| map.get(key).map(|v| v.to_string()).ok_or(std::env::VarError::NotPresent)
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = EditorConfig::default();
        cfg.validate().expect("default endpoints should validate");
        assert!(!cfg.autosave.enabled);
        assert_eq!(cfg.autosave.delay(), Duration::from_millis(1_500));
        assert_eq!(cfg.plan_timeout(), Duration::from_millis(45_000));
    }

    #[test]
    fn env_overrides_endpoints_models_and_autosave() {
        let mut m = HashMap::new();
        m.insert("ATELIER_PLAN_URL", "https://ai.example.com/plan");
        m.insert("ATELIER_EXECUTOR_MODEL", "exec-large");
        m.insert("ATELIER_AUTOSAVE", "on");
        m.insert("ATELIER_AUTOSAVE_DELAY_MS", "900");
        m.insert("ATELIER_PLAN_TIMEOUT_MS", "1000");
        let cfg = EditorConfig::default().with_env_fn(env_from_map(m));

        assert_eq!(cfg.endpoints.plan_url, "https://ai.example.com/plan");
        assert_eq!(cfg.models.executor, "exec-large");
        assert!(cfg.autosave.enabled);
        assert_eq!(cfg.autosave.delay_ms, 900);
        assert_eq!(cfg.plan_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn blank_and_unparseable_env_values_are_ignored() {
        let mut m = HashMap::new();
        m.insert("ATELIER_SAVE_URL", "   ");
        m.insert("ATELIER_AUTOSAVE", "maybe");
        m.insert("ATELIER_PLAN_TIMEOUT_MS", "soon");
        let cfg = EditorConfig::default().with_env_fn(env_from_map(m));
        assert_eq!(cfg, EditorConfig::default());
    }

    #[test]
    fn autosave_delay_is_clamped() {
        let low = AutosaveConfig { enabled: true, delay_ms: 5 };
        assert_eq!(low.delay(), Duration::from_millis(250));
        let high = AutosaveConfig { enabled: true, delay_ms: 600_000 };
        assert_eq!(high.delay(), Duration::from_millis(30_000));
    }

    #[test]
    fn validate_rejects_relative_and_non_http_urls() {
        let mut cfg = EditorConfig::default();
        cfg.endpoints.save_url = "/api/save".into();
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidUrl { field: "endpoints.save_url", .. })
        ));

        cfg.endpoints.save_url = "ftp://host/save".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn partial_toml_round_trips_through_file() {
        let tmp = tempfile::tempdir().expect("tempdir should be created");
        let path = tmp.path().join("nested").join("editor.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[autosave]\nenabled = true\n").unwrap();

        let loaded = EditorConfig::load_from(&path).expect("partial config should load");
        assert!(loaded.autosave.enabled);
        assert_eq!(loaded.autosave.delay_ms, DEFAULT_AUTOSAVE_DELAY_MS);
        assert_eq!(loaded.models, ModelConfig::default());

        loaded.save_to(&path).expect("config should save");
        assert_eq!(EditorConfig::load_from(&path).unwrap(), loaded);
    }
}
