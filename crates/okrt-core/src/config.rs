//! Configuration types for the streaming engine

use crate::payload::{ToolKind, ToolRegistry};
use crate::session::DEFAULT_RAW_CAPTURE_LIMIT;
use okrt_wire::ProviderKind;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Which wire protocol family to speak.
    pub provider: ProviderKind,
    pub model: String,
    /// Overrides the provider family's default endpoint.
    pub base_url: Option<String>,
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Tool-name to payload-kind registry. Empty means the defaults.
    #[serde(default)]
    pub tools: HashMap<String, ToolKind>,
    #[serde(default = "default_raw_capture_limit")]
    pub raw_capture_limit: usize,
    /// Where interaction captures are appended, one JSON line each.
    pub audit_log: Option<String>,
}

fn default_secret() -> SecretString {
    SecretString::new(String::new())
}

fn default_raw_capture_limit() -> usize {
    DEFAULT_RAW_CAPTURE_LIMIT
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Builds the tool registry, defaulting when no tools are configured.
    pub fn registry(&self) -> ToolRegistry {
        if self.tools.is_empty() {
            ToolRegistry::default()
        } else {
            ToolRegistry::from_entries(self.tools.iter().map(|(k, v)| (k.clone(), *v)))
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Anthropic,
            model: String::new(),
            base_url: None,
            api_key: default_secret(),
            tools: HashMap::new(),
            raw_capture_limit: DEFAULT_RAW_CAPTURE_LIMIT,
            audit_log: None,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let mut config = Config {
            provider: ProviderKind::Ollama,
            model: "llama3".to_string(),
            base_url: Some("http://localhost:11434".to_string()),
            ..Config::default()
        };
        config
            .tools
            .insert("render_chart".to_string(), ToolKind::Chart);
        config.to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.provider, ProviderKind::Ollama);
        assert_eq!(loaded.model, "llama3");
        assert_eq!(loaded.raw_capture_limit, DEFAULT_RAW_CAPTURE_LIMIT);
        assert_eq!(loaded.registry().kind_for("render_chart"), Some(ToolKind::Chart));
        // Configured registries are closed: nothing beyond the file.
        assert_eq!(loaded.registry().kind_for("emit_okrt_actions"), None);
    }

    #[test]
    fn test_api_key_never_serialized() {
        let config = Config {
            api_key: SecretString::new("sk-secret".to_string()),
            model: "m".to_string(),
            ..Config::default()
        };
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(!toml.contains("sk-secret"));
        assert!(!toml.contains("api_key"));
    }

    #[test]
    fn test_empty_tools_falls_back_to_defaults() {
        let config = Config::default();
        let registry = config.registry();
        assert_eq!(registry.kind_for("emit_okrt_actions"), Some(ToolKind::ActionBatch));
        assert_eq!(registry.kind_for("request_more_info"), Some(ToolKind::InfoRequest));
    }
}
