//! Configuration management for modelgate.
//!
//! Loads settings from `~/.config/modelgate/config.toml` with environment
//! overrides. Everything is read once at startup.

use crate::model::ModelClass;
use crate::quota::{Ceiling, LimitPolicy};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub models: ModelsConfig,
    /// Limit policy per class tag. A `[limits]` table in the file replaces
    /// the built-in one and must name every class.
    #[serde(default = "default_limits")]
    pub limits: BTreeMap<String, LimitEntry>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            provider: ProviderConfig::default(),
            models: ModelsConfig::default(),
            limits: default_limits(),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    /// Base used when handing out upload references. Derived from the
    /// request `Host` header when unset.
    #[serde(default)]
    pub public_base_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Upstream model identifier per class.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelsConfig {
    #[serde(default = "default_general_model")]
    pub general: String,
    #[serde(default = "default_coding_model")]
    pub coding: String,
    #[serde(default = "default_vision_model")]
    pub vision: String,
    #[serde(default = "default_audio_model")]
    pub audio: String,
}

impl ModelsConfig {
    pub fn model_for(&self, class: ModelClass) -> &str {
        match class {
            ModelClass::General => &self.general,
            ModelClass::Coding => &self.coding,
            ModelClass::Vision => &self.vision,
            ModelClass::Audio => &self.audio,
        }
    }
}

/// Raw limit entry as written in the config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LimitEntry {
    pub per_minute: u32,
    pub per_day: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_seconds: Option<u32>,
}

impl From<LimitPolicy> for LimitEntry {
    fn from(policy: LimitPolicy) -> Self {
        let (max_tokens, max_seconds) = match policy.ceiling {
            Ceiling::MaxTokens(n) => (Some(n), None),
            Ceiling::MaxSeconds(n) => (None, Some(n)),
        };
        Self {
            per_minute: policy.max_per_minute,
            per_day: policy.max_per_day,
            max_tokens,
            max_seconds,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

// Default value functions
fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 3000 }
fn default_upload_dir() -> PathBuf { PathBuf::from("uploads") }
fn default_base_url() -> String { DEFAULT_PROVIDER_BASE_URL.to_string() }
fn default_general_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_coding_model() -> String { "qwen-2.5-coder-32b".to_string() }
fn default_vision_model() -> String { "llama-3.2-11b-vision-preview".to_string() }
fn default_audio_model() -> String { "whisper-large-v3-turbo".to_string() }
fn default_filter() -> String { "info".to_string() }

fn default_limits() -> BTreeMap<String, LimitEntry> {
    ModelClass::ALL
        .iter()
        .map(|c| (c.as_str().to_string(), LimitPolicy::default_for(*c).into()))
        .collect()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            upload_dir: default_upload_dir(),
            public_base_url: None,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            general: default_general_model(),
            coding: default_coding_model(),
            vision: default_vision_model(),
            audio: default_audio_model(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::default(),
            filter: default_filter(),
        }
    }
}

impl Config {
    /// Get the default config file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("modelgate")
            .join("config.toml")
    }

    /// Load config from file, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from a specific path.
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(&path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e)),
        }
    }

    /// Apply environment variable overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(val) = std::env::var("PORT") {
            if let Ok(port) = val.parse() {
                self.gateway.port = port;
            }
        }
        if let Ok(host) = std::env::var("HOST") {
            self.gateway.host = host;
        }
        if let Ok(dir) = std::env::var("UPLOAD_DIR") {
            self.gateway.upload_dir = PathBuf::from(dir);
        }
        if let Ok(url) = std::env::var("PUBLIC_BASE_URL") {
            self.gateway.public_base_url = Some(url);
        }
        if let Ok(url) = std::env::var("GROQ_API_BASE_URL") {
            self.provider.base_url = url;
        }
        if let Ok(key) = std::env::var("GROQ_API_KEY") {
            self.provider.api_key = Some(key);
        }
        // Model overrides; BALANCED_MODEL is the legacy name for GENERAL_MODEL.
        if let Ok(model) = std::env::var("GENERAL_MODEL").or_else(|_| std::env::var("BALANCED_MODEL")) {
            self.models.general = model;
        }
        if let Ok(model) = std::env::var("CODING_MODEL") {
            self.models.coding = model;
        }
        if let Ok(model) = std::env::var("VISION_MODEL") {
            self.models.vision = model;
        }
        if let Ok(model) = std::env::var("AUDIO_MODEL") {
            self.models.audio = model;
        }
        self
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quota::LimitPolicies;
    use std::fs;

    #[test]
    fn loads_config_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[gateway]
port = 9090
upload_dir = "/var/lib/modelgate/uploads"

[provider]
base_url = "http://localhost:8080/v1"
api_key = "gsk-test"

[models]
coding = "my-coder"
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.gateway.port, 9090);
        assert_eq!(config.gateway.upload_dir, PathBuf::from("/var/lib/modelgate/uploads"));
        assert_eq!(config.provider.base_url, "http://localhost:8080/v1");
        assert_eq!(config.provider.api_key, Some("gsk-test".to_string()));
        assert_eq!(config.models.model_for(ModelClass::Coding), "my-coder");
        assert_eq!(config.models.model_for(ModelClass::General), "llama-3.3-70b-versatile");
    }

    #[test]
    fn returns_defaults_when_file_missing() {
        let config = Config::load_from(PathBuf::from("/nonexistent/path/config.toml")).unwrap();

        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.provider.base_url, DEFAULT_PROVIDER_BASE_URL);
        assert_eq!(config.logging.format, LogFormat::Compact);
        assert_eq!(config.limits.len(), 4);
    }

    #[test]
    fn default_limits_build_the_default_policy_table() {
        let config = Config::default();
        let policies = LimitPolicies::from_entries(&config.limits).unwrap();
        assert_eq!(policies, LimitPolicies::default());
    }

    #[test]
    fn limits_table_in_file_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");

        fs::write(&config_path, r#"
[limits.coding]
per_minute = 5
per_day = 50
max_tokens = 1000
"#).unwrap();

        let config = Config::load_from(config_path).unwrap();

        assert_eq!(config.limits.len(), 1);
        assert_eq!(config.limits["coding"].per_minute, 5);
        // Incomplete tables are rejected once turned into policies.
        assert!(LimitPolicies::from_entries(&config.limits).is_err());
    }

    #[test]
    fn rejects_malformed_toml() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "[gateway\nport = ").unwrap();

        assert!(matches!(Config::load_from(config_path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn overrides_provider_and_models_from_environment() {
        std::env::set_var("GROQ_API_KEY", "env-groq-key");
        std::env::set_var("AUDIO_MODEL", "env-whisper");

        let config = Config::default().with_env_overrides();

        assert_eq!(config.provider.api_key, Some("env-groq-key".to_string()));
        assert_eq!(config.models.audio, "env-whisper");

        // Cleanup
        std::env::remove_var("GROQ_API_KEY");
        std::env::remove_var("AUDIO_MODEL");
    }

    #[test]
    fn balanced_model_env_sets_general_model() {
        std::env::remove_var("GENERAL_MODEL");
        std::env::set_var("BALANCED_MODEL", "legacy-balanced");

        let config = Config::default().with_env_overrides();
        assert_eq!(config.models.general, "legacy-balanced");

        std::env::remove_var("BALANCED_MODEL");
    }

    #[test]
    fn parses_all_log_formats() {
        let dir = tempfile::tempdir().unwrap();

        for (value, expected) in [("compact", LogFormat::Compact), ("json", LogFormat::Json)] {
            let config_path = dir.path().join(format!("config_{}.toml", value));
            fs::write(&config_path, format!(r#"
[logging]
format = "{}"
"#, value)).unwrap();

            let config = Config::load_from(config_path).unwrap();
            assert_eq!(config.logging.format, expected);
        }
    }

    #[test]
    fn serializes_back_to_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
