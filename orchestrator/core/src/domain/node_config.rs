// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Node Configuration Types
//
// Defines the configuration schema for an agora node, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - LLM provider configuration with model aliases and pricing
// - Record store and content store selection
// - Sandbox (Docker) settings
// - Run defaults (reviewer count, thinking, cost check cadence)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::domain::llm::ModelPricing;
use crate::domain::repository::{PostgresConfig, StorageBackend};

pub const API_VERSION: &str = "agora/v1";
pub const KIND: &str = "NodeConfig";

/// Top-level Kubernetes-style node configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// API version (must be "agora/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "NodeConfig")
    pub kind: String,

    /// Node metadata (name, labels, version)
    pub metadata: ManifestMetadata,

    /// Node configuration specification
    #[serde(default)]
    pub spec: NodeConfigSpec,
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    /// Optional: Configuration version for tracking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Optional: Labels for categorization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Node configuration specification (content under spec:)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NodeConfigSpec {
    /// LLM provider configurations
    #[serde(default)]
    pub llm_providers: Vec<LLMProviderConfig>,

    /// Retry policy applied around every provider
    #[serde(default)]
    pub llm_selection: LLMSelection,

    /// Record store and content store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Sandbox configuration
    #[serde(default)]
    pub sandbox: SandboxConfig,

    /// Run defaults
    #[serde(default)]
    pub run: RunSettings,

    /// Observability configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMProviderConfig {
    /// Unique provider name (e.g., "anthropic", "ollama-local")
    pub name: String,

    /// Provider type
    #[serde(rename = "type")]
    pub provider_type: String, // "anthropic", "openai", "openai-compatible", "ollama"

    /// API endpoint URL
    pub endpoint: String,

    /// API key (supports "env:VAR_NAME" for environment variables)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Whether this provider is active
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Available models on this provider
    pub models: Vec<ModelConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Alias experiments refer to (e.g., "claude-sonnet", "default")
    pub alias: String,

    /// Actual model identifier for the provider API
    pub model: String,

    /// Maximum context window size in tokens
    #[serde(default = "default_context_window")]
    pub context_window: u32,

    /// Maximum tokens generated per turn
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: u32,

    /// USD per million input tokens (0.0 for local models)
    #[serde(default)]
    pub input_price_per_million: f64,

    /// USD per million output tokens (0.0 for local models)
    #[serde(default)]
    pub output_price_per_million: f64,
}

impl ModelConfig {
    pub fn pricing(&self) -> ModelPricing {
        ModelPricing {
            input_per_million: self.input_price_per_million,
            output_per_million: self.output_price_per_million,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMSelection {
    /// Maximum attempts per model call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between retries in milliseconds (doubled per attempt)
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

impl Default for LLMSelection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    InMemory,
    #[default]
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Record store backend
    #[serde(default)]
    pub backend: StorageBackendKind,

    /// PostgreSQL connection string (required for the postgres backend)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,

    /// Root directory of publication content and attachments
    #[serde(default = "default_content_root")]
    pub content_root: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::default(),
            database_url: Some(default_database_url()),
            content_root: default_content_root(),
        }
    }
}

impl StorageConfig {
    pub fn to_backend(&self) -> StorageBackend {
        match self.backend {
            StorageBackendKind::InMemory => StorageBackend::InMemory,
            StorageBackendKind::Postgres => StorageBackend::PostgreSQL(PostgresConfig {
                connection_string: self
                    .database_url
                    .clone()
                    .unwrap_or_else(default_database_url),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Path to Docker socket
    /// Default: auto-detected local defaults
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket_path: Option<String>,

    /// Directory containing `<profile>/Dockerfile`
    #[serde(default = "default_profiles_dir")]
    pub profiles_dir: String,

    /// Default timeout for a single command, in seconds
    #[serde(default = "default_command_timeout")]
    pub command_timeout_seconds: u64,

    /// Optional Docker network for sandboxes (None = default bridge)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_mode: Option<String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            docker_socket_path: None,
            profiles_dir: default_profiles_dir(),
            command_timeout_seconds: default_command_timeout(),
            network_mode: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Reviewers per publication; derived from the agent count when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewers: Option<usize>,

    /// Extended thinking for providers that support it
    #[serde(default = "default_true")]
    pub thinking: bool,

    /// Ticks between cost checks while spend is far from the ceiling
    #[serde(default = "default_cost_check_interval")]
    pub cost_check_interval: u64,

    /// Spend/ceiling ratio above which cost is checked every tick
    #[serde(default = "default_cost_check_ratio")]
    pub cost_check_ratio: f64,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            reviewers: None,
            thinking: true,
            cost_check_interval: default_cost_check_interval(),
            cost_check_ratio: default_cost_check_ratio(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Logging configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_context_window() -> u32 {
    200_000
}

fn default_max_output_tokens() -> u32 {
    8192
}

fn default_database_url() -> String {
    "postgres://postgres@localhost:5432/agora".to_string()
}

fn default_content_root() -> String {
    "./agora-data".to_string()
}

fn default_profiles_dir() -> String {
    "./profiles".to_string()
}

fn default_command_timeout() -> u64 {
    600
}

fn default_cost_check_interval() -> u64 {
    20
}

fn default_cost_check_ratio() -> f64 {
    0.95
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "agora-node".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: NodeConfigSpec::default(),
        }
    }
}

impl NodeConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Configured logging, or the defaults when the section is absent
    pub fn logging(&self) -> LoggingConfig {
        self.spec
            .observability
            .as_ref()
            .and_then(|o| o.logging.clone())
            .unwrap_or_default()
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. AGORA_CONFIG_PATH environment variable
    /// 2. ./agora-config.yaml (working directory)
    /// 3. ~/.agora/config.yaml (user home)
    /// 4. /etc/agora/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("AGORA_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./agora-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".agora").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/agora/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // 1. Explicit CLI path (Fail if missing/invalid)
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        // 2. Discovery (Env -> Cwd -> Home -> System)
        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("AGORA_DATABASE_URL") {
            tracing::info!("Environment override: AGORA_DATABASE_URL");
            self.spec.storage.backend = StorageBackendKind::Postgres;
            self.spec.storage.database_url = Some(url);
        }

        if let Ok(root) = std::env::var("AGORA_CONTENT_ROOT") {
            tracing::info!("Environment override: AGORA_CONTENT_ROOT={}", root);
            self.spec.storage.content_root = root;
        }

        if let Ok(socket) = std::env::var("AGORA_DOCKER_SOCKET") {
            tracing::info!("Environment override: AGORA_DOCKER_SOCKET={}", socket);
            self.spec.sandbox.docker_socket_path = Some(socket);
        }
    }

    /// Find the provider and model configuration behind a model alias
    pub fn model_config(&self, alias: &str) -> Option<(&LLMProviderConfig, &ModelConfig)> {
        self.spec
            .llm_providers
            .iter()
            .filter(|p| p.enabled)
            .find_map(|p| p.models.iter().find(|m| m.alias == alias).map(|m| (p, m)))
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        for provider in &self.spec.llm_providers {
            if provider.name.is_empty() {
                anyhow::bail!("LLM provider name cannot be empty");
            }

            if provider.endpoint.is_empty() {
                anyhow::bail!("LLM provider endpoint cannot be empty for: {}", provider.name);
            }

            if provider.models.is_empty() {
                anyhow::bail!("LLM provider must have at least one model: {}", provider.name);
            }

            for model in &provider.models {
                if model.alias.is_empty() {
                    anyhow::bail!("Model alias cannot be empty in provider: {}", provider.name);
                }

                if model.model.is_empty() {
                    anyhow::bail!("Model identifier cannot be empty for alias: {}", model.alias);
                }
            }
        }

        if self.spec.storage.backend == StorageBackendKind::Postgres
            && self
                .spec
                .storage
                .database_url
                .as_deref()
                .map_or(true, str::is_empty)
        {
            anyhow::bail!("spec.storage.database_url is required for the postgres backend");
        }

        let ratio = self.spec.run.cost_check_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            anyhow::bail!("spec.run.cost_check_ratio must be in (0, 1], got {}", ratio);
        }

        if self.spec.run.cost_check_interval == 0 {
            anyhow::bail!("spec.run.cost_check_interval must be at least 1");
        }

        let logging = self.logging();
        if !matches!(logging.format.as_str(), "text" | "json") {
            anyhow::bail!(
                "spec.observability.logging.format must be text or json, got '{}'",
                logging.format
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = NodeConfig::default();
        assert_eq!(manifest.api_version, "agora/v1");
        assert_eq!(manifest.kind, "NodeConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert!(manifest.spec.llm_providers.is_empty());
        assert_eq!(manifest.spec.run.cost_check_interval, 20);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_parsing_with_defaults() {
        let yaml = r#"
apiVersion: agora/v1
kind: NodeConfig
metadata:
  name: lab
spec:
  llm_providers:
    - name: anthropic
      type: anthropic
      endpoint: https://api.anthropic.com
      api_key: env:ANTHROPIC_API_KEY
      models:
        - alias: claude-sonnet
          model: claude-sonnet-4-5
          input_price_per_million: 3.0
          output_price_per_million: 15.0
  storage:
    backend: in_memory
  run:
    reviewers: 2
"#;
        let config = NodeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.spec.storage.backend, StorageBackendKind::InMemory);
        assert!(matches!(config.spec.storage.to_backend(), StorageBackend::InMemory));
        assert_eq!(config.spec.run.reviewers, Some(2));
        assert!(config.spec.run.thinking);

        let (provider, model) = config.model_config("claude-sonnet").unwrap();
        assert_eq!(provider.provider_type, "anthropic");
        assert_eq!(model.context_window, 200_000);
        assert_eq!(model.pricing().output_per_million, 15.0);
        assert!(config.model_config("missing").is_none());
        assert!(config.validate().is_ok());
        assert_eq!(config.logging().level, "info");
        assert_eq!(config.logging().format, "text");
    }

    #[test]
    fn test_logging_section() {
        let yaml = r#"
apiVersion: agora/v1
kind: NodeConfig
metadata:
  name: lab
spec:
  storage:
    backend: in_memory
  observability:
    logging:
      level: debug
"#;
        let mut config = NodeConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.logging().level, "debug");
        assert_eq!(config.logging().format, "text");
        assert!(config.validate().is_ok());

        config.spec.observability = Some(ObservabilityConfig {
            logging: Some(LoggingConfig {
                level: "info".to_string(),
                format: "xml".to_string(),
            }),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = NodeConfig::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.run.cost_check_ratio = 1.5;
        assert!(manifest.validate().is_err());
        manifest.spec.run.cost_check_ratio = 0.95;

        manifest.spec.storage.database_url = None;
        assert!(manifest.validate().is_err());
        manifest.spec.storage.backend = StorageBackendKind::InMemory;
        assert!(manifest.validate().is_ok());

        manifest.spec.llm_providers.push(LLMProviderConfig {
            name: "invalid".to_string(),
            provider_type: "openai".to_string(),
            endpoint: "https://api.openai.com".to_string(),
            api_key: None,
            enabled: true,
            models: vec![],
        });
        assert!(manifest.validate().is_err());
    }
}
