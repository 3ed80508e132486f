//! Configuration system for ragchat.
//!
//! Uses `figment` for layered configuration: defaults -> config file -> environment -> overrides.
//! Configuration is loaded from `~/.config/ragchat/config.toml` and/or `.ragchat/config.toml`
//! in the workspace directory.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::retrieval::RetrievalStrategy;

/// Top-level configuration for the ragchat service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub retrieval: RetrievalConfig,
    pub providers: ProvidersConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// Retrieval client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Number of chunks retrieved when the request does not say.
    pub default_k: usize,
    /// Whether index calls run inline or on the blocking thread pool.
    pub strategy: RetrievalStrategy,
    /// Upper bound for one retrieval call, in seconds.
    pub timeout_secs: u64,
    /// Dimensionality of the built-in hashing embedder.
    pub embedding_dimensions: usize,
    /// Optional JSON file of documents loaded into the in-memory index at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed_file: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: 4,
            strategy: RetrievalStrategy::ThreadPool,
            timeout_secs: 30,
            embedding_dimensions: 384,
            seed_file: None,
        }
    }
}

/// Retry policy for transient provider errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Configuration shared by every provider plus per-variant sections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Provider key used when a request does not name one.
    pub default_provider: String,
    /// Cap on generated tokens per answer.
    pub max_output_tokens: u32,
    /// HTTP timeout for one provider call, in seconds.
    pub request_timeout_secs: u64,
    pub retry: RetryConfig,
    pub azure: AzureConfig,
    pub gemini: GeminiConfig,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            default_provider: "azure-gpt4o-mini".to_string(),
            max_output_tokens: 1000,
            request_timeout_secs: 60,
            retry: RetryConfig::default(),
            azure: AzureConfig::default(),
            gemini: GeminiConfig::default(),
        }
    }
}

impl ProvidersConfig {
    /// Validate this config and return any warnings.
    ///
    /// Returns an empty Vec if the config is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.default_provider != self.azure.key && self.default_provider != self.gemini.key {
            warnings.push(format!(
                "default_provider '{}' does not match any registered provider ('{}', '{}')",
                self.default_provider, self.azure.key, self.gemini.key
            ));
        }
        if self.max_output_tokens == 0 {
            warnings.push("max_output_tokens is 0; providers will return empty answers".into());
        }
        if self.request_timeout_secs == 0 {
            warnings.push("request_timeout_secs is 0; every provider call will time out".into());
        }
        if self.azure.key == self.gemini.key {
            warnings.push(format!(
                "azure and gemini share the key '{}'; the latter registration wins",
                self.azure.key
            ));
        }
        warnings
    }
}

/// Azure OpenAI chat-completions provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureConfig {
    /// Key clients use to select this provider.
    pub key: String,
    /// Human-readable label reported as `model_used`.
    pub label: String,
    /// Endpoint used when `endpoint_env` is not set.
    pub endpoint: String,
    /// Environment variable that overrides the endpoint.
    pub endpoint_env: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub api_version: String,
    /// Deployment (model) name.
    pub deployment: String,
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            key: "azure-gpt4o-mini".to_string(),
            label: "Azure GPT-4o-mini".to_string(),
            endpoint: "https://ai-40mini.cognitiveservices.azure.com/".to_string(),
            endpoint_env: "AZURE_CHAT_ENDPOINT".to_string(),
            api_key_env: "AZURE_CHAT_API_KEY".to_string(),
            api_version: "2024-12-01-preview".to_string(),
            deployment: "gpt-4o-mini".to_string(),
        }
    }
}

/// Google Gemini provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub key: String,
    pub label: String,
    pub base_url: String,
    pub api_key_env: String,
    pub model: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            key: "gemini".to_string(),
            label: "Google Gemini Pro".to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            model: "gemini-1.5-pro".to_string(),
        }
    }
}

/// Load configuration from all sources, merging in priority order.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides (passed as argument)
/// 2. Environment variables (prefixed with `RAGCHAT_`)
/// 3. Explicit config file (`--config`)
/// 4. Workspace-local config (`.ragchat/config.toml`)
/// 5. User config (`~/.config/ragchat/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&AppConfig>,
) -> Result<AppConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(config_dir) = directories::ProjectDirs::from("dev", "ragchat", "ragchat") {
        let user_config = config_dir.config_dir().join("config.toml");
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = ws.join(".ragchat").join("config.toml");
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = config_file {
        if !path.exists() {
            return Err(ConfigError::Invalid {
                message: format!("config file not found: {}", path.display()),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    // RAGCHAT_SERVER__PORT, RAGCHAT_PROVIDERS__DEFAULT_PROVIDER, etc.
    figment = figment.merge(Env::prefixed("RAGCHAT_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: AppConfig = figment.extract().map_err(Box::new)?;
    if config.retrieval.default_k == 0 {
        return Err(ConfigError::Invalid {
            message: "retrieval.default_k must be at least 1".into(),
        });
    }
    Ok(config)
}
