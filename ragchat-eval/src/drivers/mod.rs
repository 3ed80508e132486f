//! Exercise drivers that turn a test prompt into one HTTP call against a
//! running ragchat-compatible service.
//!
//! Every driver reads `{prompt, options: {config}, context: {vars}}` and
//! always produces a [`ProviderResponse`]. Remote failures end up in its
//! `error` field; nothing here panics or returns `Err` because the far side
//! misbehaved.
//!
//! Values are resolved per request in this order: `context.vars`, then the
//! target config, then [`DriverSettings`] loaded from `PROMPTFOO_RAG_*`
//! environment variables.

pub mod chat;
pub mod query;
pub mod upload;

pub use chat::ChatTarget;
pub use query::{QueryTarget, extract_text};
pub use upload::{EmbedTarget, TextTarget};

use crate::error::{EvalError, Result};
use async_trait::async_trait;
use figment::{
    Figment,
    providers::{Env, Serialized},
};
use ragchat_core::types::truncate_for_log;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8000";
pub const ENV_PREFIX: &str = "PROMPTFOO_RAG_";

/// Environment-level defaults shared by all targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverSettings {
    pub base_url: String,
    /// Bearer token attached when a target allows auth.
    pub jwt: Option<String>,
    pub file_id: String,
    pub entity_id: String,
    pub k: u32,
    /// Request timeout in seconds. Unset means the target's own default.
    pub timeout: Option<f64>,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            jwt: None,
            file_id: "testid1".to_string(),
            entity_id: "promptfoo-tester".to_string(),
            k: 4,
            timeout: None,
        }
    }
}

impl DriverSettings {
    /// Defaults overlaid with `PROMPTFOO_RAG_BASE_URL`, `_JWT`, `_FILE_ID`,
    /// `_ENTITY_ID`, `_K` and `_TIMEOUT`.
    pub fn from_env() -> Result<Self> {
        Figment::from(Serialized::defaults(DriverSettings::default()))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| EvalError::Config(Box::new(e)))
    }

    fn timeout_or(&self, fallback_secs: f64) -> Duration {
        let fallback = Duration::from_secs_f64(fallback_secs);
        self.timeout
            .filter(|t| *t > 0.0)
            .and_then(|t| Duration::try_from_secs_f64(t).ok())
            .unwrap_or(fallback)
    }
}

/// Per-target settings, as written in the harness provider config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TargetConfig {
    pub base_url: Option<String>,
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub include_auth: Option<bool>,
    pub default_file_id: Option<String>,
    pub default_entity_id: Option<String>,
    pub default_k: Option<u32>,
    pub default_model: Option<String>,
    pub default_temperature: Option<f64>,
    /// Extra JSON fields merged over the generated body.
    pub body_extras: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeOptions {
    #[serde(default)]
    pub config: TargetConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeContext {
    #[serde(default)]
    pub vars: Map<String, Value>,
}

/// One driver invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProbeRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub options: ProbeOptions,
    #[serde(default)]
    pub context: ProbeContext,
}

impl ProbeRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_config(mut self, config: TargetConfig) -> Self {
        self.options.config = config;
        self
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.vars.insert(key.into(), value.into());
        self
    }

    pub fn config(&self) -> &TargetConfig {
        &self.options.config
    }

    /// The variable `key` when it is set to a truthy value.
    pub fn var(&self, key: &str) -> Option<&Value> {
        self.context.vars.get(key).filter(|v| is_truthy(v))
    }

    fn var_text(&self, key: &str) -> Option<String> {
        self.var(key).map(value_text)
    }
}

/// What a driver hands back to the harness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProviderResponse {
    pub fn success(output: impl Into<String>, raw: Value) -> Self {
        Self {
            output: output.into(),
            raw: Some(raw),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            output: String::new(),
            raw: None,
            error: Some(error.into()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Which service endpoint a driver exercises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Chat,
    Query,
    Embed,
    Text,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TargetKind::Chat => "chat",
            TargetKind::Query => "query",
            TargetKind::Embed => "embed",
            TargetKind::Text => "text",
        };
        f.write_str(name)
    }
}

impl FromStr for TargetKind {
    type Err = EvalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(TargetKind::Chat),
            "query" => Ok(TargetKind::Query),
            "embed" => Ok(TargetKind::Embed),
            "text" => Ok(TargetKind::Text),
            other => Err(EvalError::InvalidInput(format!(
                "Unknown target '{}' (expected chat, query, embed or text)",
                other
            ))),
        }
    }
}

#[async_trait]
pub trait Target: Send + Sync {
    fn kind(&self) -> TargetKind;

    /// Run one request. Never fails; problems are reported in the response.
    async fn call(&self, request: &ProbeRequest) -> ProviderResponse;
}

/// Build the driver for `kind`.
pub fn target_for(kind: TargetKind, settings: DriverSettings) -> Box<dyn Target> {
    match kind {
        TargetKind::Chat => Box::new(ChatTarget::new(settings)),
        TargetKind::Query => Box::new(QueryTarget::new(settings)),
        TargetKind::Embed => Box::new(EmbedTarget::new(settings)),
        TargetKind::Text => Box::new(TextTarget::new(settings)),
    }
}

/// Python-style truthiness: null, false, zero and empty values are unset.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Strings as-is, anything else as JSON text.
pub(crate) fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Request body for [`HttpDriver::send`].
pub(crate) enum Payload {
    Json(Value),
    Multipart(reqwest::multipart::Form),
}

/// Shared HTTP plumbing: URL and method resolution, auth, timeout and the
/// mapping of every outcome onto a parsed body or a failure response.
#[derive(Debug, Clone)]
pub(crate) struct HttpDriver {
    client: Client,
    settings: DriverSettings,
    default_endpoint: &'static str,
    default_timeout_secs: f64,
}

impl HttpDriver {
    pub(crate) fn new(
        settings: DriverSettings,
        default_endpoint: &'static str,
        default_timeout_secs: f64,
    ) -> Self {
        Self {
            client: Client::new(),
            settings,
            default_endpoint,
            default_timeout_secs,
        }
    }

    pub(crate) fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    pub(crate) fn url(&self, config: &TargetConfig) -> String {
        let base = config
            .base_url
            .as_deref()
            .unwrap_or(&self.settings.base_url)
            .trim_end_matches('/');
        let endpoint = config.endpoint.as_deref().unwrap_or(self.default_endpoint);
        format!("{}{}", base, endpoint)
    }

    /// Send `payload` and return the response body, parsed as JSON when
    /// possible and as a JSON string otherwise.
    pub(crate) async fn send(
        &self,
        request: &ProbeRequest,
        payload: Payload,
    ) -> std::result::Result<Value, ProviderResponse> {
        let config = request.config();
        let url = self.url(config);
        let method_name = config.method.as_deref().unwrap_or("POST").to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ProviderResponse::failure(format!("Invalid method: {}", method_name)))?;

        let mut builder = self
            .client
            .request(method, &url)
            .timeout(self.settings.timeout_or(self.default_timeout_secs));
        if config.include_auth.unwrap_or(true)
            && let Some(token) = self.settings.jwt.as_deref().filter(|t| !t.is_empty())
        {
            builder = builder.bearer_auth(token);
        }
        builder = match payload {
            Payload::Json(body) => builder.json(&body),
            Payload::Multipart(form) => builder.multipart(form),
        };

        debug!(
            url = %url,
            method = %method_name,
            prompt = %truncate_for_log(&request.prompt, 50),
            "Sending probe"
        );

        let response = builder.send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Probe transport error");
            ProviderResponse::failure(e.to_string())
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| {
            warn!(url = %url, error = %e, "Failed to read probe response");
            ProviderResponse::failure(e.to_string())
        })?;

        if !status.is_success() {
            warn!(url = %url, status = status.as_u16(), "Probe returned an error status");
            return Err(ProviderResponse::failure(format!(
                "HTTP {}: {}",
                status.as_u16(),
                text
            )));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}
