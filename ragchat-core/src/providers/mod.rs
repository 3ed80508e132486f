//! LLM provider gateway.
//!
//! Provides concrete implementations of the `LlmProvider` trait for:
//! - Azure OpenAI chat completions (message-based prompts)
//! - Google Gemini `generateContent` (single-prompt)
//!
//! Providers are reached through a [`ProviderRegistry`] keyed by the value a
//! client sends in the `model` field. Each registered slot builds its provider
//! on first use, so a missing credential surfaces on the request that needs
//! it rather than at process start.

pub mod azure_openai;
pub mod gemini;
pub mod mock;

use crate::config::ProvidersConfig;
use crate::credentials::CredentialSource;
use crate::error::{LlmError, RagError};
use crate::prompt::PromptStyle;
use crate::types::{PromptPayload, validate_temperature};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

pub use crate::config::RetryConfig;
pub use azure_openai::AzureOpenAiProvider;
pub use gemini::GeminiProvider;
pub use mock::MockProvider;

/// A text-generation backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Human-readable name reported as `model_used`.
    fn label(&self) -> &str;

    /// The request shape this provider expects.
    fn prompt_style(&self) -> PromptStyle;

    /// Generate an answer for `payload`.
    async fn generate(&self, payload: &PromptPayload, temperature: f32)
    -> Result<String, LlmError>;
}

/// Builds a provider instance; called at most until it first succeeds.
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn LlmProvider>, RagError> + Send + Sync>;

/// One registered provider: its key, label and lazily built instance.
pub struct ProviderSlot {
    key: String,
    label: String,
    factory: ProviderFactory,
    instance: OnceCell<Arc<dyn LlmProvider>>,
}

impl std::fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("key", &self.key)
            .field("label", &self.label)
            .field("initialized", &self.instance.initialized())
            .finish()
    }
}

impl ProviderSlot {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The shared provider instance, built on first call.
    ///
    /// A failed build is not remembered; the next call tries again.
    pub async fn instance(&self) -> Result<Arc<dyn LlmProvider>, RagError> {
        self.instance
            .get_or_try_init(|| async {
                tracing::debug!(provider = %self.key, "Initializing provider");
                (self.factory)()
            })
            .await
            .cloned()
    }

    /// Generate with this provider, applying the shared temperature policy.
    pub async fn generate(
        &self,
        payload: &PromptPayload,
        temperature: f32,
    ) -> Result<String, RagError> {
        validate_temperature(temperature)?;
        let provider = self.instance().await?;
        provider
            .generate(payload, temperature)
            .await
            .map_err(|e| e.into_generation_failure(&self.label))
    }
}

/// Provider key → slot, plus the key used when a request names none.
#[derive(Debug)]
pub struct ProviderRegistry {
    default_key: String,
    slots: HashMap<String, ProviderSlot>,
}

impl ProviderRegistry {
    pub fn new(default_key: impl Into<String>) -> Self {
        Self {
            default_key: default_key.into(),
            slots: HashMap::new(),
        }
    }

    /// Register a provider built lazily by `factory`. Replaces an existing key.
    pub fn register(
        &mut self,
        key: impl Into<String>,
        label: impl Into<String>,
        factory: ProviderFactory,
    ) {
        let key = key.into();
        self.slots.insert(
            key.clone(),
            ProviderSlot {
                key,
                label: label.into(),
                factory,
                instance: OnceCell::new(),
            },
        );
    }

    /// Register an already constructed provider under `key`.
    pub fn register_provider(&mut self, key: impl Into<String>, provider: Arc<dyn LlmProvider>) {
        let label = provider.label().to_string();
        self.register(key, label, Box::new(move || Ok(Arc::clone(&provider))));
    }

    /// The registry used by the service: Azure OpenAI and Gemini, credentials
    /// resolved through `credentials` when each is first used.
    pub fn from_config(config: &ProvidersConfig, credentials: Arc<dyn CredentialSource>) -> Self {
        for warning in config.validate() {
            tracing::warn!(warning = %warning, "Provider configuration");
        }

        let mut registry = Self::new(config.default_provider.clone());

        let shared = config.clone();
        let creds = Arc::clone(&credentials);
        registry.register(
            config.azure.key.clone(),
            config.azure.label.clone(),
            Box::new(move || {
                let provider =
                    AzureOpenAiProvider::from_config(&shared.azure, &shared, creds.as_ref())?;
                Ok(Arc::new(provider) as Arc<dyn LlmProvider>)
            }),
        );

        let shared = config.clone();
        let creds = credentials;
        registry.register(
            config.gemini.key.clone(),
            config.gemini.label.clone(),
            Box::new(move || {
                let provider =
                    GeminiProvider::from_config(&shared.gemini, &shared, creds.as_ref())?;
                Ok(Arc::new(provider) as Arc<dyn LlmProvider>)
            }),
        );

        registry
    }

    pub fn default_key(&self) -> &str {
        &self.default_key
    }

    /// Look up the slot for `key`, or for the default key when `None`.
    pub fn resolve(&self, key: Option<&str>) -> Result<&ProviderSlot, RagError> {
        let key = key.unwrap_or(self.default_key.as_str());
        self.slots
            .get(key)
            .ok_or_else(|| RagError::UnsupportedProvider {
                provider: key.to_string(),
            })
    }

    /// Resolve `key` and generate in one step.
    pub async fn generate(
        &self,
        key: Option<&str>,
        payload: &PromptPayload,
        temperature: f32,
    ) -> Result<String, RagError> {
        self.resolve(key)?.generate(payload, temperature).await
    }

    /// Registered keys, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.slots.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

/// Map a reqwest transport failure onto the retry-aware error variants.
pub(crate) fn map_transport_error(err: reqwest::Error, timeout_secs: u64) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout { timeout_secs }
    } else if err.is_connect() {
        LlmError::Connection {
            message: err.to_string(),
        }
    } else {
        LlmError::ApiRequest {
            message: format!("Request failed: {}", err),
        }
    }
}

/// Execute an async operation with exponential backoff retry on transient errors.
///
/// Retries on `LlmError::RateLimited` (respects `retry_after_secs`),
/// `LlmError::Connection`, and `LlmError::Timeout`. Permanent errors return immediately.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut last_err = None;
    for attempt in 0..=config.max_retries {
        match operation().await {
            Ok(val) => return Ok(val),
            Err(e) => {
                if !is_retryable(&e) || attempt == config.max_retries {
                    return Err(e);
                }

                let backoff_ms = compute_backoff(config, attempt, &e);
                tracing::warn!(
                    attempt = attempt + 1,
                    max = config.max_retries,
                    backoff_ms = backoff_ms,
                    error = %e,
                    "Retrying after transient error"
                );
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| LlmError::Connection {
        message: "All retry attempts exhausted".to_string(),
    }))
}

fn is_retryable(err: &LlmError) -> bool {
    matches!(
        err,
        LlmError::RateLimited { .. } | LlmError::Connection { .. } | LlmError::Timeout { .. }
    )
}

/// Backoff for `attempt`, never shorter than a server-sent retry-after.
fn compute_backoff(config: &RetryConfig, attempt: u32, err: &LlmError) -> u64 {
    let computed = compute_exponential_backoff(config, attempt);
    if let LlmError::RateLimited { retry_after_secs } = err {
        return (retry_after_secs * 1000).max(computed);
    }
    computed
}

fn compute_exponential_backoff(config: &RetryConfig, attempt: u32) -> u64 {
    let base = config.initial_backoff_ms as f64 * config.backoff_multiplier.powi(attempt as i32);
    let capped = base.min(config.max_backoff_ms as f64) as u64;
    if config.jitter {
        // Up to 25% extra.
        let jitter = (capped as f64 * 0.25 * jitter_fraction()) as u64;
        capped + jitter
    } else {
        capped
    }
}

/// Cheap jitter source in `[0, 1)` from the clock's sub-second nanos.
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticCredentials;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn payload() -> PromptPayload {
        PromptPayload::Prompt("Answer from sources.".into())
    }

    #[test]
    fn test_from_config_registers_both_providers() {
        let registry = ProviderRegistry::from_config(
            &ProvidersConfig::default(),
            Arc::new(StaticCredentials::new()),
        );
        assert_eq!(registry.keys(), vec!["azure-gpt4o-mini", "gemini"]);
        assert_eq!(registry.default_key(), "azure-gpt4o-mini");
        assert_eq!(registry.resolve(None).unwrap().label(), "Azure GPT-4o-mini");
        assert_eq!(
            registry.resolve(Some("gemini")).unwrap().label(),
            "Google Gemini Pro"
        );
    }

    #[test]
    fn test_resolve_unknown_key() {
        let registry = ProviderRegistry::new("azure-gpt4o-mini");
        let err = registry.resolve(Some("nonexistent-model")).unwrap_err();
        assert_eq!(err.to_string(), "Unsupported model: nonexistent-model");
    }

    #[tokio::test]
    async fn test_missing_credential_surfaces_on_first_use() {
        let registry = ProviderRegistry::from_config(
            &ProvidersConfig::default(),
            Arc::new(StaticCredentials::new()),
        );
        let err = registry
            .generate(Some("gemini"), &payload(), 0.7)
            .await
            .unwrap_err();
        match err {
            RagError::ConfigurationMissing { provider, variable } => {
                assert_eq!(provider, "Google Gemini Pro");
                assert_eq!(variable, "GEMINI_API_KEY");
            }
            other => panic!("Expected ConfigurationMissing, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_init_is_not_cached() {
        let creds = Arc::new(StaticCredentials::new());
        let registry = ProviderRegistry::from_config(&ProvidersConfig::default(), creds.clone());
        let slot = registry.resolve(Some("gemini")).unwrap();
        assert!(slot.instance().await.is_err());

        creds.set("GEMINI_API_KEY", "test-gemini-key");
        let provider = slot.instance().await.unwrap();
        assert_eq!(provider.label(), "Google Gemini Pro");
        assert_eq!(provider.prompt_style(), PromptStyle::SinglePrompt);
    }

    #[tokio::test]
    async fn test_instance_is_shared() {
        let builds = Arc::new(AtomicU32::new(0));
        let counter = builds.clone();
        let mut registry = ProviderRegistry::new("mock");
        registry.register(
            "mock",
            "Mock",
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(MockProvider::new("Mock", PromptStyle::Messages)) as Arc<dyn LlmProvider>)
            }),
        );
        let slot = registry.resolve(None).unwrap();
        slot.instance().await.unwrap();
        slot.instance().await.unwrap();
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_generate_rejects_out_of_range_temperature() {
        let mock = Arc::new(MockProvider::new("Mock", PromptStyle::Messages));
        let mut registry = ProviderRegistry::new("mock");
        registry.register_provider("mock", mock.clone());

        assert!(registry.generate(None, &payload(), 0.0).await.is_ok());
        assert!(registry.generate(None, &payload(), 2.0).await.is_ok());
        let err = registry.generate(None, &payload(), 2.5).await.unwrap_err();
        assert!(matches!(err, RagError::InvalidRequest { .. }));
        // The rejected call never reached the provider.
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_upstream_message() {
        let mut registry = ProviderRegistry::new("mock");
        registry.register_provider(
            "mock",
            Arc::new(MockProvider::failing("Mock", "HTTP 503: overloaded")),
        );
        let err = registry.generate(None, &payload(), 0.7).await.unwrap_err();
        match err {
            RagError::GenerationFailure { provider, message } => {
                assert_eq!(provider, "Mock");
                assert!(message.contains("HTTP 503: overloaded"));
            }
            other => panic!("Expected GenerationFailure, got {:?}", other),
        }
    }

    #[test]
    fn test_is_retryable() {
        assert!(is_retryable(&LlmError::RateLimited {
            retry_after_secs: 30
        }));
        assert!(is_retryable(&LlmError::Connection {
            message: "reset".into()
        }));
        assert!(is_retryable(&LlmError::Timeout { timeout_secs: 30 }));
        assert!(!is_retryable(&LlmError::AuthFailed {
            provider: "test".into()
        }));
        assert!(!is_retryable(&LlmError::ResponseParse {
            message: "bad json".into()
        }));
    }

    #[test]
    fn test_compute_backoff_exponential_and_capped() {
        let config = RetryConfig {
            max_retries: 3,
            initial_backoff_ms: 1000,
            max_backoff_ms: 3000,
            backoff_multiplier: 2.0,
            jitter: false,
        };
        assert_eq!(compute_exponential_backoff(&config, 0), 1000);
        assert_eq!(compute_exponential_backoff(&config, 1), 2000);
        assert_eq!(compute_exponential_backoff(&config, 2), 3000);
    }

    #[test]
    fn test_compute_backoff_rate_limit_uses_server_value() {
        let config = RetryConfig {
            jitter: false,
            ..Default::default()
        };
        let err = LlmError::RateLimited {
            retry_after_secs: 30,
        };
        assert_eq!(compute_backoff(&config, 0, &err), 30_000);
    }

    #[tokio::test]
    async fn test_with_retry_recovers_from_transient_error() {
        let config = RetryConfig {
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 1.0,
            jitter: false,
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&config, || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(LlmError::Connection {
                        message: "reset".into(),
                    })
                } else {
                    Ok("answer")
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), "answer");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_with_retry_permanent_error_no_retry() {
        let config = RetryConfig {
            max_retries: 3,
            ..Default::default()
        };
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&config, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(LlmError::AuthFailed {
                    provider: "test".into(),
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
