//! Google Gemini API provider.
//!
//! Key differences from the Azure provider:
//! - Takes one instruction string; message payloads are flattened
//! - Auth via the `x-goog-api-key` header, so the key never appears in a URL
//! - Output limits live under `generationConfig`

use super::{LlmProvider, RetryConfig, map_transport_error, with_retry};
use crate::config::{GeminiConfig, ProvidersConfig};
use crate::credentials::CredentialSource;
use crate::error::{LlmError, RagError};
use crate::prompt::PromptStyle;
use crate::types::PromptPayload;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    label: String,
    max_output_tokens: u32,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GeminiProvider {
    /// Create a new Gemini provider, reading the key from `credentials`.
    ///
    /// Returns `RagError::ConfigurationMissing` if the key variable is not set.
    pub fn from_config(
        gemini: &GeminiConfig,
        shared: &ProvidersConfig,
        credentials: &dyn CredentialSource,
    ) -> Result<Self, RagError> {
        let api_key =
            credentials
                .get(&gemini.api_key_env)
                .ok_or_else(|| RagError::ConfigurationMissing {
                    provider: gemini.label.clone(),
                    variable: gemini.api_key_env.clone(),
                })?;
        Self::new_with_key(gemini, shared, api_key)
    }

    /// Create a new Gemini provider with an explicitly provided API key.
    pub fn new_with_key(
        gemini: &GeminiConfig,
        shared: &ProvidersConfig,
        api_key: String,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(shared.request_timeout_secs))
            .build()
            .map_err(|e| RagError::unexpected(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: gemini.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: gemini.model.clone(),
            label: gemini.label.clone(),
            max_output_tokens: shared.max_output_tokens,
            timeout_secs: shared.request_timeout_secs,
            retry: shared.retry.clone(),
        })
    }

    fn endpoint_url(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }

    fn build_request_body(prompt: &str, temperature: f32, max_output_tokens: u32) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{"text": prompt}],
            }],
            "generationConfig": {
                "temperature": temperature,
                "maxOutputTokens": max_output_tokens,
            },
        })
    }

    /// Concatenate the text parts of the first candidate.
    fn parse_response(body: &Value) -> Result<String, LlmError> {
        let candidates = body["candidates"].as_array();
        let Some(candidate) = candidates.and_then(|c| c.first()) else {
            if let Some(reason) = body["promptFeedback"]["blockReason"].as_str() {
                return Err(LlmError::ResponseParse {
                    message: format!("Prompt blocked: {}", reason),
                });
            }
            return Err(LlmError::ResponseParse {
                message: "Missing 'candidates' array in response".to_string(),
            });
        };

        let parts = candidate["content"]["parts"]
            .as_array()
            .ok_or_else(|| LlmError::ResponseParse {
                message: "Missing 'parts' array in candidate content".to_string(),
            })?;

        let text = parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("");
        if text.trim().is_empty() {
            let reason = candidate["finishReason"].as_str().unwrap_or("unknown");
            return Err(LlmError::ResponseParse {
                message: format!("Candidate has no text (finishReason: {})", reason),
            });
        }
        Ok(text)
    }

    fn map_http_error(status: reqwest::StatusCode, body_text: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => LlmError::AuthFailed {
                provider: "Gemini".to_string(),
            },
            429 => LlmError::RateLimited {
                retry_after_secs: 30,
            },
            _ => LlmError::ApiRequest {
                message: format!("HTTP {} from Gemini API: {}", status, body_text),
            },
        }
    }

    async fn send_once(&self, url: &str, body: &Value) -> Result<String, LlmError> {
        let response = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let body_text = response.text().await.map_err(|e| LlmError::ResponseParse {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &body_text));
        }

        let response_json: Value =
            serde_json::from_str(&body_text).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON in response: {}", e),
            })?;
        Self::parse_response(&response_json)
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn prompt_style(&self) -> PromptStyle {
        PromptStyle::SinglePrompt
    }

    async fn generate(
        &self,
        payload: &PromptPayload,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let prompt = payload.to_single_prompt();
        let body = Self::build_request_body(&prompt, temperature, self.max_output_tokens);
        let url = self.endpoint_url();

        debug!(model = %self.model, url = %url, "Sending Gemini request");
        with_retry(&self.retry, || self.send_once(&url, &body)).await
    }
}
