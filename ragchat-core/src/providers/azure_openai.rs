//! Azure OpenAI chat-completions provider.
//!
//! Sends `[system, user]` messages to a deployment's chat-completions route.
//! Auth is via the `api-key` header.

use super::{LlmProvider, RetryConfig, map_transport_error, with_retry};
use crate::config::{AzureConfig, ProvidersConfig};
use crate::credentials::CredentialSource;
use crate::error::{LlmError, RagError};
use crate::prompt::PromptStyle;
use crate::types::{ChatMessage, PromptPayload};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub struct AzureOpenAiProvider {
    client: Client,
    url: String,
    api_key: String,
    label: String,
    max_tokens: u32,
    timeout_secs: u64,
    retry: RetryConfig,
}

impl std::fmt::Debug for AzureOpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureOpenAiProvider")
            .field("url", &self.url)
            .field("label", &self.label)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl AzureOpenAiProvider {
    /// Build the provider, reading the key and optional endpoint override
    /// from `credentials`.
    ///
    /// Returns `RagError::ConfigurationMissing` when the key variable is unset.
    pub fn from_config(
        azure: &AzureConfig,
        shared: &ProvidersConfig,
        credentials: &dyn CredentialSource,
    ) -> Result<Self, RagError> {
        let api_key =
            credentials
                .get(&azure.api_key_env)
                .ok_or_else(|| RagError::ConfigurationMissing {
                    provider: azure.label.clone(),
                    variable: azure.api_key_env.clone(),
                })?;
        let endpoint = credentials
            .get(&azure.endpoint_env)
            .unwrap_or_else(|| azure.endpoint.clone());
        Self::new_with_key(azure, shared, &endpoint, api_key)
    }

    /// Build the provider with an explicitly resolved endpoint and key.
    pub fn new_with_key(
        azure: &AzureConfig,
        shared: &ProvidersConfig,
        endpoint: &str,
        api_key: String,
    ) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(shared.request_timeout_secs))
            .build()
            .map_err(|e| RagError::unexpected(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: Self::chat_url(endpoint, &azure.deployment, &azure.api_version),
            api_key,
            label: azure.label.clone(),
            max_tokens: shared.max_output_tokens,
            timeout_secs: shared.request_timeout_secs,
            retry: shared.retry.clone(),
        })
    }

    fn chat_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        )
    }

    fn build_request_body(messages: &[ChatMessage], temperature: f32, max_tokens: u32) -> Value {
        json!({
            "messages": messages,
            "temperature": temperature,
            "max_tokens": max_tokens,
        })
    }

    /// Extract `choices[0].message.content`.
    fn parse_response(body: &Value) -> Result<String, LlmError> {
        let message = body
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .ok_or_else(|| LlmError::ResponseParse {
                message: "No choices in response".to_string(),
            })?;
        // Content filtering can yield a choice with null content.
        match message.get("content").and_then(|c| c.as_str()) {
            Some(text) if !text.trim().is_empty() => Ok(text.to_string()),
            _ => {
                let reason = body["choices"][0]["finish_reason"]
                    .as_str()
                    .unwrap_or("unknown");
                Err(LlmError::ResponseParse {
                    message: format!("Empty completion (finish_reason: {})", reason),
                })
            }
        }
    }

    fn map_http_error(status: reqwest::StatusCode, body: &str) -> LlmError {
        match status.as_u16() {
            401 | 403 => {
                debug!(body = %body, "Authentication failed");
                LlmError::AuthFailed {
                    provider: "Azure OpenAI".to_string(),
                }
            }
            429 => {
                // "... Please retry after 12 seconds."
                let retry_secs = body
                    .split("retry after ")
                    .nth(1)
                    .and_then(|rest| rest.split_whitespace().next())
                    .and_then(|n| n.parse::<u64>().ok())
                    .unwrap_or(5);
                LlmError::RateLimited {
                    retry_after_secs: retry_secs,
                }
            }
            _ => LlmError::ApiRequest {
                message: format!("HTTP {}: {}", status, body),
            },
        }
    }

    async fn send_once(&self, body: &Value) -> Result<String, LlmError> {
        let response = self
            .client
            .post(&self.url)
            .header("api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| map_transport_error(e, self.timeout_secs))?;

        let status = response.status();
        let response_body = response.text().await.map_err(|e| LlmError::ApiRequest {
            message: format!("Failed to read response body: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::map_http_error(status, &response_body));
        }

        let json: Value =
            serde_json::from_str(&response_body).map_err(|e| LlmError::ResponseParse {
                message: format!("Invalid JSON: {}", e),
            })?;
        Self::parse_response(&json)
    }
}

#[async_trait]
impl LlmProvider for AzureOpenAiProvider {
    fn label(&self) -> &str {
        &self.label
    }

    fn prompt_style(&self) -> PromptStyle {
        PromptStyle::Messages
    }

    async fn generate(
        &self,
        payload: &PromptPayload,
        temperature: f32,
    ) -> Result<String, LlmError> {
        let messages = match payload {
            PromptPayload::Messages(msgs) => msgs.clone(),
            PromptPayload::Prompt(text) => vec![ChatMessage::user(text.clone())],
        };
        let body = Self::build_request_body(&messages, temperature, self.max_tokens);

        debug!(url = %self.url, messages = messages.len(), "Sending Azure OpenAI request");
        with_retry(&self.retry, || self.send_once(&body)).await
    }
}
