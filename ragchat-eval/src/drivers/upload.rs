//! Multipart upload drivers for the ingestion endpoints.
//!
//! Both send the prompt as a `text/plain` file alongside `file_id` and
//! `entity_id` form fields; they differ only in endpoint, defaults and how
//! the reply is summarised.

use super::{
    DriverSettings, HttpDriver, Payload, ProbeRequest, ProviderResponse, Target, TargetKind,
    is_truthy, value_text,
};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;

pub const DEFAULT_FILENAME: &str = "test.txt";

struct UploadDefaults {
    file_id: &'static str,
    entity_id: &'static str,
}

fn build_form(request: &ProbeRequest, defaults: &UploadDefaults) -> Result<Form, reqwest::Error> {
    let config = request.config();
    let field = |key: &str, configured: &Option<String>, fallback: &str| -> String {
        request
            .var_text(key)
            .or_else(|| configured.clone().filter(|s| !s.is_empty()))
            .unwrap_or_else(|| fallback.to_string())
    };
    let file_id = field("file_id", &config.default_file_id, defaults.file_id);
    let entity_id = field("entity_id", &config.default_entity_id, defaults.entity_id);
    let filename = request
        .var_text("filename")
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string());

    let file = Part::bytes(request.prompt.clone().into_bytes())
        .file_name(filename)
        .mime_str("text/plain")?;
    Ok(Form::new()
        .text("file_id", file_id)
        .text("entity_id", entity_id)
        .part("file", file))
}

async fn upload(
    http: &HttpDriver,
    request: &ProbeRequest,
    defaults: &UploadDefaults,
) -> Result<Value, ProviderResponse> {
    let form = build_form(request, defaults).map_err(|e| ProviderResponse::failure(e.to_string()))?;
    http.send(request, Payload::Multipart(form)).await
}

/// Uploads the prompt to `/embed` for chunking and indexing.
pub struct EmbedTarget {
    http: HttpDriver,
}

impl EmbedTarget {
    const DEFAULTS: UploadDefaults = UploadDefaults {
        file_id: "promptfoo-embed-test",
        entity_id: "promptfoo-embed",
    };

    pub fn new(settings: DriverSettings) -> Self {
        Self {
            http: HttpDriver::new(settings, "/embed", 60.0),
        }
    }
}

/// `"Upload succeeded: …"` or `"Upload failed: …"` from `{status, message}`.
pub fn summarize_embed(parsed: &Value) -> String {
    match parsed {
        Value::Object(map) => {
            let succeeded = map.get("status").is_some_and(is_truthy);
            let message = map.get("message").map(value_text).unwrap_or_default();
            format!(
                "Upload {}: {}",
                if succeeded { "succeeded" } else { "failed" },
                message
            )
        }
        other => value_text(other),
    }
}

#[async_trait]
impl Target for EmbedTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Embed
    }

    async fn call(&self, request: &ProbeRequest) -> ProviderResponse {
        match upload(&self.http, request, &Self::DEFAULTS).await {
            Ok(parsed) => ProviderResponse::success(summarize_embed(&parsed), parsed),
            Err(failure) => failure,
        }
    }
}

/// Uploads the prompt to `/text` and reports the extracted text.
pub struct TextTarget {
    http: HttpDriver,
}

impl TextTarget {
    const DEFAULTS: UploadDefaults = UploadDefaults {
        file_id: "promptfoo-text-test",
        entity_id: "promptfoo-text",
    };

    pub fn new(settings: DriverSettings) -> Self {
        Self {
            http: HttpDriver::new(settings, "/text", 60.0),
        }
    }
}

pub fn summarize_text(parsed: &Value) -> String {
    match parsed {
        Value::Object(map) => map
            .get("text")
            .filter(|v| !v.is_null())
            .map(value_text)
            .unwrap_or_default(),
        other => value_text(other),
    }
}

#[async_trait]
impl Target for TextTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Text
    }

    async fn call(&self, request: &ProbeRequest) -> ProviderResponse {
        match upload(&self.http, request, &Self::DEFAULTS).await {
            Ok(parsed) => ProviderResponse::success(summarize_text(&parsed), parsed),
            Err(failure) => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_embed_summary() {
        assert_eq!(
            summarize_embed(&json!({"status": true, "message": "stored 3 chunks"})),
            "Upload succeeded: stored 3 chunks"
        );
        assert_eq!(
            summarize_embed(&json!({"status": false, "message": "unsupported type"})),
            "Upload failed: unsupported type"
        );
        assert_eq!(summarize_embed(&json!({})), "Upload failed: ");
        assert_eq!(summarize_embed(&json!("accepted")), "accepted");
    }

    #[test]
    fn test_text_summary() {
        assert_eq!(summarize_text(&json!({"text": "hello"})), "hello");
        assert_eq!(summarize_text(&json!({"other": 1})), "");
        assert_eq!(summarize_text(&json!(["a"])), r#"["a"]"#);
    }

    #[test]
    fn test_form_builds_with_defaults() {
        let form = build_form(&ProbeRequest::new("file body"), &EmbedTarget::DEFAULTS);
        assert!(form.is_ok());
    }
}
