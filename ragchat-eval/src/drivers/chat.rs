//! Driver for the answer endpoint (`POST /chat` by default).

use super::{
    DriverSettings, HttpDriver, Payload, ProbeRequest, ProviderResponse, Target, TargetKind,
    extract_text,
};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub const DEFAULT_MODEL: &str = "azure-gpt4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.7;

pub struct ChatTarget {
    http: HttpDriver,
}

impl ChatTarget {
    pub fn new(settings: DriverSettings) -> Self {
        Self {
            http: HttpDriver::new(settings, "/chat", 30.0),
        }
    }

    pub fn build_body(&self, request: &ProbeRequest) -> Value {
        let config = request.config();
        let settings = self.http.settings();
        let text_or = |key: &str, configured: &Option<String>, fallback: &str| -> Value {
            request
                .var(key)
                .cloned()
                .or_else(|| configured.clone().filter(|s| !s.is_empty()).map(Value::from))
                .unwrap_or_else(|| json!(fallback))
        };

        let mut body = Map::new();
        body.insert("query".into(), json!(request.prompt));
        body.insert(
            "file_id".into(),
            text_or("file_id", &config.default_file_id, &settings.file_id),
        );
        body.insert(
            "model".into(),
            text_or("model", &config.default_model, DEFAULT_MODEL),
        );
        body.insert(
            "k".into(),
            request
                .var("k")
                .cloned()
                .or_else(|| config.default_k.filter(|k| *k > 0).map(Value::from))
                .unwrap_or_else(|| json!(settings.k)),
        );
        // Zero is a valid temperature, so presence decides here.
        body.insert(
            "temperature".into(),
            request
                .context
                .vars
                .get("temperature")
                .filter(|v| !v.is_null())
                .cloned()
                .or_else(|| config.default_temperature.map(Value::from))
                .unwrap_or_else(|| json!(DEFAULT_TEMPERATURE)),
        );
        body.insert(
            "entity_id".into(),
            text_or("entity_id", &config.default_entity_id, &settings.entity_id),
        );
        if let Some(extras) = &config.body_extras {
            body.extend(extras.clone());
        }
        Value::Object(body)
    }
}

#[async_trait]
impl Target for ChatTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Chat
    }

    async fn call(&self, request: &ProbeRequest) -> ProviderResponse {
        let body = self.build_body(request);
        match self.http.send(request, Payload::Json(body)).await {
            Ok(parsed) => {
                let output = match parsed.get("answer") {
                    Some(Value::String(answer)) => answer.clone(),
                    _ => extract_text(&parsed),
                };
                ProviderResponse::success(output, parsed)
            }
            Err(failure) => failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::TargetConfig;

    #[test]
    fn test_default_body() {
        let target = ChatTarget::new(DriverSettings::default());
        let body = target.build_body(&ProbeRequest::new("What is the refund policy?"));
        assert_eq!(body["query"], "What is the refund policy?");
        assert_eq!(body["file_id"], "testid1");
        assert_eq!(body["model"], "azure-gpt4o-mini");
        assert_eq!(body["k"], 4);
        assert_eq!(body["temperature"], 0.7);
        assert_eq!(body["entity_id"], "promptfoo-tester");
    }

    #[test]
    fn test_zero_temperature_var_is_kept() {
        let target = ChatTarget::new(DriverSettings::default());
        let request = ProbeRequest::new("q").with_var("temperature", 0.0);
        assert_eq!(target.build_body(&request)["temperature"], 0.0);
    }

    #[test]
    fn test_config_model_and_temperature() {
        let target = ChatTarget::new(DriverSettings::default());
        let config = TargetConfig {
            default_model: Some("gemini".into()),
            default_temperature: Some(1.5),
            ..Default::default()
        };
        let body = target.build_body(&ProbeRequest::new("q").with_config(config));
        assert_eq!(body["model"], "gemini");
        assert_eq!(body["temperature"], 1.5);
    }
}
