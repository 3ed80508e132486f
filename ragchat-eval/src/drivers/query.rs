//! Driver for the raw retrieval endpoint (`POST /query` by default).

use super::{DriverSettings, HttpDriver, Payload, ProbeRequest, ProviderResponse, Target, TargetKind};
use async_trait::async_trait;
use serde_json::{Map, Value, json};

pub struct QueryTarget {
    http: HttpDriver,
}

impl QueryTarget {
    pub fn new(settings: DriverSettings) -> Self {
        Self {
            http: HttpDriver::new(settings, "/query", 30.0),
        }
    }

    pub fn build_body(&self, request: &ProbeRequest) -> Value {
        let config = request.config();
        let settings = self.http.settings();
        let mut body = Map::new();
        body.insert("query".into(), json!(request.prompt));
        body.insert(
            "file_id".into(),
            request
                .var("file_id")
                .cloned()
                .or_else(|| config.default_file_id.clone().filter(|s| !s.is_empty()).map(Value::from))
                .unwrap_or_else(|| json!(settings.file_id)),
        );
        body.insert(
            "entity_id".into(),
            request
                .var("entity_id")
                .cloned()
                .or_else(|| config.default_entity_id.clone().filter(|s| !s.is_empty()).map(Value::from))
                .unwrap_or_else(|| json!(settings.entity_id)),
        );
        body.insert(
            "k".into(),
            request
                .var("k")
                .cloned()
                .or_else(|| config.default_k.filter(|k| *k > 0).map(Value::from))
                .unwrap_or_else(|| json!(settings.k)),
        );
        if let Some(extras) = &config.body_extras {
            body.extend(extras.clone());
        }
        Value::Object(body)
    }
}

#[async_trait]
impl Target for QueryTarget {
    fn kind(&self) -> TargetKind {
        TargetKind::Query
    }

    async fn call(&self, request: &ProbeRequest) -> ProviderResponse {
        let body = self.build_body(request);
        match self.http.send(request, Payload::Json(body)).await {
            Ok(parsed) => ProviderResponse::success(extract_text(&parsed), parsed),
            Err(failure) => failure,
        }
    }
}

/// A representative snippet of a retrieval response: the first document's
/// `page_content` when present, otherwise JSON text.
pub fn extract_text(parsed: &Value) -> String {
    match parsed {
        Value::Array(items) if !items.is_empty() => match &items[0] {
            Value::Array(pair) if !pair.is_empty() => page_content_or_json(&pair[0]),
            first => page_content_or_json(first),
        },
        Value::String(s) => s.clone(),
        other => page_content_or_json(other),
    }
}

fn page_content_or_json(value: &Value) -> String {
    value
        .get("page_content")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::TargetConfig;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_from_document_score_pairs() {
        let parsed = json!([[{"page_content": "Refunds within 30 days.", "metadata": {}}, 0.91]]);
        assert_eq!(extract_text(&parsed), "Refunds within 30 days.");
    }

    #[test]
    fn test_extract_from_flat_document_list() {
        let parsed = json!([{"page_content": "flat"}]);
        assert_eq!(extract_text(&parsed), "flat");
    }

    #[test]
    fn test_extract_falls_back_to_json() {
        assert_eq!(extract_text(&json!([[{"other": 1}, 0.5]])), r#"{"other":1}"#);
        assert_eq!(extract_text(&json!([[7, 0.5]])), "7");
        assert_eq!(extract_text(&json!([])), "[]");
        assert_eq!(extract_text(&json!({"detail": "nope"})), r#"{"detail":"nope"}"#);
        assert_eq!(extract_text(&json!("plain text")), "plain text");
        assert_eq!(extract_text(&json!(42)), "42");
    }

    #[test]
    fn test_body_uses_environment_defaults() {
        let target = QueryTarget::new(DriverSettings::default());
        let body = target.build_body(&ProbeRequest::new("What is the refund policy?"));
        assert_eq!(
            body,
            json!({
                "query": "What is the refund policy?",
                "file_id": "testid1",
                "entity_id": "promptfoo-tester",
                "k": 4
            })
        );
    }

    #[test]
    fn test_body_resolution_order() {
        let target = QueryTarget::new(DriverSettings::default());
        let config = TargetConfig {
            default_file_id: Some("config-doc".into()),
            default_k: Some(2),
            body_extras: Some(json!({"k": 9, "debug": true}).as_object().unwrap().clone()),
            ..Default::default()
        };
        let request = ProbeRequest::new("q")
            .with_config(config)
            .with_var("file_id", "var-doc")
            .with_var("entity_id", "");
        let body = target.build_body(&request);
        assert_eq!(body["file_id"], "var-doc");
        assert_eq!(body["entity_id"], "promptfoo-tester");
        // Extras win over generated fields.
        assert_eq!(body["k"], 9);
        assert_eq!(body["debug"], true);
    }
}
