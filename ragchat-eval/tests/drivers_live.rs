//! Drivers against in-process HTTP servers: a small echo service for the
//! upload and error paths, and the real ragchat gateway for `/chat` and
//! `/query`.

use axum::extract::Multipart;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use pretty_assertions::assert_eq;
use ragchat_core::gateway::{GatewayState, gateway_router};
use ragchat_core::retrieval::{ENTITY_ID_KEY, FILE_ID_KEY, InMemoryIndex, RetrievalClient};
use ragchat_core::{
    Document, Embedder, HashingEmbedder, MockProvider, PromptStyle, ProviderRegistry, RagPipeline,
};
use ragchat_eval::drivers::{ChatTarget, EmbedTarget, QueryTarget, TextTarget};
use ragchat_eval::{DriverSettings, ProbeRequest, Target, TargetConfig, TargetKind, target_for};
use serde_json::{Map, Value, json};
use std::sync::Arc;

async fn serve(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn auth_header(headers: &HeaderMap) -> Value {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(Value::from)
        .unwrap_or(Value::Null)
}

/// Collect every multipart field as `{name: {text, filename, content_type}}`.
async fn read_fields(mut multipart: Multipart) -> Map<String, Value> {
    let mut fields = Map::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let text = field.text().await.unwrap();
        fields.insert(
            name,
            json!({"text": text, "filename": filename, "content_type": content_type}),
        );
    }
    fields
}

async fn echo_service() -> String {
    let app = Router::new()
        .route(
            "/echo",
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                Json(json!({"body": body, "auth": auth_header(&headers)}))
            }),
        )
        .route(
            "/embed",
            post(|headers: HeaderMap, multipart: Multipart| async move {
                let fields = read_fields(multipart).await;
                let file_id = fields["file_id"]["text"].as_str().unwrap_or_default().to_string();
                Json(json!({
                    "status": true,
                    "message": format!("stored {}", file_id),
                    "fields": fields,
                    "auth": auth_header(&headers),
                }))
            }),
        )
        .route(
            "/embed-rejected",
            post(|_multipart: Multipart| async {
                Json(json!({"status": false, "message": "unsupported file type"}))
            }),
        )
        .route(
            "/text",
            post(|multipart: Multipart| async move {
                let fields = read_fields(multipart).await;
                Json(json!({"text": fields["file"]["text"], "fields": fields}))
            }),
        )
        .route(
            "/broken",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
    serve(app).await
}

fn settings_for(base_url: &str) -> DriverSettings {
    DriverSettings {
        base_url: base_url.to_string(),
        timeout: Some(5.0),
        ..DriverSettings::default()
    }
}

fn endpoint(path: &str) -> TargetConfig {
    TargetConfig {
        endpoint: Some(path.to_string()),
        ..Default::default()
    }
}

// --- Echo service ---

#[tokio::test]
async fn test_query_target_posts_resolved_body() {
    let base = echo_service().await;
    let target = QueryTarget::new(settings_for(&base));
    let request = ProbeRequest::new("What is the refund policy?")
        .with_config(endpoint("/echo"))
        .with_var("k", 2);
    let response = target.call(&request).await;

    assert!(!response.is_error());
    let raw = response.raw.unwrap();
    assert_eq!(
        raw["body"],
        json!({
            "query": "What is the refund policy?",
            "file_id": "testid1",
            "entity_id": "promptfoo-tester",
            "k": 2
        })
    );
    assert_eq!(raw["auth"], Value::Null);
}

#[tokio::test]
async fn test_bearer_token_respects_include_auth() {
    let base = echo_service().await;
    let settings = DriverSettings {
        jwt: Some("test-token".into()),
        ..settings_for(&base)
    };
    let target = QueryTarget::new(settings);

    let with_auth = target
        .call(&ProbeRequest::new("q").with_config(endpoint("/echo")))
        .await;
    assert_eq!(with_auth.raw.unwrap()["auth"], "Bearer test-token");

    let config = TargetConfig {
        include_auth: Some(false),
        ..endpoint("/echo")
    };
    let without_auth = target.call(&ProbeRequest::new("q").with_config(config)).await;
    assert_eq!(without_auth.raw.unwrap()["auth"], Value::Null);
}

#[tokio::test]
async fn test_error_status_is_reported_not_raised() {
    let base = echo_service().await;
    for kind in [TargetKind::Chat, TargetKind::Query, TargetKind::Embed, TargetKind::Text] {
        let target = target_for(kind, settings_for(&base));
        let response = target
            .call(&ProbeRequest::new("q").with_config(endpoint("/broken")))
            .await;
        assert_eq!(response.output, "", "{kind}");
        assert_eq!(response.error.as_deref(), Some("HTTP 500: boom"), "{kind}");
        assert!(response.raw.is_none());
    }
}

#[tokio::test]
async fn test_transport_error_is_reported() {
    // Nothing listens on port 1.
    let target = ChatTarget::new(settings_for("http://127.0.0.1:1"));
    let response = target.call(&ProbeRequest::new("q")).await;
    assert_eq!(response.output, "");
    assert!(response.error.is_some_and(|e| !e.is_empty()));
}

#[tokio::test]
async fn test_embed_uploads_prompt_as_text_file() {
    let base = echo_service().await;
    let target = EmbedTarget::new(settings_for(&base));
    let response = target.call(&ProbeRequest::new("Refunds within 30 days.")).await;

    assert_eq!(response.output, "Upload succeeded: stored promptfoo-embed-test");
    let raw = response.raw.unwrap();
    assert_eq!(raw["fields"]["entity_id"]["text"], "promptfoo-embed");
    assert_eq!(raw["fields"]["file"]["text"], "Refunds within 30 days.");
    assert_eq!(raw["fields"]["file"]["filename"], "test.txt");
    assert_eq!(raw["fields"]["file"]["content_type"], "text/plain");
}

#[tokio::test]
async fn test_embed_reports_rejection() {
    let base = echo_service().await;
    let target = EmbedTarget::new(settings_for(&base));
    let response = target
        .call(&ProbeRequest::new("x").with_config(endpoint("/embed-rejected")))
        .await;
    assert_eq!(response.output, "Upload failed: unsupported file type");
    assert!(response.error.is_none());
}

#[tokio::test]
async fn test_text_target_returns_extracted_text() {
    let base = echo_service().await;
    let target = TextTarget::new(settings_for(&base));
    let request = ProbeRequest::new("plain body")
        .with_var("file_id", "custom-id")
        .with_var("filename", "notes.md");
    let response = target.call(&request).await;

    assert_eq!(response.output, "plain body");
    let raw = response.raw.unwrap();
    assert_eq!(raw["fields"]["file_id"]["text"], "custom-id");
    assert_eq!(raw["fields"]["entity_id"]["text"], "promptfoo-text");
    assert_eq!(raw["fields"]["file"]["filename"], "notes.md");
}

// --- Against the ragchat gateway ---

async fn gateway_service() -> String {
    let embedder: Arc<dyn Embedder> = Arc::new(HashingEmbedder::new(128));
    let index = InMemoryIndex::new(embedder.clone());
    index
        .add_documents(vec![
            Document::new("Customers may request a refund within 30 days of purchase.")
                .with_metadata(FILE_ID_KEY, "testid1")
                .with_metadata(ENTITY_ID_KEY, "promptfoo-tester"),
            Document::new("Refunds go back to the original payment method.")
                .with_metadata(FILE_ID_KEY, "testid1")
                .with_metadata(ENTITY_ID_KEY, "promptfoo-tester"),
        ])
        .unwrap();

    let mut registry = ProviderRegistry::new("azure-gpt4o-mini");
    registry.register_provider(
        "azure-gpt4o-mini",
        Arc::new(
            MockProvider::new("Azure GPT-4o-mini", PromptStyle::Messages)
                .with_reply("Refunds are accepted within 30 days [Source 1]."),
        ),
    );
    let retriever = RetrievalClient::new(Arc::new(index), embedder);
    let pipeline = RagPipeline::new(Arc::new(retriever), Arc::new(registry));
    serve(gateway_router(GatewayState::new(pipeline, 4).shared())).await
}

#[tokio::test]
async fn test_chat_target_against_gateway() {
    let base = gateway_service().await;
    let target = ChatTarget::new(settings_for(&base));
    let response = target.call(&ProbeRequest::new("What is the refund policy?")).await;

    assert_eq!(response.error, None);
    assert_eq!(response.output, "Refunds are accepted within 30 days [Source 1].");
    let raw = response.raw.unwrap();
    assert_eq!(raw["model_used"], "Azure GPT-4o-mini");
    assert_eq!(raw["sources"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_chat_target_surfaces_gateway_errors() {
    let base = gateway_service().await;
    let target = ChatTarget::new(settings_for(&base));
    let request = ProbeRequest::new("q").with_var("model", "nonexistent-model");
    let response = target.call(&request).await;
    assert_eq!(response.output, "");
    let error = response.error.unwrap();
    assert!(error.starts_with("HTTP 400: "));
    assert!(error.contains("Unsupported model: nonexistent-model"));
}

#[tokio::test]
async fn test_query_target_against_gateway() {
    let base = gateway_service().await;
    let target = QueryTarget::new(settings_for(&base));
    let response = target.call(&ProbeRequest::new("refund window")).await;

    assert!(!response.is_error());
    let raw = response.raw.unwrap();
    let pairs = raw.as_array().unwrap();
    assert_eq!(pairs.len(), 2);
    assert_eq!(response.output, pairs[0][0]["page_content"].as_str().unwrap());
}

#[tokio::test]
async fn test_query_target_unknown_document_gives_empty_list() {
    let base = gateway_service().await;
    let target = QueryTarget::new(settings_for(&base));
    let response = target
        .call(&ProbeRequest::new("anything").with_var("file_id", "missing-doc"))
        .await;
    assert_eq!(response.output, "[]");
    assert_eq!(response.raw, Some(json!([])));
}
