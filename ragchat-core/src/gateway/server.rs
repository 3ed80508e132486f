//! HTTP gateway server built on axum.

use super::{ApiError, ChatRequest, QueryRequest, ScoredDocument, to_scored_documents};
use crate::config::ServerConfig;
use crate::error::RagError;
use crate::pipeline::RagPipeline;
use crate::types::AnswerResult;
use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;
use std::time::Instant;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Everything a handler needs; shared read-only across requests.
#[derive(Debug)]
pub struct GatewayState {
    pipeline: RagPipeline,
    default_k: usize,
    started_at: Instant,
}

/// Thread-safe shared gateway reference for axum handlers.
pub type SharedGateway = Arc<GatewayState>;

impl GatewayState {
    pub fn new(pipeline: RagPipeline, default_k: usize) -> Self {
        Self {
            pipeline,
            default_k: default_k.max(1),
            started_at: Instant::now(),
        }
    }

    pub fn shared(self) -> SharedGateway {
        Arc::new(self)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

/// Build the axum router.
pub fn router(shared: SharedGateway) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .with_state(shared)
}

fn body_error(rejection: JsonRejection) -> ApiError {
    ApiError(RagError::invalid(rejection.body_text()))
}

async fn chat_handler(
    State(gw): State<SharedGateway>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<AnswerResult>, ApiError> {
    let Json(request) = body.map_err(body_error)?;
    let query = request.into_query(gw.default_k);
    let answer = gw.pipeline.answer(&query).await?;
    Ok(Json(answer))
}

async fn query_handler(
    State(gw): State<SharedGateway>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<Vec<ScoredDocument>>, ApiError> {
    let Json(request) = body.map_err(body_error)?;
    let query = request.into_query(gw.default_k);
    let chunks = gw.pipeline.search(&query).await?;
    Ok(Json(to_scored_documents(chunks)))
}

async fn health_handler(State(gw): State<SharedGateway>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "providers": gw.pipeline.providers().keys(),
        "default_provider": gw.pipeline.providers().default_key(),
        "uptime_secs": gw.uptime_secs(),
    }))
}

/// Bind `config.host:config.port` and serve until Ctrl-C.
pub async fn run(gw: SharedGateway, config: &ServerConfig) -> Result<(), std::io::Error> {
    let app = router(gw).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    );
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, "Gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
        })
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::PromptStyle;
    use crate::providers::{MockProvider, ProviderRegistry};
    use crate::retrieval::Retriever;
    use crate::types::RetrievedChunk;
    use async_trait::async_trait;
    use axum::body::Body;
    use tower::ServiceExt;

    struct OneChunk;

    #[async_trait]
    impl Retriever for OneChunk {
        async fn retrieve(
            &self,
            _query_text: &str,
            _document_id: &str,
            _k: usize,
            _entity_id: Option<&str>,
        ) -> Result<Vec<RetrievedChunk>, RagError> {
            Ok(vec![RetrievedChunk::new("Refunds within 30 days.", 0.9)])
        }
    }

    fn make_shared_gateway() -> SharedGateway {
        let mut registry = ProviderRegistry::new("mock");
        registry.register_provider(
            "mock",
            Arc::new(MockProvider::new("Mock", PromptStyle::Messages).with_reply("30 days.")),
        );
        let pipeline = RagPipeline::new(Arc::new(OneChunk), Arc::new(registry));
        GatewayState::new(pipeline, 4).shared()
    }

    async fn send(req: axum::http::Request<Body>) -> (u16, serde_json::Value) {
        let app = router(make_shared_gateway());
        let resp = ServiceExt::<axum::http::Request<Body>>::oneshot(app, req)
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let body = axum::body::to_bytes(resp.into_body(), 100_000)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let req = axum::http::Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(req).await;
        assert_eq!(status, 200);
        assert_eq!(json["status"], "ok");
        assert_eq!(json["providers"][0], "mock");
    }

    #[tokio::test]
    async fn test_chat_endpoint() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"query": "refunds?", "file_id": "doc-42"}"#))
            .unwrap();
        let (status, json) = send(req).await;
        assert_eq!(status, 200);
        assert_eq!(json["answer"], "30 days.");
        assert_eq!(json["model_used"], "Mock");
    }

    #[tokio::test]
    async fn test_malformed_body_is_client_error() {
        let req = axum::http::Request::builder()
            .method("POST")
            .uri("/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"file_id": "doc-42"}"#))
            .unwrap();
        let (status, json) = send(req).await;
        assert_eq!(status, 400);
        assert!(json["detail"].as_str().unwrap().starts_with("Invalid request"));
    }
}
