//! # HTTP Gateway
//!
//! The service's outer surface: `/chat`, `/query` and `/health` on axum.
//! This is the only layer that turns a [`RagError`] into a status code.

mod server;

pub use server::{GatewayState, SharedGateway, router as gateway_router, run as run_gateway};

use crate::error::{ErrorKind, RagError};
use crate::pipeline::DEFAULT_TEMPERATURE;
use crate::types::{Document, Query, RetrievedChunk};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Body of `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub file_id: String,
    /// Provider key; the registry default when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

fn default_temperature() -> f32 {
    DEFAULT_TEMPERATURE
}

impl ChatRequest {
    pub fn into_query(self, default_k: usize) -> Query {
        let mut query = Query::new(self.query, self.file_id, self.k.unwrap_or(default_k))
            .with_temperature(self.temperature);
        query.provider = self.model;
        query.entity_id = self.entity_id;
        query
    }
}

/// Body of `POST /query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl QueryRequest {
    pub fn into_query(self, default_k: usize) -> Query {
        let mut query = Query::new(self.query, self.file_id, self.k.unwrap_or(default_k));
        query.entity_id = self.entity_id;
        query
    }
}

/// One `[document, score]` pair of a `/query` response.
pub type ScoredDocument = (Document, f32);

pub fn to_scored_documents(chunks: Vec<RetrievedChunk>) -> Vec<ScoredDocument> {
    chunks
        .into_iter()
        .map(|c| {
            (
                Document {
                    page_content: c.content,
                    metadata: c.metadata,
                },
                c.relevance_score,
            )
        })
        .collect()
}

/// JSON error body: `{"detail": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

/// A pipeline error on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub RagError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::ClientInput => StatusCode::BAD_REQUEST,
            ErrorKind::ServerFault => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RagError> for ApiError {
    fn from(err: RagError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            detail: self.0.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
