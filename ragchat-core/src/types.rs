//! Core types shared by the retrieval, prompt and provider layers.

use crate::error::RagError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Lowest temperature accepted by any provider.
pub const MIN_TEMPERATURE: f32 = 0.0;
/// Highest temperature accepted by any provider.
pub const MAX_TEMPERATURE: f32 = 2.0;

/// Arbitrary per-document metadata, as stored in the index.
pub type Metadata = Map<String, Value>;

/// A user question scoped to one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub document_id: String,
    pub top_k: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl Query {
    pub fn new(text: impl Into<String>, document_id: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            document_id: document_id.into(),
            top_k,
            entity_id: None,
            temperature: None,
            provider: None,
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Check the caller-controlled fields before any I/O is done.
    pub fn validate(&self) -> Result<(), RagError> {
        if self.top_k == 0 {
            return Err(RagError::invalid("k must be a positive integer"));
        }
        if self.document_id.trim().is_empty() {
            return Err(RagError::invalid("file_id must not be empty"));
        }
        if let Some(t) = self.temperature {
            validate_temperature(t)?;
        }
        Ok(())
    }

    /// The query text shortened for log lines.
    pub fn preview(&self) -> String {
        truncate_for_log(&self.text, 50)
    }
}

/// Reject temperatures outside `[MIN_TEMPERATURE, MAX_TEMPERATURE]`.
///
/// Out-of-range values are refused rather than clamped; NaN is refused too.
pub fn validate_temperature(temperature: f32) -> Result<(), RagError> {
    if (MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&temperature) {
        Ok(())
    } else {
        Err(RagError::invalid(format!(
            "temperature must be between {MIN_TEMPERATURE} and {MAX_TEMPERATURE}, got {temperature}"
        )))
    }
}

/// Shorten `text` to at most `max_chars` characters, appending `...` when cut.
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

/// A document as stored in (and returned by) the vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Read a string-valued metadata field.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }
}

/// One chunk returned by retrieval, with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub content: String,
    pub relevance_score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RetrievedChunk {
    pub fn new(content: impl Into<String>, relevance_score: f32) -> Self {
        Self {
            content: content.into(),
            relevance_score,
            metadata: Metadata::new(),
        }
    }
}

impl From<(Document, f32)> for RetrievedChunk {
    fn from((doc, score): (Document, f32)) -> Self {
        Self {
            content: doc.page_content,
            relevance_score: score,
            metadata: doc.metadata,
        }
    }
}

/// Role of a chat message sent to a message-based provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// The provider-specific request shape built from a query and its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptPayload {
    /// Ordered chat messages (system instruction, then user instruction).
    Messages(Vec<ChatMessage>),
    /// A single instruction string for completion-style providers.
    Prompt(String),
}

impl PromptPayload {
    /// Flatten the payload into one string, for providers that only take text.
    pub fn to_single_prompt(&self) -> String {
        match self {
            PromptPayload::Prompt(p) => p.clone(),
            PromptPayload::Messages(msgs) => msgs
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

/// A cited source in the answer payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Metadata,
}

/// The response payload of a `/chat` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResult {
    pub answer: String,
    pub sources: Vec<SourceDocument>,
    pub model_used: String,
}
