//! # ragchat Core
//!
//! Core library for the ragchat document question-answering service.
//! Provides retrieval over a vector index, grounding-context rendering,
//! provider-specific prompts, the multi-provider gateway, configuration,
//! and the HTTP surface.

pub mod config;
pub mod context;
pub mod credentials;
pub mod embeddings;
pub mod error;
pub mod gateway;
pub mod pipeline;
pub mod prompt;
pub mod providers;
pub mod retrieval;
pub mod types;

// Re-export commonly used types at the crate root.
pub use config::{AppConfig, load_config};
pub use context::{assemble_answer, format_sources};
pub use credentials::{CredentialSource, EnvCredentials, StaticCredentials};
pub use embeddings::{Embedder, HashingEmbedder};
pub use error::{ErrorKind, LlmError, RagError, Result};
pub use pipeline::RagPipeline;
pub use prompt::{PromptStyle, build_prompt};
pub use providers::{LlmProvider, MockProvider, ProviderRegistry};
pub use retrieval::{InMemoryIndex, RetrievalClient, RetrievalStrategy, Retriever, VectorIndex};
pub use types::{
    AnswerResult, ChatMessage, Document, PromptPayload, Query, RetrievedChunk, Role,
    SourceDocument,
};
