//! The answer pipeline: retrieve, ground, generate, assemble.

use crate::config::AppConfig;
use crate::context::{assemble_answer, format_sources};
use crate::credentials::CredentialSource;
use crate::embeddings::{Embedder, HashingEmbedder};
use crate::error::{IndexError, RagError};
use crate::prompt::build_prompt;
use crate::providers::ProviderRegistry;
use crate::retrieval::{InMemoryIndex, RetrievalClient, Retriever};
use crate::types::{AnswerResult, Query, RetrievedChunk};
use std::sync::Arc;
use tracing::{error, info};

/// Default sampling temperature when a query does not carry one.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Shared, read-only request handler wired with a retriever and providers.
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Arc<dyn Retriever>,
    providers: Arc<ProviderRegistry>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("providers", &self.providers.keys())
            .finish()
    }
}

impl RagPipeline {
    pub fn new(retriever: Arc<dyn Retriever>, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            retriever,
            providers,
        }
    }

    /// Wire the service from configuration: hashing embedder, in-memory index
    /// (seeded from `retrieval.seed_file` when set), retrieval client and the
    /// configured providers.
    pub fn from_config(
        config: &AppConfig,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<Self, IndexError> {
        let embedder: Arc<dyn Embedder> =
            Arc::new(HashingEmbedder::new(config.retrieval.embedding_dimensions));
        let index = match &config.retrieval.seed_file {
            Some(path) => InMemoryIndex::from_seed_file(path, Arc::clone(&embedder))?,
            None => InMemoryIndex::new(Arc::clone(&embedder)),
        };
        info!(
            documents = index.len(),
            strategy = %config.retrieval.strategy,
            "Vector index ready"
        );
        let retriever = RetrievalClient::from_config(Arc::new(index), embedder, &config.retrieval);
        let providers = ProviderRegistry::from_config(&config.providers, credentials);
        Ok(Self::new(Arc::new(retriever), Arc::new(providers)))
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    /// Answer `query` from the chunks of its document.
    ///
    /// The provider key is checked before retrieval; an empty retrieval
    /// returns `NoRelevantDocuments` without contacting any provider.
    pub async fn answer(&self, query: &Query) -> Result<AnswerResult, RagError> {
        let result = self.answer_inner(query).await;
        if let Err(e) = &result {
            error!(
                query = %query.preview(),
                document_id = %query.document_id,
                error = %e,
                "Chat request failed"
            );
        }
        result
    }

    async fn answer_inner(&self, query: &Query) -> Result<AnswerResult, RagError> {
        query.validate()?;
        let slot = self.providers.resolve(query.provider.as_deref())?;

        info!(query = %query.preview(), document_id = %query.document_id, "Retrieving documents");
        let chunks = self
            .retriever
            .retrieve(
                &query.text,
                &query.document_id,
                query.top_k,
                query.entity_id.as_deref(),
            )
            .await?;
        if chunks.is_empty() {
            return Err(RagError::NoRelevantDocuments);
        }

        let context = format_sources(&chunks);
        info!(count = chunks.len(), "Retrieved relevant documents");

        let provider = slot.instance().await?;
        let payload = build_prompt(&query.text, &context, provider.prompt_style());
        let answer = slot
            .generate(&payload, query.temperature.unwrap_or(DEFAULT_TEMPERATURE))
            .await?;

        info!(provider = %slot.key(), "Generated response using {}", slot.label());
        Ok(assemble_answer(answer, &chunks, slot.label()))
    }

    /// Retrieval only, for the `/query` surface.
    pub async fn search(&self, query: &Query) -> Result<Vec<RetrievedChunk>, RagError> {
        query.validate()?;
        self.retriever
            .retrieve(
                &query.text,
                &query.document_id,
                query.top_k,
                query.entity_id.as_deref(),
            )
            .await
            .inspect_err(|e| {
                error!(
                    query = %query.preview(),
                    document_id = %query.document_id,
                    error = %e,
                    "Query request failed"
                );
            })
    }
}
