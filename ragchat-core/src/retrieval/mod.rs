//! Retrieval client: query text in, ordered document chunks out.
//!
//! Wraps an [`Embedder`] and a [`VectorIndex`]. The index call either runs
//! inline ([`RetrievalStrategy::Direct`]) or on tokio's blocking thread pool
//! ([`RetrievalStrategy::ThreadPool`]); callers see the same [`Retriever`]
//! contract either way.

pub mod index;

pub use index::{DocumentFilter, ENTITY_ID_KEY, FILE_ID_KEY, InMemoryIndex, VectorIndex};

use crate::config::RetrievalConfig;
use crate::embeddings::Embedder;
use crate::error::{IndexError, RagError};
use crate::types::RetrievedChunk;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How the blocking index call is scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Call the index on the current task.
    Direct,
    /// Offload embedding and search with `spawn_blocking`.
    #[default]
    ThreadPool,
}

impl std::fmt::Display for RetrievalStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetrievalStrategy::Direct => write!(f, "direct"),
            RetrievalStrategy::ThreadPool => write!(f, "thread_pool"),
        }
    }
}

/// Anything that can produce ranked chunks for a document-scoped query.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Return up to `k` chunks of `document_id`, most relevant first.
    ///
    /// An empty vector means nothing matched; errors are always
    /// [`RagError::RetrievalFailure`].
    async fn retrieve(
        &self,
        query_text: &str,
        document_id: &str,
        k: usize,
        entity_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, RagError>;
}

/// The default [`Retriever`], backed by an embedder and a vector index.
#[derive(Clone)]
pub struct RetrievalClient {
    index: Arc<dyn VectorIndex>,
    embedder: Arc<dyn Embedder>,
    strategy: RetrievalStrategy,
    timeout: Duration,
}

impl std::fmt::Debug for RetrievalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalClient")
            .field("embedder", &self.embedder.provider_name())
            .field("strategy", &self.strategy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl RetrievalClient {
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index,
            embedder,
            strategy: RetrievalStrategy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(
        index: Arc<dyn VectorIndex>,
        embedder: Arc<dyn Embedder>,
        config: &RetrievalConfig,
    ) -> Self {
        Self::new(index, embedder)
            .with_strategy(config.strategy)
            .with_timeout(Duration::from_secs(config.timeout_secs))
    }

    pub fn with_strategy(mut self, strategy: RetrievalStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn strategy(&self) -> RetrievalStrategy {
        self.strategy
    }

    /// Embed once, search, and enforce the document filter on the results.
    fn search_blocking(
        index: &dyn VectorIndex,
        embedder: &dyn Embedder,
        query_text: &str,
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<RetrievedChunk>, IndexError> {
        let embedding = embedder.embed_query(query_text)?;
        let results = index.similarity_search(&embedding, k, filter)?;

        let returned = results.len();
        let chunks: Vec<RetrievedChunk> = results
            .into_iter()
            .filter(|(doc, _)| filter.matches(doc))
            .take(k)
            .map(RetrievedChunk::from)
            .collect();
        if chunks.len() < returned.min(k) {
            warn!(
                document_id = %filter.file_id,
                dropped = returned - chunks.len(),
                "Index returned chunks outside the requested document; dropped them"
            );
        }
        Ok(chunks)
    }
}

#[async_trait]
impl Retriever for RetrievalClient {
    async fn retrieve(
        &self,
        query_text: &str,
        document_id: &str,
        k: usize,
        entity_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, RagError> {
        if k == 0 {
            return Err(RagError::invalid("k must be a positive integer"));
        }
        let filter = DocumentFilter::new(document_id).with_entity(entity_id);
        debug!(
            document_id = %document_id,
            k,
            strategy = %self.strategy,
            "Retrieving chunks"
        );

        let search = async {
            match self.strategy {
                // Runs to completion on this task; the timeout cannot preempt it.
                RetrievalStrategy::Direct => Self::search_blocking(
                    self.index.as_ref(),
                    self.embedder.as_ref(),
                    query_text,
                    k,
                    &filter,
                )
                .map_err(|e| RagError::retrieval(e.to_string())),
                RetrievalStrategy::ThreadPool => {
                    let index = Arc::clone(&self.index);
                    let embedder = Arc::clone(&self.embedder);
                    let text = query_text.to_string();
                    let filter = filter.clone();
                    tokio::task::spawn_blocking(move || {
                        Self::search_blocking(
                            index.as_ref(),
                            embedder.as_ref(),
                            &text,
                            k,
                            &filter,
                        )
                    })
                    .await
                    .map_err(|e| RagError::retrieval(format!("retrieval task failed: {e}")))?
                    .map_err(|e| RagError::retrieval(e.to_string()))
                }
            }
        };

        match tokio::time::timeout(self.timeout, search).await {
            Ok(result) => result,
            Err(_) => Err(RagError::retrieval(format!(
                "timed out after {}s",
                self.timeout.as_secs_f32()
            ))),
        }
    }
}
