//! Vector index abstraction and an in-memory implementation.

use crate::embeddings::{Embedder, cosine_similarity};
use crate::error::IndexError;
use crate::types::Document;
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Metadata key holding the owning document identifier.
pub const FILE_ID_KEY: &str = "file_id";
/// Metadata key holding the owning tenant/entity identifier.
pub const ENTITY_ID_KEY: &str = "user_id";

/// Restricts a search to one document and optionally one entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentFilter {
    pub file_id: String,
    pub entity_id: Option<String>,
}

impl DocumentFilter {
    pub fn new(file_id: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            entity_id: None,
        }
    }

    pub fn with_entity(mut self, entity_id: Option<&str>) -> Self {
        self.entity_id = entity_id.map(str::to_string);
        self
    }

    /// Exact match on `file_id`, and on `user_id` when an entity is set.
    pub fn matches(&self, doc: &Document) -> bool {
        if doc.meta_str(FILE_ID_KEY) != Some(self.file_id.as_str()) {
            return false;
        }
        match &self.entity_id {
            Some(entity) => doc.meta_str(ENTITY_ID_KEY) == Some(entity.as_str()),
            None => true,
        }
    }
}

/// Blocking nearest-neighbour search over stored documents.
///
/// Implementations return at most `k` `(document, score)` pairs ordered by
/// descending relevance.
pub trait VectorIndex: Send + Sync {
    fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<(Document, f32)>, IndexError>;
}

/// Cosine-similarity index held in memory.
pub struct InMemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: RwLock<Vec<(Document, Vec<f32>)>>,
}

impl std::fmt::Debug for InMemoryIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIndex")
            .field("embedder", &self.embedder.provider_name())
            .field("documents", &self.len())
            .finish()
    }
}

impl InMemoryIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Build an index from a JSON array of `{page_content, metadata}` objects.
    pub fn from_seed_file(path: &Path, embedder: Arc<dyn Embedder>) -> Result<Self, IndexError> {
        let raw = std::fs::read_to_string(path).map_err(|e| IndexError::Seed {
            message: format!("{}: {}", path.display(), e),
        })?;
        let docs: Vec<Document> = serde_json::from_str(&raw).map_err(|e| IndexError::Seed {
            message: format!("{}: {}", path.display(), e),
        })?;
        let index = Self::new(embedder);
        index.add_documents(docs)?;
        Ok(index)
    }

    /// Embed and store documents. Returns the number added.
    pub fn add_documents(&self, docs: Vec<Document>) -> Result<usize, IndexError> {
        let texts: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
        let vectors = self.embedder.embed_documents(&texts)?;
        let added = docs.len();
        let mut entries = self.entries.write().map_err(|_| IndexError::Search {
            message: "index lock poisoned".into(),
        })?;
        entries.extend(docs.into_iter().zip(vectors));
        Ok(added)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VectorIndex for InMemoryIndex {
    fn similarity_search(
        &self,
        embedding: &[f32],
        k: usize,
        filter: &DocumentFilter,
    ) -> Result<Vec<(Document, f32)>, IndexError> {
        if embedding.len() != self.embedder.dimensions() {
            return Err(IndexError::DimensionMismatch {
                expected: self.embedder.dimensions(),
                actual: embedding.len(),
            });
        }
        let entries = self.entries.read().map_err(|_| IndexError::Search {
            message: "index lock poisoned".into(),
        })?;

        let mut scored: Vec<(Document, f32)> = entries
            .iter()
            .filter(|(doc, _)| filter.matches(doc))
            .map(|(doc, vec)| (doc.clone(), cosine_similarity(embedding, vec)))
            .collect();
        // Stable sort: equal scores keep insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }
}
