//! C8 — Dense retriever: embed the query with the configured `Embedder`, search
//! the `VectorStore` by cosine similarity, and hand back chunk-level hits. A
//! thin orchestration layer: all the real work lives behind the two traits.

use crate::error::{ConexusError, Result};
use crate::traits::{Embedder, VectorStore};
use crate::types::Chunk;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct DenseHit {
    pub chunk_id: String,
    pub similarity: f32,
}

pub struct DenseRetriever {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
}

impl DenseRetriever {
    pub fn new(embedder: Arc<dyn Embedder>, vector_store: Arc<dyn VectorStore>) -> Self {
        Self { embedder, vector_store }
    }

    /// Retrieve the top `k` dense hits for `query_text`. An embedding failure is
    /// a `DegradedQuery` (spec §7): the caller is expected to fall back to
    /// sparse-only rather than fail the whole query.
    pub fn retrieve(&self, query_text: &str, k: usize, filters: &BTreeMap<String, String>) -> Result<Vec<DenseHit>> {
        let vector = self
            .embedder
            .embed(query_text)
            .map_err(|_| ConexusError::DegradedQuery { arm: "dense" })?;

        let hits = self.vector_store.search_vector(&vector, k, filters);
        Ok(hits.into_iter().map(|h| DenseHit { chunk_id: h.doc.id, similarity: h.similarity }).collect())
    }

    /// Resolve a dense hit's chunk id back into a `Chunk`, reconstructed from the
    /// VectorDocument's stored content and metadata. Returns `None` if the
    /// document has since been deleted (a benign race with concurrent indexing).
    pub fn resolve_chunk(&self, chunk_id: &str) -> Option<Chunk> {
        let doc = self.vector_store.get(chunk_id)?;
        Some(crate::types::document_to_chunk(&doc))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{HashEmbedder, MemoryVectorStore};
    use crate::types::{now_unix, VectorDocument};

    fn doc(id: &str, text: &str, embedder: &HashEmbedder) -> VectorDocument {
        VectorDocument {
            id: id.to_string(),
            content: text.to_string(),
            vector: embedder.embed(text).unwrap(),
            metadata: BTreeMap::new(),
            created_at: now_unix(),
            updated_at: now_unix(),
        }
    }

    #[test]
    fn retrieves_closest_vectors_first() {
        let embedder = HashEmbedder::new(32);
        let store = Arc::new(MemoryVectorStore::new());
        store.upsert(doc("a", "merkle tree hashing", &embedder)).unwrap();
        store.upsert(doc("b", "unrelated cooking recipe", &embedder)).unwrap();

        let retriever = DenseRetriever::new(Arc::new(embedder), store);
        let hits = retriever.retrieve("merkle tree hashing", 10, &BTreeMap::new()).unwrap();
        assert_eq!(hits[0].chunk_id, "a");
    }

    #[test]
    fn empty_store_returns_empty_not_error() {
        let embedder = HashEmbedder::new(16);
        let store = Arc::new(MemoryVectorStore::new());
        let retriever = DenseRetriever::new(Arc::new(embedder), store);
        let hits = retriever.retrieve("anything", 10, &BTreeMap::new()).unwrap();
        assert!(hits.is_empty());
    }
}
