//! External collaborator interfaces (spec §6). The core depends on these three
//! traits only; surrounding code plugs in concrete implementations. Baseline,
//! thin in-process implementations live in `store/`.

use crate::error::Result;
use crate::types::{IndexStats, Posting, VectorDocument};
use std::collections::BTreeMap;

/// Produces fixed-dimensional embeddings for text. Pure function of text+model:
/// the same text with the same model must always produce the same vector.
pub trait Embedder: Send + Sync {
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Default batch implementation calls `embed` per item; implementations with
    /// genuine batch APIs (e.g. a local ONNX runtime) should override this.
    fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    fn dimensions(&self) -> usize;

    fn model_id(&self) -> &str;
}

/// A single hit from `VectorStore::search_vector`.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub doc: VectorDocument,
    pub similarity: f32,
}

/// Stores and searches `VectorDocument`s by vector similarity. `filters` keys
/// reference chunk metadata entries — notably `file_path`, required by the
/// indexer's incremental-delete step.
pub trait VectorStore: Send + Sync {
    fn upsert(&self, doc: VectorDocument) -> Result<()>;

    fn upsert_batch(&self, docs: Vec<VectorDocument>) -> Result<()> {
        for doc in docs {
            self.upsert(doc)?;
        }
        Ok(())
    }

    fn get(&self, id: &str) -> Option<VectorDocument>;

    fn delete(&self, id: &str) -> Result<()>;

    /// Delete every document whose metadata matches all of `filters`. Used by the
    /// Indexer's incremental pass to remove a deleted/modified file's documents
    /// by `file_path` without needing to know their chunk ids up front.
    fn delete_by_filter(&self, filters: &BTreeMap<String, String>) -> Result<Vec<String>>;

    fn search_vector(&self, vector: &[f32], limit: usize, filters: &BTreeMap<String, String>) -> Vec<VectorHit>;

    fn count(&self) -> usize;
}

/// Term -> posting-list store with corpus statistics for BM25 scoring.
pub trait InvertedIndex: Send + Sync {
    fn add(&self, chunk_id: &str, terms_with_frequencies: &BTreeMap<String, u32>);

    fn remove(&self, chunk_id: &str);

    fn postings_for(&self, term: &str) -> Vec<Posting>;

    fn stats(&self) -> IndexStats;

    /// Document length (total term count) for a given chunk, needed by BM25's
    /// length-normalization term. `None` if the chunk isn't indexed.
    fn doc_length(&self, chunk_id: &str) -> Option<u32>;
}
