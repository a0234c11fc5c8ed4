//! In-process `VectorStore` baseline: a `DashMap` keyed by chunk id, searched by
//! brute-force cosine similarity. This mirrors the shared-map-of-documents
//! pattern this codebase already uses for its caches, sized for "a local
//! SQLite-backed store" in spirit without adding a database dependency this
//! baseline doesn't need — a real deployment swaps this for one.

use crate::error::Result;
use crate::traits::{VectorHit, VectorStore};
use crate::types::VectorDocument;
use dashmap::DashMap;
use std::collections::BTreeMap;

#[derive(Default)]
pub struct MemoryVectorStore {
    docs: DashMap<String, VectorDocument>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a * norm_b)).clamp(-1.0, 1.0)
}

fn matches_filters(doc: &VectorDocument, filters: &BTreeMap<String, String>) -> bool {
    filters.iter().all(|(k, v)| doc.metadata.get(k) == Some(v))
}

impl VectorStore for MemoryVectorStore {
    fn upsert(&self, doc: VectorDocument) -> Result<()> {
        self.docs.insert(doc.id.clone(), doc);
        Ok(())
    }

    fn get(&self, id: &str) -> Option<VectorDocument> {
        self.docs.get(id).map(|r| r.clone())
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.docs.remove(id);
        Ok(())
    }

    fn delete_by_filter(&self, filters: &BTreeMap<String, String>) -> Result<Vec<String>> {
        let matching: Vec<String> = self
            .docs
            .iter()
            .filter(|e| matches_filters(e.value(), filters))
            .map(|e| e.key().clone())
            .collect();
        for id in &matching {
            self.docs.remove(id);
        }
        Ok(matching)
    }

    fn search_vector(&self, vector: &[f32], limit: usize, filters: &BTreeMap<String, String>) -> Vec<VectorHit> {
        let mut hits: Vec<VectorHit> = self
            .docs
            .iter()
            .filter(|e| matches_filters(e.value(), filters))
            .map(|e| VectorHit { doc: e.value().clone(), similarity: cosine_similarity(vector, &e.value().vector) })
            .collect();
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        hits
    }

    fn count(&self) -> usize {
        self.docs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::now_unix;

    fn doc(id: &str, vector: Vec<f32>, file_path: &str) -> VectorDocument {
        let mut metadata = BTreeMap::new();
        metadata.insert("file_path".to_string(), file_path.to_string());
        VectorDocument {
            id: id.to_string(),
            content: String::new(),
            vector,
            metadata,
            created_at: now_unix(),
            updated_at: now_unix(),
        }
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let store = MemoryVectorStore::new();
        store.upsert(doc("c1", vec![1.0, 0.0], "a.rs")).unwrap();
        assert!(store.get("c1").is_some());
        assert_eq!(store.count(), 1);
    }

    #[test]
    fn delete_removes_document() {
        let store = MemoryVectorStore::new();
        store.upsert(doc("c1", vec![1.0, 0.0], "a.rs")).unwrap();
        store.delete("c1").unwrap();
        assert!(store.get("c1").is_none());
    }

    #[test]
    fn delete_by_filter_removes_matching_file_path() {
        let store = MemoryVectorStore::new();
        store.upsert(doc("c1", vec![1.0, 0.0], "a.rs")).unwrap();
        store.upsert(doc("c2", vec![0.0, 1.0], "b.rs")).unwrap();
        let mut filters = BTreeMap::new();
        filters.insert("file_path".to_string(), "a.rs".to_string());
        let deleted = store.delete_by_filter(&filters).unwrap();
        assert_eq!(deleted, vec!["c1".to_string()]);
        assert!(store.get("c1").is_none());
        assert!(store.get("c2").is_some());
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let store = MemoryVectorStore::new();
        store.upsert(doc("close", vec![1.0, 0.0], "a.rs")).unwrap();
        store.upsert(doc("far", vec![0.0, 1.0], "b.rs")).unwrap();
        let hits = store.search_vector(&[1.0, 0.0], 10, &BTreeMap::new());
        assert_eq!(hits[0].doc.id, "close");
        assert!(hits[0].similarity > hits[1].similarity);
    }

    #[test]
    fn missing_vector_treated_as_zero_score() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
