//! In-process `InvertedIndex` baseline: `DashMap<term, postings>` plus corpus
//! counters, the same concurrent-map idiom this codebase uses for its other
//! shared indices (stub caches, search indices).

use crate::traits::InvertedIndex;
use crate::types::{IndexStats, Posting};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct MemoryInvertedIndex {
    /// term -> chunk_id -> term_frequency
    postings: DashMap<String, BTreeMap<String, u32>>,
    /// chunk_id -> document length (total term count)
    doc_lengths: DashMap<String, u32>,
    total_length: AtomicU64,
    doc_count: AtomicU64,
}

impl MemoryInvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InvertedIndex for MemoryInvertedIndex {
    fn add(&self, chunk_id: &str, terms_with_frequencies: &BTreeMap<String, u32>) {
        // Adding an already-indexed chunk id is always preceded by `remove` at the
        // call sites that mutate existing documents (indexer's modified-path step),
        // but guard against double-counting anyway.
        if self.doc_lengths.contains_key(chunk_id) {
            self.remove(chunk_id);
        }

        let length: u32 = terms_with_frequencies.values().sum();
        for (term, freq) in terms_with_frequencies {
            self.postings.entry(term.clone()).or_default().insert(chunk_id.to_string(), *freq);
        }
        self.doc_lengths.insert(chunk_id.to_string(), length);
        self.total_length.fetch_add(length as u64, Ordering::Relaxed);
        self.doc_count.fetch_add(1, Ordering::Relaxed);
    }

    fn remove(&self, chunk_id: &str) {
        let Some((_, length)) = self.doc_lengths.remove(chunk_id) else { return };
        self.postings.retain(|_, docs| {
            docs.remove(chunk_id);
            !docs.is_empty()
        });
        self.total_length.fetch_sub(length as u64, Ordering::Relaxed);
        self.doc_count.fetch_sub(1, Ordering::Relaxed);
    }

    fn postings_for(&self, term: &str) -> Vec<Posting> {
        match self.postings.get(term) {
            Some(docs) => docs
                .iter()
                .map(|(chunk_id, tf)| Posting { chunk_id: chunk_id.clone(), term_frequency: *tf })
                .collect(),
            None => Vec::new(),
        }
    }

    fn stats(&self) -> IndexStats {
        let doc_count = self.doc_count.load(Ordering::Relaxed);
        let avg_length = if doc_count > 0 {
            self.total_length.load(Ordering::Relaxed) as f64 / doc_count as f64
        } else {
            0.0
        };
        IndexStats { doc_count, avg_length }
    }

    fn doc_length(&self, chunk_id: &str) -> Option<u32> {
        self.doc_lengths.get(chunk_id).map(|r| *r)
    }
}
