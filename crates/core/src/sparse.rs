//! C9 — Sparse retriever: BM25 scoring over the `InvertedIndex`'s postings.
//! Grounded in this codebase's own relevance-scoring heuristic (`grep_relevance_score`,
//! `TermDocFreq::idf`) but implementing the textbook Okapi BM25 formula rather than
//! the ad hoc density/coverage blend that heuristic used, since the fused/re-ranked
//! pipeline downstream already supplies freshness/authority/diversity adjustments.

use crate::traits::InvertedIndex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SparseHit {
    pub chunk_id: String,
    pub score: f32,
}

pub struct SparseRetriever {
    inverted_index: Arc<dyn InvertedIndex>,
    k1: f32,
    b: f32,
}

impl SparseRetriever {
    pub fn new(inverted_index: Arc<dyn InvertedIndex>, k1: f32, b: f32) -> Self {
        Self { inverted_index, k1, b }
    }

    /// BM25: for each query term, `idf(term) * (tf * (k1+1)) / (tf + k1 * (1 - b + b * doclen/avgdoclen))`,
    /// summed across terms and across chunks containing at least one. Chunks with
    /// no matching term never appear — there is no "sparse floor" score.
    pub fn retrieve(&self, terms: &[String], k: usize) -> Vec<SparseHit> {
        let stats = self.inverted_index.stats();
        if stats.doc_count == 0 {
            return Vec::new();
        }
        let avg_length = stats.avg_length.max(1.0);
        let n = stats.doc_count as f64;

        let mut scores: BTreeMap<String, f32> = BTreeMap::new();
        for term in terms {
            let postings = self.inverted_index.postings_for(term);
            if postings.is_empty() {
                continue;
            }
            let df = postings.len() as f64;
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln() as f32;

            for posting in postings {
                let doc_len = self.inverted_index.doc_length(&posting.chunk_id).unwrap_or(0) as f32;
                let tf = posting.term_frequency as f32;
                let denom = tf + self.k1 * (1.0 - self.b + self.b * (doc_len / avg_length as f32));
                let term_score = if denom > 0.0 { idf * (tf * (self.k1 + 1.0)) / denom } else { 0.0 };
                *scores.entry(posting.chunk_id).or_insert(0.0) += term_score;
            }
        }

        let mut hits: Vec<SparseHit> = scores.into_iter().map(|(chunk_id, score)| SparseHit { chunk_id, score }).collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryInvertedIndex;

    fn terms(pairs: &[(&str, u32)]) -> BTreeMap<String, u32> {
        pairs.iter().map(|(t, f)| (t.to_string(), *f)).collect()
    }

    #[test]
    fn ranks_higher_term_frequency_first() {
        let idx = Arc::new(MemoryInvertedIndex::new());
        idx.add("a", &terms(&[("merkle", 5), ("tree", 1)]));
        idx.add("b", &terms(&[("merkle", 1)]));
        let retriever = SparseRetriever::new(idx, 1.5, 0.75);
        let hits = retriever.retrieve(&["merkle".to_string()], 10);
        assert_eq!(hits[0].chunk_id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn no_matching_terms_yields_empty() {
        let idx = Arc::new(MemoryInvertedIndex::new());
        idx.add("a", &terms(&[("merkle", 1)]));
        let retriever = SparseRetriever::new(idx, 1.5, 0.75);
        assert!(retriever.retrieve(&["nonexistent".to_string()], 10).is_empty());
    }

    #[test]
    fn empty_index_returns_empty() {
        let idx = Arc::new(MemoryInvertedIndex::new());
        let retriever = SparseRetriever::new(idx, 1.5, 0.75);
        assert!(retriever.retrieve(&["anything".to_string()], 10).is_empty());
    }

    #[test]
    fn rare_term_outweighs_common_term_via_idf() {
        let idx = Arc::new(MemoryInvertedIndex::new());
        for i in 0..10 {
            idx.add(&format!("common{i}"), &terms(&[("the", 1)]));
        }
        idx.add("rare_doc", &terms(&[("bespoke", 1)]));
        idx.add("common_doc", &terms(&[("the", 1)]));
        let retriever = SparseRetriever::new(idx, 1.5, 0.75);
        let rare_hits = retriever.retrieve(&["bespoke".to_string()], 10);
        let common_hits = retriever.retrieve(&["the".to_string()], 10);
        assert!(rare_hits[0].score > common_hits[0].score, "rarer term should score higher via idf");
    }
}
