//! C13 — Query engine: the top-level entry point wiring the query processor
//! (C7), dense (C8) and sparse (C9) retrievers, fusion/re-rank (C10), the
//! assembler (C12), and the cache (C11) into one `query` call. Checks the cache
//! first; on a miss, runs the full pipeline and writes the result back with its
//! dependency set (the chunk ids it cites) before returning.

use crate::assembler::assemble;
use crate::cache::{fingerprint, Cache};
use crate::config::ConexusConfig;
use crate::dense::DenseRetriever;
use crate::error::Result;
use crate::fusion::{fuse_and_rerank, FusionStrategy, RerankWeights};
use crate::query::process_query;
use crate::sparse::SparseRetriever;
use crate::tokenizer::Tokenizer;
use crate::traits::{Embedder, InvertedIndex, VectorStore};
use crate::types::AssembledContext;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

pub struct QueryEngine {
    dense: DenseRetriever,
    sparse: SparseRetriever,
    vector_store: Arc<dyn VectorStore>,
    cache: Arc<Cache>,
    tokenizer: Arc<dyn Tokenizer>,
    config: ConexusConfig,
}

impl QueryEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        inverted_index: Arc<dyn InvertedIndex>,
        cache: Arc<Cache>,
        tokenizer: Arc<dyn Tokenizer>,
        config: ConexusConfig,
    ) -> Self {
        let dense = DenseRetriever::new(embedder, vector_store.clone());
        let sparse = SparseRetriever::new(inverted_index, config.bm25_k1, config.bm25_b);
        Self { dense, sparse, vector_store, cache, tokenizer, config }
    }

    /// Run one query end to end, honoring `token_budget` (falls back to the
    /// configured default if 0). A dense-arm failure degrades to sparse-only
    /// rather than failing the whole query (spec §7 `DegradedQuery`); a
    /// completely empty result set still returns a valid, empty
    /// `AssembledContext` rather than an error.
    pub fn query(&self, raw_text: &str, token_budget: usize, now: u64) -> Result<AssembledContext> {
        let budget = if token_budget == 0 { self.config.default_token_budget } else { token_budget };
        let key = fingerprint(raw_text, self.config.k_dense.max(self.config.k_sparse), budget);

        if let Some(cached) = self.cache.get(&key, now) {
            return Ok(cached);
        }

        let processed = process_query(raw_text);
        if processed.terms.is_empty() {
            let empty = AssembledContext { chunks: vec![], total_tokens: 0, coherence_score: 1.0, degraded: None };
            return Ok(empty);
        }

        let mut degraded: Option<&'static str> = None;
        let dense_hits = match self.dense.retrieve(&processed.raw_text, self.config.k_dense, &BTreeMap::new()) {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "dense retrieval degraded, continuing sparse-only");
                degraded = Some("dense_unavailable");
                Vec::new()
            }
        };
        let sparse_hits = self.sparse.retrieve(&processed.terms, self.config.k_sparse);

        let results = fuse_and_rerank(
            &dense_hits,
            &sparse_hits,
            |id| self.vector_store.get(id).map(|d| crate::types::document_to_chunk(&d)),
            FusionStrategy::Linear { alpha: self.config.fusion_alpha, beta: self.config.fusion_beta },
            RerankWeights::from(self.config.rerank_weights),
            &self.config.authority_table,
            self.config.diversity_penalty_factor,
            now,
        );

        let relevant: Vec<_> = results.into_iter().filter(|r| r.score >= self.config.min_relevance).collect();
        let mut assembled = assemble(&relevant, budget, self.config.assembler_diversity_weight, self.tokenizer.as_ref());
        assembled.degraded = degraded;

        let dependency_set = assembled.chunks.iter().map(|c| c.id.clone()).collect();
        self.cache.put(&key, assembled.clone(), dependency_set, now);

        Ok(assembled)
    }
}
