//! C10 — Fusion + multi-factor re-rank: combine dense (C8) and sparse (C9) hits
//! into one ranked list, then adjust by freshness, authority, and intra-file
//! diversity before handing `RetrievalResult`s to the Assembler (C12).

use crate::config::authority_lookup;
use crate::dense::DenseHit;
use crate::sparse::SparseHit;
use crate::types::{Chunk, ComponentScores, ResultSource, RetrievalResult};
use std::collections::BTreeMap;

/// How dense and sparse scores are combined into one fused score.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionStrategy {
    /// `alpha * dense_norm + beta * sparse_norm`, both arms min-max normalized
    /// to [0, 1] before combining.
    Linear { alpha: f32, beta: f32 },
    /// Reciprocal Rank Fusion: `sum(1 / (k + rank))` across arms a hit appears
    /// in — robust to each arm's score having a different scale/distribution.
    ReciprocalRank { k: f32 },
}

#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub similarity: f32,
    pub freshness: f32,
    pub authority: f32,
    pub diversity: f32,
}

impl From<(f32, f32, f32, f32)> for RerankWeights {
    fn from(w: (f32, f32, f32, f32)) -> Self {
        Self { similarity: w.0, freshness: w.1, authority: w.2, diversity: w.3 }
    }
}

fn normalize(scores: &BTreeMap<String, f32>) -> BTreeMap<String, f32> {
    if scores.is_empty() {
        return BTreeMap::new();
    }
    let min = scores.values().cloned().fold(f32::INFINITY, f32::min);
    let max = scores.values().cloned().fold(f32::NEG_INFINITY, f32::max);
    let range = (max - min).max(f32::EPSILON);
    scores.iter().map(|(id, s)| (id.clone(), (s - min) / range)).collect()
}

fn fuse(dense: &[DenseHit], sparse: &[SparseHit], strategy: FusionStrategy) -> BTreeMap<String, (f32, ResultSource)> {
    let dense_scores: BTreeMap<String, f32> = dense.iter().map(|h| (h.chunk_id.clone(), h.similarity)).collect();
    let sparse_scores: BTreeMap<String, f32> = sparse.iter().map(|h| (h.chunk_id.clone(), h.score)).collect();

    let mut fused: BTreeMap<String, (f32, ResultSource)> = BTreeMap::new();

    match strategy {
        FusionStrategy::Linear { alpha, beta } => {
            let dense_norm = normalize(&dense_scores);
            let sparse_norm = normalize(&sparse_scores);
            let mut all_ids: Vec<&String> = dense_norm.keys().chain(sparse_norm.keys()).collect();
            all_ids.sort();
            all_ids.dedup();
            for id in all_ids {
                let d = dense_norm.get(id).copied();
                let s = sparse_norm.get(id).copied();
                let score = alpha * d.unwrap_or(0.0) + beta * s.unwrap_or(0.0);
                let source = match (d, s) {
                    (Some(_), Some(_)) => ResultSource::Both,
                    (Some(_), None) => ResultSource::Dense,
                    (None, Some(_)) => ResultSource::Sparse,
                    (None, None) => continue,
                };
                fused.insert(id.clone(), (score, source));
            }
        }
        FusionStrategy::ReciprocalRank { k } => {
            let mut ranked_dense = dense.to_vec();
            ranked_dense.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
            let mut ranked_sparse = sparse.to_vec();
            ranked_sparse.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

            let mut present: BTreeMap<String, (bool, bool)> = BTreeMap::new();
            for (rank, hit) in ranked_dense.iter().enumerate() {
                let contribution = 1.0 / (k + rank as f32 + 1.0);
                let entry = fused.entry(hit.chunk_id.clone()).or_insert((0.0, ResultSource::Dense));
                entry.0 += contribution;
                present.entry(hit.chunk_id.clone()).or_default().0 = true;
            }
            for (rank, hit) in ranked_sparse.iter().enumerate() {
                let contribution = 1.0 / (k + rank as f32 + 1.0);
                let entry = fused.entry(hit.chunk_id.clone()).or_insert((0.0, ResultSource::Sparse));
                entry.0 += contribution;
                present.entry(hit.chunk_id.clone()).or_default().1 = true;
            }
            for (id, (in_dense, in_sparse)) in present {
                if let Some(entry) = fused.get_mut(&id) {
                    entry.1 = match (in_dense, in_sparse) {
                        (true, true) => ResultSource::Both,
                        (true, false) => ResultSource::Dense,
                        (false, true) => ResultSource::Sparse,
                        (false, false) => entry.1,
                    };
                }
            }
        }
    }

    fused
}

/// Exponential recency decay: a chunk touched `half_life_secs` ago scores 0.5,
/// one touched `2*half_life_secs` ago scores 0.25, etc. A chunk with no known
/// `updated_at` is treated as fresh (score 1) rather than penalized for an
/// absent signal.
fn freshness_score(updated_at: Option<u64>, now: u64, half_life_secs: f64) -> f32 {
    let Some(updated_at) = updated_at else {
        return 1.0;
    };
    if half_life_secs <= 0.0 {
        return 1.0;
    }
    let age_secs = now.saturating_sub(updated_at) as f64;
    0.5f64.powf(age_secs / half_life_secs) as f32
}

/// Fuse, then re-rank by similarity/freshness/authority, applying a per-file
/// diversity discount so a single file's chunks don't monopolize the result set.
#[allow(clippy::too_many_arguments)]
pub fn fuse_and_rerank(
    dense: &[DenseHit],
    sparse: &[SparseHit],
    resolve_chunk: impl Fn(&str) -> Option<Chunk>,
    strategy: FusionStrategy,
    weights: RerankWeights,
    authority_table: &BTreeMap<String, f32>,
    diversity_penalty_factor: f32,
    now: u64,
) -> Vec<RetrievalResult> {
    let fused = fuse(dense, sparse, strategy);
    let dense_scores: BTreeMap<String, f32> = dense.iter().map(|h| (h.chunk_id.clone(), h.similarity)).collect();
    let sparse_scores: BTreeMap<String, f32> = sparse.iter().map(|h| (h.chunk_id.clone(), h.score)).collect();

    let mut candidates: Vec<(Chunk, f32, ResultSource)> = Vec::new();
    for (chunk_id, (fused_score, source)) in &fused {
        if let Some(chunk) = resolve_chunk(chunk_id) {
            candidates.push((chunk, *fused_score, *source));
        }
    }

    // Rank by fused score first so diversity discounting applies to
    // lower-ranked duplicates from the same file, not an arbitrary order.
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut file_seen_count: BTreeMap<String, u32> = BTreeMap::new();
    let mut results = Vec::with_capacity(candidates.len());

    for (chunk, fused_score, source) in candidates {
        let occurrence = *file_seen_count.get(&chunk.file_path).unwrap_or(&0);
        file_seen_count.insert(chunk.file_path.clone(), occurrence + 1);
        // Bounded diversity credit: full credit (1.0) the first time a file is
        // seen, discounted to `diversity_penalty_factor` for every repeat —
        // never an unboundedly shrinking value, so it composes as a same-scale
        // additive term alongside similarity/freshness/authority below.
        let diversity_penalty = if occurrence == 0 { 1.0 } else { diversity_penalty_factor };

        let source_type = chunk.metadata.get(Chunk::META_SOURCE_TYPE).map(|s| s.as_str());
        let authority = authority_lookup(authority_table, source_type);
        let updated_at = chunk.metadata.get(Chunk::META_UPDATED_AT).and_then(|s| s.parse::<u64>().ok());
        let freshness = freshness_score(updated_at, now, 30.0 * 24.0 * 3600.0);

        let dense_component = dense_scores.get(&chunk.id).copied().unwrap_or(0.0);
        let sparse_component = sparse_scores.get(&chunk.id).copied().unwrap_or(0.0);

        let raw_score = weights.similarity * fused_score
            + weights.freshness * freshness
            + weights.authority * authority
            + weights.diversity * diversity_penalty;
        let score = raw_score.clamp(0.0, 1.0);

        results.push(RetrievalResult {
            chunk,
            score,
            component_scores: ComponentScores {
                dense: dense_component,
                sparse: sparse_component,
                fused: fused_score,
                freshness,
                authority,
                diversity_penalty,
            },
            source,
        });
    }

    results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    results
}
