//! C12 — Assembler: token-budgeted greedy selection over the re-ranked result
//! set, with a per-file diversity discount already baked into the incoming
//! score (C10) and a final coherence reorder. Grounded in this codebase's
//! water-fill budget allocator (`allocate_file_budgets`/`prune_blocks`): spend
//! on the highest-scoring chunks first, never exceed the token budget, and keep
//! a file's chunks adjacent in the output rather than interleaved.

use crate::tokenizer::Tokenizer;
use crate::types::{AssembledContext, RetrievalResult};
use std::collections::{BTreeMap, BTreeSet};

/// Greedily select chunks by descending score until `token_budget` would be
/// exceeded, then reorder the selection so chunks from the same file are
/// adjacent (highest-scoring file first), preserving within-file line order.
/// Never exceeds budget; never fails — an empty `results` list yields an empty,
/// zero-token context.
///
/// `diversity_weight` discounts the effective token cost of a chunk whose
/// `file_path` was already chosen by an earlier (higher-scoring) pick — a
/// same-file continuation packs more cheaply than a chunk from a new file,
/// so the budget favors finishing a file it already committed to. The
/// discount is applied identically to the admission check and to the
/// reported `total_tokens`, so the invariant `total_tokens <= token_budget`
/// holds regardless of how much discounting occurred.
pub fn assemble(
    results: &[RetrievalResult],
    token_budget: usize,
    diversity_weight: f32,
    tokenizer: &dyn Tokenizer,
) -> AssembledContext {
    let mut ranked: Vec<&RetrievalResult> = results.iter().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut selected = Vec::new();
    let mut spent = 0usize;
    let mut files_chosen: BTreeSet<String> = BTreeSet::new();
    for result in ranked {
        let cost = tokenizer.count_tokens(&result.chunk.content);
        let effective_cost = if files_chosen.contains(&result.chunk.file_path) {
            (cost as f32 * diversity_weight).round() as usize
        } else {
            cost
        };
        if spent + effective_cost > token_budget {
            continue;
        }
        spent += effective_cost;
        files_chosen.insert(result.chunk.file_path.clone());
        selected.push(result);
    }

    // Group by file, ordered by each file's best-scoring chunk, then by line
    // number within the file — this is the "coherence reorder": a reader sees
    // a file's chunks together and in source order, not shuffled by score.
    let mut file_order: Vec<String> = Vec::new();
    let mut file_best_score: BTreeMap<String, f32> = BTreeMap::new();
    let mut by_file: BTreeMap<String, Vec<&RetrievalResult>> = BTreeMap::new();
    for result in &selected {
        let file = result.chunk.file_path.clone();
        let entry = file_best_score.entry(file.clone()).or_insert(f32::MIN);
        if result.score > *entry {
            *entry = result.score;
        }
        if !by_file.contains_key(&file) {
            file_order.push(file.clone());
        }
        by_file.entry(file).or_default().push(result);
    }
    file_order.sort_by(|a, b| {
        file_best_score[b].partial_cmp(&file_best_score[a]).unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut chunks = Vec::with_capacity(selected.len());
    for file in file_order {
        let mut group = by_file.remove(&file).unwrap_or_default();
        group.sort_by_key(|r| r.chunk.start_line);
        chunks.extend(group.into_iter().map(|r| r.chunk.clone()));
    }

    let coherence_score = coherence(&chunks);
    AssembledContext { chunks, total_tokens: spent, coherence_score, degraded: None }
}

/// A crude coherence proxy: the fraction of selected chunks that are adjacent
/// (by line range) to another selected chunk from the same file, rewarding
/// assemblies that read as contiguous excerpts rather than scattered snippets.
fn coherence(chunks: &[crate::types::Chunk]) -> f32 {
    if chunks.len() <= 1 {
        return 1.0;
    }
    let mut adjacent = 0usize;
    for window in chunks.windows(2) {
        let (a, b) = (&window[0], &window[1]);
        if a.file_path == b.file_path && b.start_line.saturating_sub(a.end_line) <= 5 {
            adjacent += 1;
        }
    }
    adjacent as f32 / (chunks.len() - 1) as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::BytesEstimateTokenizer;
    use crate::types::{Chunk, ChunkKind, ComponentScores, ResultSource};

    fn result(id: &str, file: &str, start: usize, end: usize, content: &str, score: f32) -> RetrievalResult {
        RetrievalResult {
            chunk: Chunk {
                id: id.to_string(),
                file_path: file.to_string(),
                content: content.to_string(),
                language: "rust".to_string(),
                kind: ChunkKind::Unknown,
                start_line: start,
                end_line: end,
                content_hash: String::new(),
                metadata: BTreeMap::new(),
                indexed_at: 0,
            },
            score,
            component_scores: ComponentScores::default(),
            source: ResultSource::Dense,
        }
    }

    #[test]
    fn never_exceeds_token_budget() {
        let results = vec![
            result("a", "a.rs", 1, 5, &"word ".repeat(100), 0.9),
            result("b", "b.rs", 1, 5, &"word ".repeat(100), 0.8),
        ];
        let tok = BytesEstimateTokenizer;
        let assembled = assemble(&results, 50, 1.0, &tok);
        assert!(assembled.total_tokens <= 50);
    }

    #[test]
    fn empty_results_yield_empty_context() {
        let tok = BytesEstimateTokenizer;
        let assembled = assemble(&[], 1000, 1.0, &tok);
        assert!(assembled.chunks.is_empty());
        assert_eq!(assembled.total_tokens, 0);
        assert_eq!(assembled.coherence_score, 1.0);
    }

    #[test]
    fn same_file_chunks_are_grouped_and_line_ordered() {
        let results = vec![
            result("a", "f.rs", 10, 15, "b", 0.5),
            result("b", "f.rs", 1, 5, "a", 0.9),
            result("c", "other.rs", 1, 5, "c", 0.95),
        ];
        let tok = BytesEstimateTokenizer;
        let assembled = assemble(&results, 10_000, 1.0, &tok);
        let f_positions: Vec<usize> =
            assembled.chunks.iter().enumerate().filter(|(_, c)| c.file_path == "f.rs").map(|(i, _)| i).collect();
        assert_eq!(f_positions, vec![1, 2], "f.rs chunks should be adjacent");
        assert!(assembled.chunks[1].start_line < assembled.chunks[2].start_line);
    }

    #[test]
    fn higher_scoring_chunks_preferred_when_budget_forces_a_choice() {
        let results = vec![result("a", "a.rs", 1, 1, &"x".repeat(40), 0.9), result("b", "b.rs", 1, 1, &"x".repeat(40), 0.1)];
        let tok = BytesEstimateTokenizer;
        let assembled = assemble(&results, 12, 1.0, &tok);
        assert_eq!(assembled.chunks.len(), 1);
        assert_eq!(assembled.chunks[0].id, "a");
    }

    #[test]
    fn same_file_continuation_gets_diversity_discount_on_cost() {
        // Two chunks from the same file cost 10 tokens each at full price (20
        // total, over a budget of 15); at a 0.5 discount the second chunk's
        // effective cost drops to 5, so both fit.
        let results = vec![
            result("a", "f.rs", 1, 5, &"x".repeat(40), 0.9),
            result("b", "f.rs", 10, 15, &"x".repeat(40), 0.8),
        ];
        let tok = BytesEstimateTokenizer;
        let full_price = assemble(&results, 15, 1.0, &tok);
        assert_eq!(full_price.chunks.len(), 1, "without a discount only the top chunk fits");

        let discounted = assemble(&results, 15, 0.5, &tok);
        assert_eq!(discounted.chunks.len(), 2, "the same-file continuation now fits at half cost");
        assert!(discounted.total_tokens <= 15);
    }
}
