//! End-to-end coverage of the full index -> query pipeline through only the
//! crate's public API: an `IndexController` run followed by a `QueryEngine`
//! query against the resulting store, across a small multi-file repo.

use conexus_core::cache::{Cache, NullSharedCache};
use conexus_core::config::ConexusConfig;
use conexus_core::controller::{IndexController, Phase};
use conexus_core::engine::QueryEngine;
use conexus_core::indexer::{Indexer, NullInvalidator};
use conexus_core::store::{HashEmbedder, MemoryInvertedIndex, MemoryVectorStore};
use conexus_core::tokenizer::create_tokenizer;
use conexus_core::traits::{Embedder, InvertedIndex, VectorStore};
use conexus_core::types::now_unix;
use std::fs;
use std::sync::Arc;

struct Harness {
    controller: IndexController,
    vector_store: Arc<dyn VectorStore>,
    inverted_index: Arc<dyn InvertedIndex>,
    embedder: Arc<dyn Embedder>,
    cache: Arc<Cache>,
    cfg: ConexusConfig,
}

fn harness(root: &std::path::Path) -> Harness {
    let vector_store: Arc<dyn VectorStore> = Arc::new(MemoryVectorStore::new());
    let inverted_index: Arc<dyn InvertedIndex> = Arc::new(MemoryInvertedIndex::new());
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(48));
    let cache = Arc::new(Cache::new(64, 3600, Box::new(NullSharedCache), 24 * 3600, None, 7 * 24 * 3600));
    let indexer = Indexer::new(
        Some(embedder.clone()),
        vector_store.clone(),
        inverted_index.clone(),
        cache.clone(),
        16,
    );
    let mut cfg = ConexusConfig::new(root.to_path_buf());
    // A tiny synthetic corpus needs a generous relevance floor loosened so the
    // hash embedder's coarse similarity doesn't filter every hit out.
    cfg.min_relevance = 0.0;
    let controller = IndexController::new(indexer, &root.join(".conexus/state.json"));
    Harness { controller, vector_store, inverted_index, embedder, cache, cfg }
}

fn engine(h: &Harness) -> QueryEngine {
    QueryEngine::new(
        h.embedder.clone(),
        h.vector_store.clone(),
        h.inverted_index.clone(),
        h.cache.clone(),
        create_tokenizer("bytes-estimate"),
        h.cfg.clone(),
    )
}

#[test]
fn indexing_a_small_repo_then_querying_returns_the_matching_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("merkle.rs"),
        "fn hash_tree(leaves: &BTreeMap<String, String>) -> TreeState {\n    // compute the merkle root over sorted leaf hashes\n}\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("cookies.rs"),
        "fn bake_cookies(oven_temp: u32) -> Cookies {\n    // preheat and bake for twelve minutes\n}\n",
    )
    .unwrap();

    let h = harness(dir.path());
    let status = h.controller.start(&h.cfg).unwrap();
    assert_eq!(status.phase, Phase::Completed);
    assert_eq!(status.files_processed, 2);
    assert!(status.chunks_created >= 2);

    let eng = engine(&h);
    let result = eng.query("merkle tree root hash computation", 20_000, now_unix()).unwrap();
    assert!(
        result.chunks.iter().any(|c| c.file_path == "merkle.rs"),
        "expected merkle.rs among results, got {:?}",
        result.chunks.iter().map(|c| &c.file_path).collect::<Vec<_>>()
    );
}

#[test]
fn incremental_reindex_after_edit_invalidates_the_cached_query() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.rs"), "fn widget_handler() { return 1; }\n").unwrap();

    let h = harness(dir.path());
    h.controller.start(&h.cfg).unwrap();
    let eng = engine(&h);
    let now = now_unix();

    // Same query text both times, same `now` so the fingerprint is identical;
    // only a correct invalidation (not a stale cache hit) can make the second
    // call see the edited content.
    let first = eng.query("widget handler", 10_000, now).unwrap();
    assert!(first.chunks.iter().any(|c| c.content.contains("return 1")));

    fs::write(dir.path().join("a.rs"), "fn widget_handler() { return 2; }\n").unwrap();
    let status = h.controller.start(&h.cfg).unwrap();
    assert_eq!(status.phase, Phase::Completed);

    let second = eng.query("widget handler", 10_000, now).unwrap();
    assert!(
        second.chunks.iter().any(|c| c.content.contains("return 2")),
        "query after edit should see the new content, not a stale cached result"
    );
}

#[test]
fn deleting_a_file_removes_it_from_subsequent_query_results() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("keep.rs"), "fn stays_around() { do_work(); }\n").unwrap();
    fs::write(dir.path().join("gone.rs"), "fn will_be_deleted() { do_work(); }\n").unwrap();

    let h = harness(dir.path());
    h.controller.start(&h.cfg).unwrap();

    fs::remove_file(dir.path().join("gone.rs")).unwrap();
    h.controller.start(&h.cfg).unwrap();

    let eng = engine(&h);
    let result = eng.query("do work", 10_000, now_unix()).unwrap();
    assert!(!result.chunks.iter().any(|c| c.file_path == "gone.rs"));
}

#[test]
fn forced_reindex_rebuilds_even_unchanged_files() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.rs"), "fn stable_fn() {}\n").unwrap();

    let h = harness(dir.path());
    h.controller.start(&h.cfg).unwrap();
    let status = h.controller.force_reindex(&h.cfg).unwrap();
    assert_eq!(status.chunks_created, 1, "force reindex re-emits unchanged files too");
}

#[test]
fn empty_repository_produces_an_empty_context_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path());
    let status = h.controller.start(&h.cfg).unwrap();
    assert_eq!(status.files_processed, 0);

    let eng = engine(&h);
    let result = eng.query("anything at all", 10_000, now_unix()).unwrap();
    assert!(result.chunks.is_empty());
}
