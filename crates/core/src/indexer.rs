//! C5 — Indexer: orchestrates the Path filter, Walker, Merkle tree, and Chunker
//! against the `Embedder`/`VectorStore`/`InvertedIndex` collaborators, in full
//! and incremental modes, with atomic state persistence.

use crate::chunk::{chunk_file, ChunkOptions};
use crate::config::ConexusConfig;
use crate::error::{ConexusError, Result};
use crate::merkle::{self, DiffResult, TreeState};
use crate::pathfilter::PathFilter;
use crate::traits::{Embedder, InvertedIndex, VectorStore};
use crate::types::{now_unix, Chunk};
use crate::walker::CancelToken;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default on-disk location of the persisted `IndexState`, relative to the repo root.
pub const STATE_RELATIVE_PATH: &str = ".conexus/state.json";

/// Options for a single `Index`/`IndexIncremental` call (spec §6 request surface).
#[derive(Debug, Clone)]
pub struct IndexOptions {
    pub root_path: PathBuf,
    pub ignore_patterns: Vec<String>,
    pub max_file_size: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl IndexOptions {
    pub fn from_config(cfg: &ConexusConfig) -> Self {
        Self {
            root_path: cfg.root.clone(),
            ignore_patterns: Vec::new(),
            max_file_size: cfg.max_file_size,
            chunk_size: cfg.chunk_size,
            chunk_overlap: cfg.chunk_overlap,
        }
    }
}

/// Port the Indexer calls to notify the Cache of content changes. The cache does
/// not hold a back-reference to the indexer (design notes: unidirectional
/// dependency, Indexer -> Invalidator).
pub trait Invalidator: Send + Sync {
    fn invalidate(&self, changed_chunk_ids: &[String]);
}

/// A no-op invalidator for callers that run the indexer without a cache attached.
pub struct NullInvalidator;
impl Invalidator for NullInvalidator {
    fn invalidate(&self, _changed_chunk_ids: &[String]) {}
}

pub struct IndexRunResult {
    pub chunks: Vec<Chunk>,
    pub state: TreeState,
    pub diff: DiffResult,
}

pub struct Indexer {
    embedder: Option<Arc<dyn Embedder>>,
    vector_store: Arc<dyn VectorStore>,
    inverted_index: Arc<dyn InvertedIndex>,
    invalidator: Arc<dyn Invalidator>,
    embed_batch_size: usize,
    store_batch_size: usize,
}

impl Indexer {
    pub fn new(
        embedder: Option<Arc<dyn Embedder>>,
        vector_store: Arc<dyn VectorStore>,
        inverted_index: Arc<dyn InvertedIndex>,
        invalidator: Arc<dyn Invalidator>,
        embed_batch_size: usize,
    ) -> Self {
        Self::with_store_batch_size(embedder, vector_store, inverted_index, invalidator, embed_batch_size, 100)
    }

    /// Same as `new`, but lets the storage-write batch size (spec §5: distinct
    /// from the embedding batch size) be set explicitly rather than defaulted.
    pub fn with_store_batch_size(
        embedder: Option<Arc<dyn Embedder>>,
        vector_store: Arc<dyn VectorStore>,
        inverted_index: Arc<dyn InvertedIndex>,
        invalidator: Arc<dyn Invalidator>,
        embed_batch_size: usize,
        store_batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            inverted_index,
            invalidator,
            embed_batch_size: embed_batch_size.max(1),
            store_batch_size: store_batch_size.max(1),
        }
    }

    fn state_path(&self, opts: &IndexOptions) -> PathBuf {
        opts.root_path.join(STATE_RELATIVE_PATH)
    }

    /// Full pass: walk everything, chunk every admitted file, embed+store in
    /// batches, rebuild postings, and atomically persist a fresh `TreeState`.
    /// Returns the full list of emitted chunks.
    pub fn index(&self, opts: &IndexOptions, cancel: &CancelToken) -> Result<IndexRunResult> {
        let filter = PathFilter::new(&opts.root_path, &opts.ignore_patterns, opts.max_file_size);
        let state = merkle::hash_tree(&filter, &opts.root_path, cancel)
            .map_err(|e| ConexusError::TransientIOError { id: "walk".into(), source: e })?;

        let chunk_opts = ChunkOptions { max_chunk_size: opts.chunk_size, overlap_size: opts.chunk_overlap };
        let now = now_unix();

        let paths: Vec<&String> = state.leaves.keys().collect();
        let all_chunks: Vec<Chunk> = paths
            .par_iter()
            .flat_map(|rel_path| {
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                self.chunk_one_file(&opts.root_path, rel_path, chunk_opts, now)
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(ConexusError::ConfigurationError("index run cancelled".into()));
        }

        self.store_chunks(&all_chunks)?;
        self.invalidator.invalidate(&all_chunks.iter().map(|c| c.id.clone()).collect::<Vec<_>>());

        merkle::persist_atomic(&self.state_path(opts), &state)
            .map_err(|e| ConexusError::FatalStoreError {
                operation: "persist_index_state",
                id: self.state_path(opts).display().to_string(),
                cause: e.to_string(),
            })?;

        debug!(files = state.leaves.len(), chunks = all_chunks.len(), "full index pass complete");
        Ok(IndexRunResult { chunks: all_chunks, state, diff: DiffResult::default() })
    }

    /// Change-driven pass against `previous_state`. Falls back to `index` if
    /// `previous_state` is absent. Returns only the chunks produced for
    /// added/modified paths — deletions are authoritative in the store but
    /// intentionally not present in the return value.
    pub fn index_incremental(
        &self,
        opts: &IndexOptions,
        previous_state: Option<&TreeState>,
        cancel: &CancelToken,
    ) -> Result<IndexRunResult> {
        let Some(previous) = previous_state else {
            return self.index(opts, cancel);
        };

        let filter = PathFilter::new(&opts.root_path, &opts.ignore_patterns, opts.max_file_size);
        let new_state = merkle::hash_tree(&filter, &opts.root_path, cancel)
            .map_err(|e| ConexusError::TransientIOError { id: "walk".into(), source: e })?;

        let diff = merkle::diff(previous, &new_state);
        if diff.is_empty() {
            debug!("incremental pass: no changes detected");
            return Ok(IndexRunResult { chunks: Vec::new(), state: new_state, diff });
        }

        let mut changed_ids = Vec::new();

        // Deletions happen-before insertions for the same file (ordering guarantee).
        for path in diff.deleted.iter().chain(diff.modified.iter()) {
            let mut filters = BTreeMap::new();
            filters.insert("file_path".to_string(), path.clone());
            match self.vector_store.delete_by_filter(&filters) {
                Ok(removed_ids) => {
                    for id in &removed_ids {
                        self.inverted_index.remove(id);
                    }
                    changed_ids.extend(removed_ids);
                }
                Err(e) => {
                    return Err(ConexusError::FatalStoreError {
                        operation: "delete_by_filter",
                        id: path.clone(),
                        cause: e.to_string(),
                    })
                }
            }
        }

        let chunk_opts = ChunkOptions { max_chunk_size: opts.chunk_size, overlap_size: opts.chunk_overlap };
        let now = now_unix();
        let to_chunk: Vec<&String> = diff.added.iter().chain(diff.modified.iter()).collect();

        let new_chunks: Vec<Chunk> = to_chunk
            .par_iter()
            .flat_map(|rel_path| {
                if cancel.is_cancelled() {
                    return Vec::new();
                }
                self.chunk_one_file(&opts.root_path, rel_path, chunk_opts, now)
            })
            .collect();

        if cancel.is_cancelled() {
            return Err(ConexusError::ConfigurationError("incremental index run cancelled".into()));
        }

        self.store_chunks(&new_chunks)?;
        changed_ids.extend(new_chunks.iter().map(|c| c.id.clone()));
        self.invalidator.invalidate(&changed_ids);

        merkle::persist_atomic(&self.state_path(opts), &new_state).map_err(|e| ConexusError::FatalStoreError {
            operation: "persist_index_state",
            id: self.state_path(opts).display().to_string(),
            cause: e.to_string(),
        })?;

        debug!(
            added = diff.added.len(),
            modified = diff.modified.len(),
            deleted = diff.deleted.len(),
            chunks_emitted = new_chunks.len(),
            "incremental index pass complete"
        );
        Ok(IndexRunResult { chunks: new_chunks, state: new_state, diff })
    }

    /// Reindex a single path in isolation: delete any documents already stored
    /// for it, then chunk+embed+store it fresh. The per-path primitive behind
    /// the Index controller's `ReindexPaths` loop — same delete-then-insert
    /// shape as the `modified` step of `index_incremental`, just callable one
    /// path at a time so the controller can report progress and honor
    /// cancellation between paths.
    pub fn reindex_path(&self, opts: &IndexOptions, rel_path: &str, cancel: &CancelToken) -> Result<Vec<Chunk>> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let mut filters = BTreeMap::new();
        filters.insert("file_path".to_string(), rel_path.to_string());
        let mut changed_ids = self.vector_store.delete_by_filter(&filters).map_err(|e| ConexusError::FatalStoreError {
            operation: "delete_by_filter",
            id: rel_path.to_string(),
            cause: e.to_string(),
        })?;
        for id in &changed_ids {
            self.inverted_index.remove(id);
        }

        let chunk_opts = ChunkOptions { max_chunk_size: opts.chunk_size, overlap_size: opts.chunk_overlap };
        let chunks = self.chunk_one_file(&opts.root_path, rel_path, chunk_opts, now_unix());
        self.store_chunks(&chunks)?;

        changed_ids.extend(chunks.iter().map(|c| c.id.clone()));
        self.invalidator.invalidate(&changed_ids);
        Ok(chunks)
    }

    fn chunk_one_file(&self, root: &std::path::Path, rel_path: &str, opts: ChunkOptions, now: u64) -> Vec<Chunk> {
        let abs_path = root.join(rel_path);
        let content = match std::fs::read_to_string(&abs_path) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = rel_path, error = %e, "skipping unreadable file");
                return Vec::new();
            }
        };
        let ext = rel_path.rsplit_once('.').map(|(_, e)| e).unwrap_or("");
        chunk_file(rel_path, &content, ext, opts, now)
    }

    /// Embed (in `embed_batch_size`-sized batches, fault-tolerant per chunk),
    /// then upsert into the VectorStore + InvertedIndex in separately-sized
    /// `store_batch_size` batches — the two knobs cover distinct concerns (a
    /// model call vs. a storage write) and need not agree. A failed embed logs
    /// and skips that chunk; a storage failure is fatal and aborts the pass.
    fn store_chunks(&self, chunks: &[Chunk]) -> Result<()> {
        let mut embedded: Vec<(&Chunk, Option<Vec<f32>>)> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(self.embed_batch_size) {
            if let Some(embedder) = &self.embedder {
                let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
                let results = embedder.embed_batch(&texts);
                for (chunk, result) in batch.iter().zip(results) {
                    match result {
                        Ok(vector) => embedded.push((chunk, Some(vector))),
                        Err(e) => {
                            warn!(chunk_id = %chunk.id, error = %e, "embedding failed, skipping chunk");
                        }
                    }
                }
            } else {
                for chunk in batch {
                    embedded.push((chunk, None));
                }
            }
        }

        for write_batch in embedded.chunks(self.store_batch_size) {
            let docs: Vec<crate::types::VectorDocument> = write_batch
                .iter()
                .map(|(chunk, vector)| {
                    let mut doc = crate::types::chunk_to_document(chunk);
                    doc.vector = vector.clone().unwrap_or_default();
                    doc
                })
                .collect();
            let first_id = write_batch.first().map(|(chunk, _)| chunk.id.clone()).unwrap_or_default();
            self.vector_store.upsert_batch(docs).map_err(|e| ConexusError::FatalStoreError {
                operation: "upsert_batch",
                id: first_id,
                cause: e.to_string(),
            })?;

            for (chunk, _) in write_batch {
                let terms = tokenize_for_postings(&chunk.content);
                self.inverted_index.add(&chunk.id, &terms);
            }
        }
        Ok(())
    }
}

/// Tokenize chunk content into term -> frequency for posting-list construction.
/// Shares the code-token-aware splitting used by the query processor so index
/// and query terms line up.
fn tokenize_for_postings(content: &str) -> BTreeMap<String, u32> {
    let mut freqs = BTreeMap::new();
    for token in crate::query::code_aware_tokens(content) {
        *freqs.entry(token).or_insert(0) += 1;
    }
    freqs
}
