//! The shared data model: Chunk, VectorDocument, Posting, Query, RetrievalResult,
//! AssembledContext, CacheEntry. Entities here are plain data; behavior lives in
//! the component modules that own them.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The kind of a chunk, attached by the language-specific chunking strategy (or
/// `Unknown`/`File` when none applies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Function,
    Class,
    Struct,
    Interface,
    Comment,
    Paragraph,
    CodeBlock,
    File,
    Unknown,
}

/// A unit of indexed content: the Indexer's sole emitted product.
///
/// `id` is a deterministic function of `file_path` + `content_hash` + chunk-local
/// identity, so re-chunking identical content yields an identical id, and content
/// change always yields a new id. Chunks are immutable after insertion; an "update"
/// is a delete-then-insert at the store layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Repo-relative, forward-slashed, never absolute, never escaping root.
    pub file_path: String,
    pub content: String,
    pub language: String,
    #[serde(rename = "type")]
    pub kind: ChunkKind,
    pub start_line: usize,
    pub end_line: usize,
    pub content_hash: String,
    pub metadata: BTreeMap<String, String>,
    pub indexed_at: u64,
}

impl Chunk {
    /// Conventional metadata key for the chunk's source classification, used by the
    /// re-ranker's authority lookup.
    pub const META_SOURCE_TYPE: &'static str = "source_type";
    pub const META_AUTHORITY: &'static str = "authority";
    pub const META_CREATED_AT: &'static str = "created_at";
    pub const META_UPDATED_AT: &'static str = "updated_at";
    pub const META_FILE_PATH: &'static str = "file_path";
    pub const META_LANGUAGE: &'static str = "language";
    pub const META_KIND: &'static str = "kind";
    pub const META_START_LINE: &'static str = "start_line";
    pub const META_END_LINE: &'static str = "end_line";
    pub const META_CONTENT_HASH: &'static str = "content_hash";
}

/// Map a `Chunk` to the `VectorDocument` the `VectorStore` persists, folding the
/// chunk-identity fields the assembler/dense-retriever need back into metadata
/// (the store only sees a flat id/content/vector/metadata record).
pub fn chunk_to_document(chunk: &Chunk) -> VectorDocument {
    let mut metadata = chunk.metadata.clone();
    metadata.insert(Chunk::META_FILE_PATH.to_string(), chunk.file_path.clone());
    metadata.insert(Chunk::META_LANGUAGE.to_string(), chunk.language.clone());
    metadata.insert(Chunk::META_KIND.to_string(), format!("{:?}", chunk.kind));
    metadata.insert(Chunk::META_START_LINE.to_string(), chunk.start_line.to_string());
    metadata.insert(Chunk::META_END_LINE.to_string(), chunk.end_line.to_string());
    metadata.insert(Chunk::META_CONTENT_HASH.to_string(), chunk.content_hash.clone());
    VectorDocument {
        id: chunk.id.clone(),
        content: chunk.content.clone(),
        vector: Vec::new(),
        metadata,
        created_at: chunk.indexed_at,
        updated_at: chunk.indexed_at,
    }
}

fn parse_kind(s: &str) -> ChunkKind {
    match s {
        "Function" => ChunkKind::Function,
        "Class" => ChunkKind::Class,
        "Struct" => ChunkKind::Struct,
        "Interface" => ChunkKind::Interface,
        "Comment" => ChunkKind::Comment,
        "Paragraph" => ChunkKind::Paragraph,
        "CodeBlock" => ChunkKind::CodeBlock,
        "File" => ChunkKind::File,
        _ => ChunkKind::Unknown,
    }
}

/// Reconstruct a `Chunk` from a stored `VectorDocument`. Fields not folded into
/// metadata at store time (there are none by construction) would fall back to
/// defaults; this is the inverse of `chunk_to_document`.
pub fn document_to_chunk(doc: &VectorDocument) -> Chunk {
    let get = |k: &str| doc.metadata.get(k).cloned().unwrap_or_default();
    Chunk {
        id: doc.id.clone(),
        file_path: get(Chunk::META_FILE_PATH),
        content: doc.content.clone(),
        language: get(Chunk::META_LANGUAGE),
        kind: parse_kind(&get(Chunk::META_KIND)),
        start_line: get(Chunk::META_START_LINE).parse().unwrap_or(0),
        end_line: get(Chunk::META_END_LINE).parse().unwrap_or(0),
        content_hash: get(Chunk::META_CONTENT_HASH),
        metadata: doc.metadata.clone(),
        indexed_at: doc.created_at,
    }
}

/// Current Unix epoch seconds. Centralized so tests can reason about it and so a
/// single conversion point exists if this ever needs to move to a monotonic clock.
pub fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// `{id (= Chunk.id), content, vector, metadata, created_at, updated_at}` — what the
/// VectorStore persists. The Chunk <-> VectorDocument mapping is 1:1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDocument {
    pub id: String,
    pub content: String,
    pub vector: Vec<f32>,
    pub metadata: BTreeMap<String, String>,
    pub created_at: u64,
    pub updated_at: u64,
}

/// A single posting in the InvertedIndex: one term's occurrence in one chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Posting {
    pub chunk_id: String,
    pub term_frequency: u32,
}

/// Corpus-wide statistics the InvertedIndex maintains for BM25 scoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub doc_count: u64,
    pub avg_length: f64,
}

/// A processed query: normalized, tokenized, stemmed, stopword-filtered, with an
/// advisory intent tag. Ephemeral — never persisted.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub raw_text: String,
    pub tokens: Vec<String>,
    pub terms: Vec<String>,
    pub intent_tag: Option<String>,
    pub intent_confidence: f32,
}

/// Which retrieval arm(s) produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultSource {
    Dense,
    Sparse,
    Both,
}

/// One scored candidate surviving fusion + re-rank.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunk: Chunk,
    /// Normalized final score in [0, 1].
    pub score: f32,
    pub component_scores: ComponentScores,
    pub source: ResultSource,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ComponentScores {
    pub dense: f32,
    pub sparse: f32,
    pub fused: f32,
    pub freshness: f32,
    pub authority: f32,
    pub diversity_penalty: f32,
}

/// Output of the Assembler: a coherence-ordered, token-budgeted chunk set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    pub chunks: Vec<Chunk>,
    pub total_tokens: usize,
    pub coherence_score: f32,
    /// Set when a retrieval arm failed and this context was assembled from a
    /// degraded result set (e.g. `"dense_unavailable"` when the embedder
    /// failed and retrieval fell back to sparse-only). `None` for a normal
    /// hybrid query.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub degraded: Option<&'static str>,
}

/// A cached query result plus the chunk ids it cites, used for content-aware
/// invalidation (see `cache.rs`). If any id in `dependency_set` is invalidated,
/// the entry must be treated as absent on the next read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub query_fingerprint: String,
    pub result: AssembledContext,
    pub dependency_set: Vec<String>,
    pub inserted_at: u64,
    pub ttl_secs: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: u64) -> bool {
        now.saturating_sub(self.inserted_at) > self.ttl_secs
    }
}
