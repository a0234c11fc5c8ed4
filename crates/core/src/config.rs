//! Runtime configuration, loaded from an optional `.conexus.toml` with fallback to
//! built-in defaults — no configuration file is required to run. Mirrors this
//! codebase's existing `ScanConfig`/`.codescope.toml` convention: a plain struct
//! with sensible constructor defaults, optionally overridden field-by-field from a
//! parsed TOML document.

use crate::error::{ConexusError, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default fusion weight for the dense arm (Linear fusion).
pub const DEFAULT_ALPHA: f32 = 0.6;
/// Default fusion weight for the sparse arm (Linear fusion).
pub const DEFAULT_BETA: f32 = 0.4;
/// Reciprocal Rank Fusion's rank-damping constant.
pub const DEFAULT_RRF_K: f32 = 60.0;

/// Default multi-factor re-rank weights: (similarity, freshness, authority, diversity).
pub const DEFAULT_RERANK_WEIGHTS: (f32, f32, f32, f32) = (0.35, 0.15, 0.20, 0.30);

/// BM25 term-frequency saturation parameter.
pub const DEFAULT_BM25_K1: f32 = 1.5;
/// BM25 length-normalization parameter.
pub const DEFAULT_BM25_B: f32 = 0.75;

#[derive(Clone, Debug)]
pub struct ConexusConfig {
    pub root: PathBuf,
    /// Directory names to skip during traversal, in addition to `.gitignore`.
    pub skip_dirs: HashSet<String>,
    /// Maximum file size in bytes admitted by the Walker; 0 = unbounded.
    pub max_file_size: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// Embedding batch size for the Indexer.
    pub embed_batch_size: usize,
    /// Storage write batch size for the Indexer.
    pub store_batch_size: usize,
    pub k_dense: usize,
    pub k_sparse: usize,
    pub fusion_alpha: f32,
    pub fusion_beta: f32,
    pub rrf_k: f32,
    pub rerank_weights: (f32, f32, f32, f32),
    pub bm25_k1: f32,
    pub bm25_b: f32,
    pub diversity_penalty_factor: f32,
    /// Discount applied to a chunk's effective token cost in the Assembler when
    /// another already-chosen chunk shares its `file_path` (a same-file
    /// continuation packs more cheaply than a chunk from a new file).
    pub assembler_diversity_weight: f32,
    pub min_relevance: f32,
    /// `source_type` metadata value -> authority weight in [0, 1]. Configuration,
    /// not a hardcoded taxonomy (see DESIGN.md open-question decisions).
    pub authority_table: std::collections::BTreeMap<String, f32>,
    pub cache_t1_capacity: usize,
    pub cache_t1_ttl_secs: u64,
    pub cache_t2_ttl_secs: u64,
    pub cache_t3_ttl_secs: u64,
    pub default_token_budget: usize,
}

impl ConexusConfig {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            skip_dirs: [".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_file_size: 1_000_000,
            chunk_size: 2000,
            chunk_overlap: 400,
            embed_batch_size: 32,
            store_batch_size: 100,
            k_dense: 50,
            k_sparse: 50,
            fusion_alpha: DEFAULT_ALPHA,
            fusion_beta: DEFAULT_BETA,
            rrf_k: DEFAULT_RRF_K,
            rerank_weights: DEFAULT_RERANK_WEIGHTS,
            bm25_k1: DEFAULT_BM25_K1,
            bm25_b: DEFAULT_BM25_B,
            diversity_penalty_factor: 0.1,
            assembler_diversity_weight: 0.5,
            min_relevance: 0.5,
            authority_table: Default::default(),
            cache_t1_capacity: 512,
            cache_t1_ttl_secs: 3600,
            cache_t2_ttl_secs: 24 * 3600,
            cache_t3_ttl_secs: 7 * 24 * 3600,
            default_token_budget: 50_000,
        }
    }

    /// Load from `<root>/.conexus.toml` if present, falling back field-by-field to
    /// defaults. A present-but-unparseable file is a hard `ConfigurationError`;
    /// an absent file is not an error at all.
    pub fn load(root: PathBuf) -> Result<Self> {
        let mut cfg = Self::new(root.clone());
        let toml_path = root.join(".conexus.toml");
        if !toml_path.exists() {
            return Ok(cfg);
        }
        let raw = std::fs::read_to_string(&toml_path).map_err(|e| {
            ConexusError::ConfigurationError(format!("cannot read {}: {e}", toml_path.display()))
        })?;
        let file: ConfigFile = toml::from_str(&raw).map_err(|e| {
            ConexusError::ConfigurationError(format!("invalid {}: {e}", toml_path.display()))
        })?;
        file.apply(&mut cfg);
        Ok(cfg)
    }
}

impl Default for ConexusConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("."))
    }
}

/// On-disk `.conexus.toml` schema. Every field optional; absence keeps the default.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    max_file_size: Option<u64>,
    chunk_size: Option<usize>,
    chunk_overlap: Option<usize>,
    embed_batch_size: Option<usize>,
    store_batch_size: Option<usize>,
    k_dense: Option<usize>,
    k_sparse: Option<usize>,
    fusion_alpha: Option<f32>,
    fusion_beta: Option<f32>,
    min_relevance: Option<f32>,
    default_token_budget: Option<usize>,
    skip_dirs: Option<Vec<String>>,
    authority: Option<std::collections::BTreeMap<String, f32>>,
    cache_t1_capacity: Option<usize>,
    cache_t1_ttl_secs: Option<u64>,
    cache_t2_ttl_secs: Option<u64>,
    cache_t3_ttl_secs: Option<u64>,
}

impl ConfigFile {
    fn apply(self, cfg: &mut ConexusConfig) {
        if let Some(v) = self.max_file_size {
            cfg.max_file_size = v;
        }
        if let Some(v) = self.chunk_size {
            cfg.chunk_size = v;
        }
        if let Some(v) = self.chunk_overlap {
            cfg.chunk_overlap = v;
        }
        if let Some(v) = self.embed_batch_size {
            cfg.embed_batch_size = v;
        }
        if let Some(v) = self.store_batch_size {
            cfg.store_batch_size = v;
        }
        if let Some(v) = self.k_dense {
            cfg.k_dense = v;
        }
        if let Some(v) = self.k_sparse {
            cfg.k_sparse = v;
        }
        if let Some(v) = self.fusion_alpha {
            cfg.fusion_alpha = v;
        }
        if let Some(v) = self.fusion_beta {
            cfg.fusion_beta = v;
        }
        if let Some(v) = self.min_relevance {
            cfg.min_relevance = v;
        }
        if let Some(v) = self.default_token_budget {
            cfg.default_token_budget = v;
        }
        if let Some(v) = self.skip_dirs {
            cfg.skip_dirs = v.into_iter().collect();
        }
        if let Some(v) = self.authority {
            cfg.authority_table = v;
        }
        if let Some(v) = self.cache_t1_capacity {
            cfg.cache_t1_capacity = v;
        }
        if let Some(v) = self.cache_t1_ttl_secs {
            cfg.cache_t1_ttl_secs = v;
        }
        if let Some(v) = self.cache_t2_ttl_secs {
            cfg.cache_t2_ttl_secs = v;
        }
        if let Some(v) = self.cache_t3_ttl_secs {
            cfg.cache_t3_ttl_secs = v;
        }
    }
}

/// Look up the authority weight for a chunk's `source_type`, defaulting to a
/// neutral 0.5 for unconfigured source types (never a hard failure: the spec
/// requires the table be configuration, not a baked-in taxonomy).
pub fn authority_lookup(table: &std::collections::BTreeMap<String, f32>, source_type: Option<&str>) -> f32 {
    match source_type {
        Some(st) => table.get(st).copied().unwrap_or(0.5),
        None => 0.5,
    }
}
