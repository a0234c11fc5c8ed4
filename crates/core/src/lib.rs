//! conexus-core: content-addressed incremental indexing plus hybrid
//! dense+sparse retrieval over a local codebase.
//!
//! Modules map directly onto the pipeline's components: Path filter (C1) and
//! Walker (C2) discover files; the Merkle tree (C3) detects what changed;
//! the Chunker (C4) splits changed files into `Chunk`s; the Indexer (C5),
//! supervised by the Index controller (C6), embeds and stores them; the
//! Query processor (C7), Dense (C8) and Sparse (C9) retrievers, Fusion/rerank
//! (C10), Cache (C11), and Assembler (C12) answer queries end to end through
//! the Query engine (C13).

pub mod assembler;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod controller;
pub mod dense;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod indexer;
pub mod merkle;
pub mod pathfilter;
pub mod query;
pub mod sparse;
pub mod store;
pub mod tokenizer;
pub mod traits;
pub mod types;
pub mod walker;

use sha2::{Digest, Sha256};

/// Shared SHA-256 hex digest, used wherever this crate needs a content hash:
/// Merkle leaves, chunk ids, and cache fingerprints.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_is_stable_and_64_chars() {
        let a = sha256_hex(b"hello");
        let b = sha256_hex(b"hello");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn sha256_hex_differs_for_different_input() {
        assert_ne!(sha256_hex(b"hello"), sha256_hex(b"world"));
    }
}
