//! C4 — Chunker: splits a file's bytes into semantic `Chunk` records.
//!
//! Dispatch rule: extension -> language-specific strategy (`treesitter` submodule,
//! feature-gated); fall back to the generic sliding-window splitter below when no
//! strategy applies, or when the language-specific strategy fails to parse. Parse
//! failures never abort a pass — they degrade to generic, silently.

#[cfg(feature = "treesitter")]
mod treesitter;

use crate::sha256_hex;
use crate::types::{Chunk, ChunkKind};
use std::collections::BTreeMap;

/// Derive a chunk id from its canonicalized inputs: `(file_path, kind, identifier,
/// start_line, content_hash)`. Re-chunking identical content yields an identical
/// id; any change to content, position, or identity produces a new one.
fn chunk_id(file_path: &str, kind: ChunkKind, identifier: &str, start_line: usize, content_hash: &str) -> String {
    let input = format!("{file_path}|{kind:?}|{identifier}|{start_line}|{content_hash}");
    sha256_hex(input.as_bytes())
}

/// Extension -> language tag, shared between chunk annotation and the query
/// processor's code-token tokenization.
pub fn language_for_ext(ext: &str) -> &'static str {
    match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "java" => "java",
        "md" | "markdown" => "markdown",
        _ => "unknown",
    }
}

/// Options controlling the generic splitter, sourced from `ConexusConfig`.
#[derive(Debug, Clone, Copy)]
pub struct ChunkOptions {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for ChunkOptions {
    fn default() -> Self {
        Self { max_chunk_size: 2000, overlap_size: 400 }
    }
}

/// Split `content` (the bytes of `file_path`) into chunks. Tries the
/// language-aware strategy first (if the `treesitter` feature is enabled and the
/// extension is supported and parsing succeeds); falls back to the generic
/// sliding-window splitter otherwise.
pub fn chunk_file(file_path: &str, content: &str, ext: &str, opts: ChunkOptions, now: u64) -> Vec<Chunk> {
    #[cfg(feature = "treesitter")]
    {
        if let Some(chunks) = treesitter::try_chunk(file_path, content, ext, now) {
            if !chunks.is_empty() {
                return chunks;
            }
        }
    }
    generic_split(file_path, content, ext, opts, now)
}

/// Generic sliding-window splitter: windows of at most `max_chunk_size` bytes with
/// `overlap_size` bytes of trailing context carried forward, snapping boundaries
/// to the nearest whitespace/newline. Always emits at least one chunk for
/// non-empty input.
pub fn generic_split(file_path: &str, content: &str, ext: &str, opts: ChunkOptions, now: u64) -> Vec<Chunk> {
    if content.is_empty() {
        return Vec::new();
    }

    let language = language_for_ext(ext).to_string();
    let bytes = content.as_bytes();
    let len = bytes.len();
    let max = opts.max_chunk_size.max(1);
    let overlap = opts.overlap_size.min(max.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut start = 0usize;
    let mut chunk_index = 0usize;

    while start < len {
        let mut end = (start + max).min(len);
        if end < len {
            end = snap_to_boundary(bytes, end, start);
        }
        if end <= start {
            end = (start + max).min(len);
        }

        let text = String::from_utf8_lossy(&bytes[start..end]).to_string();
        let start_line = 1 + bytes[..start].iter().filter(|&&b| b == b'\n').count();
        let end_line = 1 + bytes[..end].iter().filter(|&&b| b == b'\n').count();
        let content_hash = sha256_hex(text.as_bytes());
        let id = chunk_id(file_path, ChunkKind::Unknown, &chunk_index.to_string(), start_line, &content_hash);

        chunks.push(Chunk {
            id,
            file_path: file_path.to_string(),
            content: text,
            language: language.clone(),
            kind: ChunkKind::Unknown,
            start_line,
            end_line,
            content_hash,
            metadata: BTreeMap::new(),
            indexed_at: now,
        });

        if end >= len {
            break;
        }
        start = end.saturating_sub(overlap);
        if start == end {
            start = end;
        }
        chunk_index += 1;
    }

    chunks
}

/// Snap a candidate boundary back to the nearest preceding whitespace/newline
/// (but not before `min_start`) so chunk boundaries don't split a token mid-word.
fn snap_to_boundary(bytes: &[u8], candidate: usize, min_start: usize) -> usize {
    let lower_bound = min_start + 1;
    let mut i = candidate;
    while i > lower_bound {
        if bytes[i - 1] == b'\n' || bytes[i - 1] == b' ' || bytes[i - 1] == b'\t' {
            return i;
        }
        i -= 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_empty_input_always_emits_at_least_one_chunk() {
        let chunks = generic_split("a.txt", "hello world", "txt", ChunkOptions::default(), 0);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn empty_input_emits_no_chunks() {
        let chunks = generic_split("a.txt", "", "txt", ChunkOptions::default(), 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn large_input_splits_into_multiple_overlapping_windows() {
        let content = "word ".repeat(1000); // 5000 bytes
        let opts = ChunkOptions { max_chunk_size: 500, overlap_size: 50 };
        let chunks = generic_split("big.txt", &content, "txt", opts, 0);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.content.len() <= 550, "chunk should stay near the configured window");
        }
    }

    #[test]
    fn boundaries_snap_to_whitespace() {
        let content = "aaaaaaaaaa bbbbbbbbbb cccccccccc dddddddddd";
        let opts = ChunkOptions { max_chunk_size: 15, overlap_size: 2 };
        let chunks = generic_split("a.txt", content, "txt", opts, 0);
        for c in &chunks[..chunks.len().saturating_sub(1)] {
            assert!(
                c.content.ends_with(' ') || c.content.ends_with('\n') || c.content.len() < 15,
                "non-final chunk {:?} should end on a boundary",
                c.content
            );
        }
    }

    #[test]
    fn identical_content_yields_identical_ids() {
        let a = generic_split("a.txt", "hello world, this is a test", "txt", ChunkOptions::default(), 0);
        let b = generic_split("a.txt", "hello world, this is a test", "txt", ChunkOptions::default(), 999);
        assert_eq!(a[0].id, b[0].id, "id must not depend on indexed_at");
    }

    #[test]
    fn different_content_yields_different_ids() {
        let a = generic_split("a.txt", "hello world", "txt", ChunkOptions::default(), 0);
        let b = generic_split("a.txt", "hello there", "txt", ChunkOptions::default(), 0);
        assert_ne!(a[0].id, b[0].id);
    }

    #[test]
    fn line_numbers_reflect_source_position() {
        let content = "line one\nline two\nline three\n";
        let opts = ChunkOptions { max_chunk_size: 9, overlap_size: 0 };
        let chunks = generic_split("a.txt", content, "txt", opts, 0);
        assert_eq!(chunks[0].start_line, 1);
        assert!(chunks.last().unwrap().end_line >= chunks[0].start_line);
    }
}
