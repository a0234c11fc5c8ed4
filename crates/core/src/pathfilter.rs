//! C1 — Path filter: .gitignore-style pattern matching, a file-size gate, and
//! path-traversal validation. Built on the `ignore` crate's gitignore matcher,
//! the same crate this codebase has always used for directory scanning, rather
//! than hand-rolling glob semantics.

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Default skip directories, mirroring this codebase's scan configuration.
pub const DEFAULT_SKIP_DIRS: &[&str] =
    &[".git", "node_modules", "__pycache__", "target", "dist", "build", ".next", "vendor", ".conexus"];

#[derive(Debug, thiserror::Error)]
pub enum PathFilterError {
    #[error("path escapes repository root: {0}")]
    Traversal(PathBuf),
    #[error("empty path")]
    Empty,
}

/// Evaluates .gitignore-style patterns (wildcards, `**`, negation, anchoring) plus
/// a default skip-dir set and a file-size gate, against paths relative to a fixed
/// repository root.
pub struct PathFilter {
    root: PathBuf,
    matcher: Gitignore,
    max_file_size: u64,
}

impl PathFilter {
    /// Build a filter from a repo root, extra ignore patterns, and a max file size
    /// (0 = unbounded). Patterns are evaluated last-match-wins, per .gitignore
    /// semantics; the default skip-dir set is added first so caller patterns can
    /// override it with `!` negation.
    pub fn new(root: impl Into<PathBuf>, extra_patterns: &[String], max_file_size: u64) -> Self {
        let root = root.into();
        let mut builder = GitignoreBuilder::new(&root);
        for dir in DEFAULT_SKIP_DIRS {
            let _ = builder.add_line(None, &format!("{dir}/"));
        }
        for pattern in extra_patterns {
            let _ = builder.add_line(None, pattern);
        }
        let matcher = builder.build().unwrap_or_else(|_| Gitignore::empty());
        Self { root, matcher, max_file_size }
    }

    /// Whether a directory should be skipped wholesale (the Walker must not
    /// descend into it at all).
    pub fn excludes_dir(&self, rel_path: &Path) -> bool {
        self.matcher.matched(rel_path, true).is_ignore()
    }

    /// Whether a regular file is admitted: neither ignored by pattern nor over
    /// the size gate. `size` is the file's byte length.
    pub fn admits_file(&self, rel_path: &Path, size: u64) -> bool {
        if self.matcher.matched(rel_path, false).is_ignore() {
            return false;
        }
        if self.max_file_size > 0 && size > self.max_file_size {
            return false;
        }
        true
    }

    /// Resolve and validate a repo-relative path, rejecting traversal attacks and
    /// anything that escapes the configured root. This is the security invariant
    /// from spec §4.1: no ingestion of out-of-tree files.
    pub fn validate_path(&self, rel_path: &str) -> Result<PathBuf, PathFilterError> {
        if rel_path.is_empty() {
            return Err(PathFilterError::Empty);
        }
        if rel_path.contains("..") || rel_path.starts_with('/') || rel_path.starts_with('\\') {
            return Err(PathFilterError::Traversal(PathBuf::from(rel_path)));
        }
        let full = self.root.join(rel_path);
        let root_canonical = self.root.canonicalize().unwrap_or_else(|_| self.root.clone());
        let full_canonical = full.canonicalize().unwrap_or(full);
        if !full_canonical.starts_with(&root_canonical) {
            return Err(PathFilterError::Traversal(full_canonical));
        }
        Ok(full_canonical)
    }
}

/// Convert a path to a repo-relative, forward-slashed string — the canonical
/// `Chunk.file_path` / Merkle-leaf representation, stable across OSes.
pub fn to_repo_relative(root: &Path, abs: &Path) -> Option<String> {
    let rel = abs.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}
