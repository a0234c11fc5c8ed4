//! C2 — Walker: deterministic filesystem traversal driven by the Path filter (C1),
//! built on `ignore::WalkBuilder` the same way this codebase's directory scan has
//! always been built, but walked single-producer (not `WalkParallel`) so that the
//! ordering guarantee the spec requires is trivial rather than requiring a
//! post-hoc sort.

use crate::pathfilter::{to_repo_relative, PathFilter};
use ignore::WalkBuilder;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative cancellation handle, threaded through every long-running operation
/// in this crate. Checking happens at least once per file processed, matching the
/// concurrency model's cancellation checkpoint requirement.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One file discovered by the walk.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub abs_path: PathBuf,
    pub rel_path: String,
    pub size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    #[error("walk cancelled")]
    Cancelled,
    #[error("callback error for {path}: {message}")]
    Callback { path: PathBuf, message: String },
}

/// Outcome of a walk: files the callback was invoked for, plus any directory-read
/// errors encountered along the way (the walk still returns partial results).
pub struct WalkOutcome {
    pub files_visited: usize,
    pub read_errors: Vec<String>,
}

/// Depth-first traversal of `root`(provided via `filter`), invoking `on_file` for
/// every path C1 admits. Honors `cancel`: checked once per entry, so cancellation
/// preempts the walk within at most one file's work latency. A callback error
/// terminates the walk immediately and is surfaced to the caller.
pub fn walk(
    filter: &PathFilter,
    root: &std::path::Path,
    cancel: &CancelToken,
    mut on_file: impl FnMut(FileInfo) -> Result<(), String>,
) -> Result<WalkOutcome, WalkError> {
    let mut files_visited = 0usize;
    let mut read_errors = Vec::new();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .git_ignore(true)
        .git_global(false)
        .git_exclude(false)
        .build();

    for entry in walker {
        if cancel.is_cancelled() {
            return Err(WalkError::Cancelled);
        }
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                read_errors.push(e.to_string());
                continue;
            }
        };

        let path = entry.path();
        let Some(rel) = to_repo_relative(root, path) else { continue };
        let rel_path_buf = PathBuf::from(&rel);

        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            if !rel.is_empty() && filter.excludes_dir(&rel_path_buf) {
                continue;
            }
            continue;
        }

        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }

        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        if !filter.admits_file(&rel_path_buf, size) {
            continue;
        }

        files_visited += 1;
        on_file(FileInfo { abs_path: path.to_path_buf(), rel_path: rel, size })
            .map_err(|message| WalkError::Callback { path: path.to_path_buf(), message })?;
    }

    Ok(WalkOutcome { files_visited, read_errors })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.rs"), "fn a() {}").unwrap();
        fs::write(dir.path().join("b.rs"), "fn b() {}").unwrap();
        fs::create_dir(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("node_modules/ignored.js"), "ignored").unwrap();
        dir
    }

    #[test]
    fn walk_visits_admitted_files_and_skips_ignored_dirs() {
        let dir = setup();
        let filter = PathFilter::new(dir.path(), &[], 0);
        let mut seen = Vec::new();
        let outcome =
            walk(&filter, dir.path(), &CancelToken::new(), |f| {
                seen.push(f.rel_path);
                Ok(())
            })
            .unwrap();
        seen.sort();
        assert_eq!(seen, vec!["a.rs".to_string(), "b.rs".to_string()]);
        assert_eq!(outcome.files_visited, 2);
    }

    #[test]
    fn cancellation_preempts_walk() {
        let dir = setup();
        let filter = PathFilter::new(dir.path(), &[], 0);
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = walk(&filter, dir.path(), &cancel, |_| Ok(()));
        assert!(matches!(result, Err(WalkError::Cancelled)));
    }

    #[test]
    fn callback_error_terminates_walk() {
        let dir = setup();
        let filter = PathFilter::new(dir.path(), &[], 0);
        let result = walk(&filter, dir.path(), &CancelToken::new(), |_| Err("boom".to_string()));
        assert!(matches!(result, Err(WalkError::Callback { .. })));
    }

    #[test]
    fn empty_repo_yields_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let filter = PathFilter::new(dir.path(), &[], 0);
        let outcome = walk(&filter, dir.path(), &CancelToken::new(), |_| Ok(())).unwrap();
        assert_eq!(outcome.files_visited, 0);
    }
}
