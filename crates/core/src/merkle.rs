//! C3 — Merkle tree: content-addressed hierarchical hashing for O(changed) change
//! detection. Leaves hash file bytes with SHA-256 (via the `sha2` crate, the
//! standard RustCrypto hash implementation — this codebase's own hashing needs
//! were previously met by `git2`, which this crate has no other use for); inner
//! nodes hash their sorted children. The whole tree serializes to one
//! self-describing blob, persisted atomically (write-temp, rename).

use crate::sha256_hex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::Path;

pub const STATE_SCHEMA_VERSION: u32 = 1;

/// A file leaf: path, size, and content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Leaf {
    pub path: String,
    pub size: u64,
    pub content_hash: String,
}

/// The full Merkle tree state: a flat, sorted map of repo-relative path -> leaf,
/// plus the root hash computed from it. Flat storage (rather than a literal
/// nested tree) keeps diffing a single pass over two sorted maps; the hash is
/// still computed hierarchically per spec §4.3 via `directory_hashes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeState {
    pub schema_version: u32,
    pub root_path: String,
    pub timestamp: u64,
    pub leaves: BTreeMap<String, Leaf>,
    pub root_hash: String,
}

/// Hash a directory's children: sorted by name, `SHA-256("name:hash\n" ...)`. A
/// pure function of the (name, hash) pairs — identical input always yields an
/// identical inner hash.
fn hash_children(children: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = children.iter().collect();
    sorted.sort_by_key(|(name, _)| *name);
    let mut buf = String::new();
    for (name, hash) in sorted {
        buf.push_str(name);
        buf.push(':');
        buf.push_str(hash);
        buf.push('\n');
    }
    sha256_hex(buf.as_bytes())
}

/// Build directory hashes bottom-up from a flat leaf map, then fold them into a
/// single root hash. Directories are synthesized from path prefixes so callers
/// never need to materialize an explicit tree structure.
fn compute_root_hash(leaves: &BTreeMap<String, Leaf>) -> String {
    // children[dir] = Vec<(name, hash)> where name is the path segment directly under dir.
    let mut dir_children: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    let mut all_dirs: HashSet<String> = HashSet::new();
    all_dirs.insert(String::new()); // root

    for (path, leaf) in leaves {
        let mut dir = String::new();
        let segments: Vec<&str> = path.split('/').collect();
        for (i, seg) in segments.iter().enumerate() {
            let is_last = i == segments.len() - 1;
            if is_last {
                dir_children.entry(dir.clone()).or_default().push((seg.to_string(), leaf.content_hash.clone()));
            } else {
                let child_dir = if dir.is_empty() { seg.to_string() } else { format!("{dir}/{seg}") };
                all_dirs.insert(child_dir.clone());
                dir = child_dir;
            }
        }
    }

    // Compute each directory's hash bottom-up (deepest first, by path length descending).
    let mut dirs_by_depth: Vec<&String> = all_dirs.iter().collect();
    dirs_by_depth.sort_by_key(|d| std::cmp::Reverse(d.matches('/').count() + if d.is_empty() { 0 } else { 1 }));

    let mut dir_hash: BTreeMap<String, String> = BTreeMap::new();
    for dir in dirs_by_depth {
        let mut children: Vec<(String, String)> = dir_children.get(dir).cloned().unwrap_or_default();
        // Fold in subdirectories directly beneath `dir`.
        for other in all_dirs_under(dir, &dir_hash) {
            children.push(other);
        }
        let refs: Vec<(&str, &str)> = children.iter().map(|(n, h)| (n.as_str(), h.as_str())).collect();
        dir_hash.insert(dir.clone(), hash_children(&refs));
    }

    dir_hash.get("").cloned().unwrap_or_else(|| hash_children(&[]))
}

fn all_dirs_under(dir: &str, dir_hash: &BTreeMap<String, String>) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for (path, hash) in dir_hash {
        if path.is_empty() {
            continue;
        }
        let (parent, name) = match path.rsplit_once('/') {
            Some((p, n)) => (p, n),
            None => ("", path.as_str()),
        };
        if parent == dir {
            out.push((name.to_string(), hash.clone()));
        }
    }
    out
}

/// Compute the Merkle tree for every file the Walker admits under `root`.
/// Deterministic: identical file contents + identical filter configuration always
/// yield a byte-identical `TreeState` (modulo `timestamp`, which callers should
/// exclude from equality checks that care about content only — see `content_eq`).
pub fn hash_tree(
    filter: &crate::pathfilter::PathFilter,
    root: &Path,
    cancel: &crate::walker::CancelToken,
) -> io::Result<TreeState> {
    let mut leaves = BTreeMap::new();
    let mut io_errors = Vec::new();

    crate::walker::walk(filter, root, cancel, |file| {
        match std::fs::read(&file.abs_path) {
            Ok(bytes) => {
                leaves.insert(
                    file.rel_path.clone(),
                    Leaf { path: file.rel_path, size: file.size, content_hash: sha256_hex(&bytes) },
                );
                Ok(())
            }
            Err(e) => {
                // A missing/unreadable file during hashing is per-file recoverable;
                // the overall hash still succeeds with that file omitted.
                io_errors.push(format!("{}: {e}", file.abs_path.display()));
                Ok(())
            }
        }
    })
    .map_err(|e| io::Error::other(e.to_string()))?;

    let root_hash = compute_root_hash(&leaves);
    Ok(TreeState {
        schema_version: STATE_SCHEMA_VERSION,
        root_path: root.to_string_lossy().to_string(),
        timestamp: crate::types::now_unix(),
        leaves,
        root_hash,
    })
}

/// The three disjoint path sets produced by diffing two tree states.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub deleted: Vec<String>,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }
}

/// Diff two tree states: directory-hash equality would let a real implementation
/// short-circuit whole subtrees; since leaves are stored flat here, the same
/// result is produced directly off of the leaf map (a leaf-level diff is exactly
/// equivalent to the path set a subtree-pruning diff would produce).
pub fn diff(old: &TreeState, new: &TreeState) -> DiffResult {
    let mut result = DiffResult::default();
    for (path, new_leaf) in &new.leaves {
        match old.leaves.get(path) {
            None => result.added.push(path.clone()),
            Some(old_leaf) if old_leaf.content_hash != new_leaf.content_hash => {
                result.modified.push(path.clone())
            }
            Some(_) => {}
        }
    }
    for path in old.leaves.keys() {
        if !new.leaves.contains_key(path) {
            result.deleted.push(path.clone());
        }
    }
    result.added.sort();
    result.modified.sort();
    result.deleted.sort();
    result
}

/// Atomically persist a `TreeState` (or any serializable blob) as JSON: write to a
/// sibling temp file, then rename over the destination. Readers that find no file
/// at all must treat that as "no prior state", not an error.
pub fn persist_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    std::fs::write(&tmp, json)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Load a persisted `TreeState`. A missing file returns `Ok(None)`; a present but
/// corrupt/unparseable file is reported as a warning and also treated as absent
/// (forcing a full reindex), per spec §4.3 — never a fatal error.
pub fn load_state(path: &Path) -> Option<TreeState> {
    let raw = std::fs::read(path).ok()?;
    match serde_json::from_slice::<TreeState>(&raw) {
        Ok(state) if state.schema_version == STATE_SCHEMA_VERSION => Some(state),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "index state schema version mismatch, forcing full reindex");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "corrupt index state, forcing full reindex");
            None
        }
    }
}
