//! Language-aware chunking strategy: tree-sitter symbol extraction, emitting one
//! `Chunk` per top-level function/class/struct/trait/impl/interface, annotated
//! with `function_name`/`receiver`/`type_name` metadata. Falls back silently
//! (returns `None`) on unsupported extensions or parse failure so the generic
//! splitter in `chunk::generic_split` can take over.

use crate::sha256_hex;
use crate::types::{Chunk, ChunkKind};
use std::collections::BTreeMap;
use tree_sitter::{Language, Node, Parser};

fn chunk_id(file_path: &str, kind: ChunkKind, identifier: &str, start_line: usize, content_hash: &str) -> String {
    let input = format!("{file_path}|{kind:?}|{identifier}|{start_line}|{content_hash}");
    sha256_hex(input.as_bytes())
}

fn language_for_ext(ext: &str) -> Option<Language> {
    match ext {
        "rs" => Some(tree_sitter_rust::LANGUAGE.into()),
        "ts" | "tsx" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "py" | "pyi" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" | "h" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

fn classify_node(kind: &str) -> Option<ChunkKind> {
    match kind {
        "function_item" | "function_declaration" | "function_definition" => Some(ChunkKind::Function),
        "method_definition" | "method_declaration" => Some(ChunkKind::Function),
        "struct_item" | "struct_specifier" => Some(ChunkKind::Struct),
        "class_declaration" | "class_definition" | "class_specifier" => Some(ChunkKind::Class),
        "interface_declaration" => Some(ChunkKind::Interface),
        "trait_item" | "impl_item" => Some(ChunkKind::Class),
        "enum_item" | "enum_specifier" | "enum_declaration" => Some(ChunkKind::Struct),
        _ => None,
    }
}

fn extract_name<'a>(node: &Node<'a>, source: &'a [u8]) -> Option<String> {
    for field in &["name", "type"] {
        if let Some(name_node) = node.child_by_field_name(*field) {
            if let Ok(text) = name_node.utf8_text(source) {
                let name = text.trim();
                if !name.is_empty() {
                    return Some(name.to_string());
                }
            }
        }
    }
    None
}

/// The receiver a method is defined on, per grammar: Rust's explicit
/// `self_parameter`, Go's explicit `receiver` field, JS/TS/Java's implicit
/// `this`, Python's conventional first `self`/`cls` parameter. `None` for a
/// free function or when the grammar gives no reliable signal (e.g. C/C++).
fn extract_receiver<'a>(node_kind: &str, node: &Node<'a>, source: &'a [u8]) -> Option<String> {
    match node_kind {
        "function_item" => {
            let params = node.child_by_field_name("parameters")?;
            let mut cursor = params.walk();
            params
                .children(&mut cursor)
                .find(|c| c.kind() == "self_parameter")
                .and_then(|c| c.utf8_text(source).ok())
                .map(|s| s.trim().to_string())
        }
        "method_declaration" => {
            if let Some(receiver) = node.child_by_field_name("receiver") {
                let text = receiver.utf8_text(source).ok()?;
                Some(text.trim_start_matches('(').trim_end_matches(')').trim().to_string())
            } else {
                Some("this".to_string())
            }
        }
        "method_definition" => Some("this".to_string()),
        "function_definition" => {
            let params = node.child_by_field_name("parameters")?;
            let mut cursor = params.walk();
            let first = params.children(&mut cursor).find(|c| c.kind() == "identifier")?;
            let text = first.utf8_text(source).ok()?;
            (text == "self" || text == "cls").then(|| text.to_string())
        }
        _ => None,
    }
}

/// Parse `content` with the extension's tree-sitter grammar and emit one chunk
/// per top-level symbol. Returns `None` (never an error) if the extension is
/// unsupported or the parser fails to produce a tree.
pub fn try_chunk(file_path: &str, content: &str, ext: &str, now: u64) -> Option<Vec<Chunk>> {
    let language = language_for_ext(ext)?;
    let mut parser = Parser::new();
    parser.set_language(&language).ok()?;
    let tree = parser.parse(content, None)?;
    let root = tree.root_node();
    let source = content.as_bytes();
    let lang_tag = super::language_for_ext(ext).to_string();

    let mut chunks = Vec::new();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_symbols(&child, source, file_path, &lang_tag, now, &mut chunks);
    }

    Some(chunks)
}

fn collect_symbols(
    node: &Node,
    source: &[u8],
    file_path: &str,
    language: &str,
    now: u64,
    out: &mut Vec<Chunk>,
) {
    let kind = node.kind();
    if let Some(chunk_kind) = classify_node(kind) {
        let name = extract_name(node, source).unwrap_or_else(|| "anonymous".to_string());
        let start_line = node.start_position().row + 1;
        let end_line = node.end_position().row + 1;
        let text = node.utf8_text(source).unwrap_or("").to_string();
        if !text.trim().is_empty() {
            let content_hash = sha256_hex(text.as_bytes());
            let id = chunk_id(file_path, chunk_kind, &name, start_line, &content_hash);
            let mut metadata = BTreeMap::new();
            if chunk_kind == ChunkKind::Function {
                metadata.insert("function_name".to_string(), name);
                if let Some(receiver) = extract_receiver(kind, node, source) {
                    metadata.insert("receiver".to_string(), receiver);
                }
            } else {
                metadata.insert("type_name".to_string(), name);
            }
            out.push(Chunk {
                id,
                file_path: file_path.to_string(),
                content: text,
                language: language.to_string(),
                kind: chunk_kind,
                start_line,
                end_line,
                content_hash,
                metadata,
                indexed_at: now,
            });
        }
        // Methods inside classes/impls are still emitted as their own chunks;
        // don't descend further to avoid re-chunking the same body twice.
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_symbols(&child, source, file_path, language, now, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_rust_function_and_struct() {
        let src = "fn greet(name: &str) -> String {\n    format!(\"hi {name}\")\n}\n\nstruct Config {\n    verbose: bool,\n}\n";
        let chunks = try_chunk("a.rs", src, "rs", 0).expect("rust should parse");
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().any(|c| c.kind == crate::types::ChunkKind::Function));
        assert!(chunks.iter().any(|c| c.kind == crate::types::ChunkKind::Struct));
    }

    #[test]
    fn struct_chunk_gets_type_name_not_function_name() {
        let src = "struct Config {\n    verbose: bool,\n}\n";
        let chunks = try_chunk("a.rs", src, "rs", 0).expect("rust should parse");
        let s = &chunks[0];
        assert_eq!(s.metadata.get("type_name").map(String::as_str), Some("Config"));
        assert!(!s.metadata.contains_key("function_name"));
    }

    #[test]
    fn rust_method_receiver_is_captured() {
        let src = "impl Config {\n    fn is_verbose(&self) -> bool {\n        self.verbose\n    }\n}\n";
        let chunks = try_chunk("a.rs", src, "rs", 0).expect("rust should parse");
        let method = chunks.iter().find(|c| c.metadata.get("function_name").map(String::as_str) == Some("is_verbose"));
        assert!(method.is_some(), "expected is_verbose to be chunked");
        assert_eq!(method.unwrap().metadata.get("receiver").map(String::as_str), Some("&self"));
    }

    #[test]
    fn go_method_receiver_is_captured() {
        let src = "package main\n\ntype Server struct{}\n\nfunc (s *Server) Start() {}\n";
        let chunks = try_chunk("a.go", src, "go", 0).expect("go should parse");
        let method = chunks.iter().find(|c| c.metadata.get("function_name").map(String::as_str) == Some("Start"));
        assert!(method.is_some(), "expected Start to be chunked");
        assert_eq!(method.unwrap().metadata.get("receiver").map(String::as_str), Some("s *Server"));
    }

    #[test]
    fn unsupported_extension_returns_none() {
        assert!(try_chunk("a.txt", "some text", "txt", 0).is_none());
    }

    #[test]
    fn chunk_ids_are_stable_for_identical_content() {
        let src = "fn foo() {}\n";
        let a = try_chunk("a.rs", src, "rs", 0).unwrap();
        let b = try_chunk("a.rs", src, "rs", 42).unwrap();
        assert_eq!(a[0].id, b[0].id);
    }

    #[test]
    fn unparseable_content_degrades_gracefully() {
        // tree-sitter is error-tolerant; garbage input should not panic, even if
        // it yields zero or partial chunks.
        let result = try_chunk("a.rs", "!!! not rust {{{", "rs", 0);
        assert!(result.is_some());
    }
}
