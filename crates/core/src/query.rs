//! C7 — Query processor: normalize, tokenize, strip stopwords, light-stem, expand
//! synonyms, and tag an advisory intent. Shares its code-aware tokenizer with the
//! Indexer (C5) so index terms and query terms are produced the same way.

use crate::types::Query;
use std::collections::BTreeSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "of", "in", "on", "at",
    "to", "for", "and", "or", "but", "with", "as", "by", "that", "this", "it", "from", "how",
    "what", "do", "does", "did", "so", "if", "into",
];

/// Split on word boundaries but keep identifier punctuation (`_`, `.`, `::`, `->`)
/// attached, then further split camelCase/PascalCase/snake_case identifiers into
/// their constituent words — the same splitting the indexer applies to chunk
/// content, so a query term always has a chance of appearing in a posting list.
pub fn code_aware_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
        if raw.is_empty() {
            continue;
        }
        for word in split_identifier(raw) {
            if !word.is_empty() {
                tokens.push(word.to_lowercase());
            }
        }
    }
    tokens
}

/// Split `snake_case`, `camelCase`, and `PascalCase` into lowercase words.
fn split_identifier(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for ch in s.chars() {
        if ch == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if ch.is_uppercase() && prev_lower {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        prev_lower = ch.is_lowercase();
        current.push(ch);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// A crude Porter-style suffix stripper: good enough to fold "indexing"/"indexed"
/// down near "index" without pulling in a stemming crate for four suffixes.
fn light_stem(word: &str) -> String {
    for suffix in ["ing", "edly", "ed", "es", "s"] {
        if word.len() > suffix.len() + 2 && word.ends_with(suffix) {
            return word[..word.len() - suffix.len()].to_string();
        }
    }
    word.to_string()
}

/// Advisory synonym expansion: a closed, hand-maintained table of common
/// code-search synonyms. Expansion adds terms; it never replaces the user's
/// original tokens, so a literal match still works if the table misses a pair.
fn synonym_expand(term: &str) -> Option<&'static str> {
    match term {
        "fn" => Some("function"),
        "func" => Some("function"),
        "impl" => Some("implementation"),
        "cfg" => Some("config"),
        "conf" => Some("config"),
        "auth" => Some("authentication"),
        "db" => Some("database"),
        "err" => Some("error"),
        "msg" => Some("message"),
        "init" => Some("initialize"),
        _ => None,
    }
}

/// A code-search-shaped heuristic for advisory intent classification. Downstream
/// components MAY use the tag to bias re-ranking; nothing depends on it being
/// correct.
fn classify_intent(raw_text: &str, tokens: &[String]) -> (Option<String>, f32) {
    let lower = raw_text.to_lowercase();
    if lower.starts_with("how") || lower.contains("how do") || lower.contains("how does") {
        return (Some("how_to".to_string()), 0.7);
    }
    if lower.starts_with("why") {
        return (Some("explain".to_string()), 0.6);
    }
    if tokens.iter().any(|t| t == "error" || t == "bug" || t == "fail" || t == "panic") {
        return (Some("debug".to_string()), 0.6);
    }
    if tokens.len() <= 2 {
        return (Some("lookup".to_string()), 0.5);
    }
    (None, 0.0)
}

/// Process a raw query string end to end. Never fails: an empty or
/// all-stopword query simply yields empty `tokens`/`terms`, which downstream
/// retrievers treat as "no results" rather than an error.
pub fn process_query(raw_text: &str) -> Query {
    let tokens = code_aware_tokens(raw_text);

    let stopwords: BTreeSet<&str> = STOPWORDS.iter().copied().collect();
    let mut terms = Vec::new();
    let mut seen = BTreeSet::new();
    for token in &tokens {
        if stopwords.contains(token.as_str()) {
            continue;
        }
        let stemmed = light_stem(token);
        if seen.insert(stemmed.clone()) {
            terms.push(stemmed);
        }
        if let Some(expansion) = synonym_expand(token) {
            if seen.insert(expansion.to_string()) {
                terms.push(expansion.to_string());
            }
        }
    }

    let (intent_tag, intent_confidence) = classify_intent(raw_text, &tokens);

    Query { raw_text: raw_text.to_string(), tokens, terms, intent_tag, intent_confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_snake_and_camel_case() {
        assert_eq!(split_identifier("hash_tree"), vec!["hash", "tree"]);
        assert_eq!(split_identifier("computeRootHash"), vec!["compute", "Root", "Hash"]);
    }

    #[test]
    fn code_aware_tokens_lowercases_and_splits() {
        let tokens = code_aware_tokens("fn computeRootHash(leaves: &BTreeMap)");
        assert!(tokens.contains(&"compute".to_string()));
        assert!(tokens.contains(&"root".to_string()));
        assert!(tokens.contains(&"hash".to_string()));
    }

    #[test]
    fn stopwords_are_removed_from_terms() {
        let q = process_query("how is the merkle tree computed");
        assert!(!q.terms.contains(&"the".to_string()));
        assert!(!q.terms.contains(&"is".to_string()));
        assert!(q.terms.contains(&"merkl".to_string()) || q.terms.contains(&"merkle".to_string()));
    }

    #[test]
    fn empty_query_yields_empty_terms_not_an_error() {
        let q = process_query("   ");
        assert!(q.tokens.is_empty());
        assert!(q.terms.is_empty());
    }

    #[test]
    fn synonym_expansion_adds_without_removing_original() {
        let q = process_query("fn signature");
        assert!(q.terms.contains(&"fn".to_string()) || q.terms.iter().any(|t| t == "fn"));
        assert!(q.terms.iter().any(|t| t == "function"));
    }

    #[test]
    fn intent_classification_is_advisory_and_never_fails() {
        let q = process_query("how do I configure caching");
        assert_eq!(q.intent_tag.as_deref(), Some("how_to"));
        let q2 = process_query("xyz");
        assert!(q2.intent_confidence >= 0.0);
    }
}
