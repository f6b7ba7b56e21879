//! Search Service (C11): routes queries to the semantic or regex path and
//! formats results for the RPC surface.
//!
//! The auto-routing heuristic is grounded on the same "does this look like
//! an identifier or a sentence" judgment the reference server's MCP tool
//! descriptions assume implicitly; here it is made explicit and
//! deterministic (§4.11, §9 open question) so it is independently testable.

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::indexer::TextEmbedder;
use crate::matcher::{self, MatcherConfig};
use crate::reranker::{rerank, Weights};
use crate::types::{QueryResponse, SearchHit, SearchMode};
use crate::vector_store::VectorStore;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Maps a result path from container space to host space using the first
/// matching `path_map` prefix (§4.11, §6). Unmapped paths pass through
/// unchanged — "returned as-is" is the documented behavior when unset.
fn translate_path(path: &str, path_map: &BTreeMap<String, String>) -> String {
    for (container_prefix, host_prefix) in path_map {
        if let Some(rest) = path.strip_prefix(container_prefix.as_str()) {
            return format!("{host_prefix}{rest}");
        }
    }
    path.to_string()
}

/// Deterministic natural-language heuristic (§4.11): multi-token, contains
/// punctuation/whitespace beyond identifier characters, or is phrased as a
/// question.
pub fn looks_like_natural_language(query: &str) -> bool {
    let trimmed = query.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    let token_count = trimmed.split_whitespace().count();
    if token_count >= 3 {
        return true;
    }
    let has_non_identifier_char =
        trimmed.chars().any(|c| !(c.is_alphanumeric() || c == '_' || c == '-' || c == '.' || c == ':'));
    token_count >= 2 && has_non_identifier_char
}

fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

pub struct SearchService {
    root: std::path::PathBuf,
    store: Arc<VectorStore>,
    embedder: Arc<dyn TextEmbedder>,
    weights: Weights,
    cfg: SearchConfig,
    path_map: BTreeMap<String, String>,
}

impl SearchService {
    pub fn new(
        root: std::path::PathBuf,
        store: Arc<VectorStore>,
        embedder: Arc<dyn TextEmbedder>,
        cfg: SearchConfig,
        path_map: BTreeMap<String, String>,
    ) -> Self {
        Self { root, store, embedder, weights: Weights::default(), cfg, path_map }
    }

    /// §6/§7: whether the semantic path is actually usable right now, for
    /// the `get_search_capabilities` tool schema entry.
    pub fn semantic_available(&self) -> bool {
        self.embedder.is_available()
    }

    pub fn route(&self, query: &str, requested: SearchMode) -> SearchMode {
        match requested {
            SearchMode::Auto => {
                if looks_like_natural_language(query) {
                    SearchMode::Semantic
                } else {
                    SearchMode::Regex
                }
            }
            other => other,
        }
    }

    fn validate_limit(&self, limit: Option<usize>) -> Result<usize> {
        let limit = limit.unwrap_or(20);
        if limit == 0 || limit > self.cfg.max_results {
            return Err(Error::InvalidRequest(format!("limit must be in [1, {}]", self.cfg.max_results)));
        }
        Ok(limit)
    }

    pub fn semantic_search(
        &self,
        query: &str,
        limit: Option<usize>,
        similarity_threshold: Option<f32>,
        is_building: bool,
    ) -> Result<QueryResponse> {
        let limit = self.validate_limit(limit)?;
        let vectors = self.embedder.embed(&[query.to_string()])?;
        let Some(vector) = vectors.into_iter().next() else {
            return Err(Error::ModelUnavailable("embedder returned no vector".into()));
        };

        let k = limit * self.cfg.oversample.max(1);
        let matches = self.store.query(&vector, k, 50, None)?;
        let terms = tokenize_query(query);
        let mut ranked = rerank(matches, &terms, &self.weights);

        if let Some(threshold) = similarity_threshold {
            ranked.retain(|r| r.raw_similarity >= threshold);
        }
        ranked.truncate(limit);

        let results = ranked
            .into_iter()
            .map(|r| SearchHit {
                path: translate_path(&r.symbol.file_path, &self.path_map),
                line: r.symbol.line_start,
                kind: r.symbol.kind.label().to_string(),
                name: r.symbol.name,
                score: r.final_score,
                snippet: r.symbol.code_snippet,
            })
            .collect();

        Ok(QueryResponse { results, partial: is_building })
    }

    pub async fn regex_search(&self, pattern: &str, limit: Option<usize>) -> Result<QueryResponse> {
        let limit = self.validate_limit(limit)?;
        let cfg = MatcherConfig {
            binary: "rg".to_string(),
            timeout: std::time::Duration::from_secs(self.cfg.regex_timeout_seconds),
            max_results: limit,
            pattern_max_chars: self.cfg.pattern_max_chars,
        };
        let matches = matcher::search(&self.root, pattern, &cfg).await?;
        let results = matches
            .into_iter()
            .map(|m| SearchHit {
                path: translate_path(&m.path, &self.path_map),
                line: m.line,
                kind: "text".into(),
                name: String::new(),
                score: 1.0,
                snippet: m.snippet,
            })
            .collect();
        Ok(QueryResponse { results, partial: false })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_identifier_routes_to_regex() {
        assert!(!looks_like_natural_language("parse_config"));
    }

    #[test]
    fn question_routes_to_semantic() {
        assert!(looks_like_natural_language("where do we handle retries?"));
    }

    #[test]
    fn multi_word_phrase_routes_to_semantic() {
        assert!(looks_like_natural_language("database connection pool"));
    }

    #[test]
    fn dotted_path_stays_regex() {
        assert!(!looks_like_natural_language("crate::search::route"));
    }

    #[test]
    fn tokenize_splits_on_non_identifier_chars() {
        let terms = tokenize_query("parse_config() -> Result");
        assert!(terms.contains(&"parse_config".to_string()));
        assert!(terms.contains(&"Result".to_string()));
    }

    #[test]
    fn translate_path_rewrites_matching_prefix() {
        let mut map = BTreeMap::new();
        map.insert("/workspace".to_string(), "/home/user/project".to_string());
        assert_eq!(translate_path("/workspace/src/main.rs", &map), "/home/user/project/src/main.rs");
    }

    #[test]
    fn translate_path_passes_through_when_unset() {
        let map = BTreeMap::new();
        assert_eq!(translate_path("/workspace/src/main.rs", &map), "/workspace/src/main.rs");
    }

    #[test]
    fn translate_path_passes_through_unmatched_prefix() {
        let mut map = BTreeMap::new();
        map.insert("/other".to_string(), "/elsewhere".to_string());
        assert_eq!(translate_path("/workspace/src/main.rs", &map), "/workspace/src/main.rs");
    }
}
