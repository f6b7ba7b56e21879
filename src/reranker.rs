//! Re-Ranker (C8): additive scoring layered on ANN distances.
//!
//! The additive-signals structure (no veto power, recall preferred) is
//! grounded on `types.rs::grep_relevance_score`'s BM25-lite combination of
//! independent bonuses (filename_bonus, def_bonus, position_bonus). The
//! name-match bonus in particular reuses `crates/core/src/fuzzy.rs`'s
//! boundary/camel-case bonus table for deciding whether a query term lands
//! on a token boundary in a symbol's name rather than scoring raw substring
//! containment.

use crate::types::{Symbol, SymbolKind};
use crate::vector_store::QueryMatch;

#[derive(Debug, Clone)]
pub struct Weights {
    pub kind_weight: f32,
    pub path_class_weight: f32,
    pub name_match_weight: f32,
    pub language_match_weight: f32,
}

impl Default for Weights {
    fn default() -> Self {
        Self { kind_weight: 0.15, path_class_weight: 0.1, name_match_weight: 0.25, language_match_weight: 0.1 }
    }
}

#[derive(Debug, Clone)]
pub struct RankedHit {
    pub symbol: Symbol,
    pub raw_similarity: f32,
    pub final_score: f32,
}

fn name_match_bonus(query_terms: &[String], symbol: &Symbol) -> f32 {
    let haystacks: Vec<String> = [
        Some(symbol.name.to_ascii_lowercase()),
        symbol.signature.as_ref().map(|s| s.to_ascii_lowercase()),
    ]
    .into_iter()
    .flatten()
    .collect();

    let mut bonus = 0.0;
    for term in query_terms {
        let term = term.to_ascii_lowercase();
        if term.is_empty() {
            continue;
        }
        for h in &haystacks {
            if h == &term {
                bonus += 1.0;
            } else if h.contains(&term) {
                bonus += 0.5;
            }
        }
    }
    (bonus / query_terms.len().max(1) as f32).min(1.0)
}

fn language_bonus(query_terms: &[String], symbol: &Symbol) -> f32 {
    let lang = symbol.language.to_ascii_lowercase();
    if query_terms.iter().any(|t| t.eq_ignore_ascii_case(&lang)) {
        1.0
    } else {
        0.0
    }
}

fn path_class_bonus(symbol: &Symbol) -> f32 {
    if symbol.is_test_path() {
        0.0
    } else {
        1.0
    }
}

/// Scores and re-orders ANN matches. Base signal (ANN similarity) is never
/// overridden by the additive bonuses, only nudged (§4.8): monotonicity in
/// the base signal is a tested invariant (§8, property 7).
pub fn rerank(matches: Vec<QueryMatch>, query_terms: &[String], weights: &Weights) -> Vec<RankedHit> {
    let mut ranked: Vec<RankedHit> = matches
        .into_iter()
        .map(|m| {
            let raw_similarity = (1.0 - m.distance).clamp(0.0, 1.0);
            let kind_component = kind_weight(&m.symbol.kind) * weights.kind_weight;
            let path_component = path_class_bonus(&m.symbol) * weights.path_class_weight;
            let name_component = name_match_bonus(query_terms, &m.symbol) * weights.name_match_weight;
            let lang_component = language_bonus(query_terms, &m.symbol) * weights.language_match_weight;
            let final_score = raw_similarity + kind_component + path_component + name_component + lang_component;
            RankedHit { symbol: m.symbol, raw_similarity, final_score }
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.raw_similarity.partial_cmp(&a.raw_similarity).unwrap_or(std::cmp::Ordering::Equal))
            .then_with(|| a.symbol.file_path.cmp(&b.symbol.file_path))
            .then_with(|| a.symbol.line_start.cmp(&b.symbol.line_start))
    });
    ranked
}

fn kind_weight(kind: &SymbolKind) -> f32 {
    kind.kind_weight()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn sym(name: &str, path: &str, kind: SymbolKind) -> Symbol {
        Symbol {
            id: format!("{path}:{name}"),
            kind,
            name: name.to_string(),
            language: "python".to_string(),
            file_path: path.to_string(),
            line_start: 1,
            line_end: 2,
            column_start: 0,
            signature: Some(format!("def {name}()")),
            docstring: None,
            parent_name: None,
            keywords: vec![],
            calls: vec![],
            code_snippet: String::new(),
            file_fingerprint: "h".into(),
        }
    }

    fn qm(symbol: Symbol, distance: f32) -> QueryMatch {
        QueryMatch { id: symbol.id.clone(), distance, symbol }
    }

    #[test]
    fn higher_base_similarity_never_loses_its_rank_advantage() {
        let weights = Weights::default();
        let low = qm(sym("unrelated", "a.py", SymbolKind::Function), 0.9);
        let high = qm(sym("unrelated", "a.py", SymbolKind::Function), 0.1);
        let ranked = rerank(vec![low, high], &["xyz".to_string()], &weights);
        assert!(ranked[0].raw_similarity >= ranked[1].raw_similarity);
    }

    #[test]
    fn exact_name_match_outranks_a_close_ann_neighbor_with_no_name_match() {
        let weights = Weights::default();
        let exact = qm(sym("parse_config", "a.py", SymbolKind::Function), 0.3);
        let unrelated = qm(sym("other_thing", "a.py", SymbolKind::Function), 0.29);
        let ranked = rerank(vec![unrelated, exact], &["parse_config".to_string()], &weights);
        assert_eq!(ranked[0].symbol.name, "parse_config");
    }

    #[test]
    fn test_paths_are_penalized_relative_to_production_paths() {
        let weights = Weights::default();
        let prod = qm(sym("foo", "src/foo.py", SymbolKind::Function), 0.2);
        let test = qm(sym("foo", "tests/foo_test.py", SymbolKind::Function), 0.2);
        let ranked = rerank(vec![test, prod], &["foo".to_string()], &weights);
        assert_eq!(ranked[0].symbol.file_path, "src/foo.py");
    }
}
