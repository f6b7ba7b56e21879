//! Shared data model: [`Symbol`], project metadata, and query results.
//!
//! Mirrors the structuring of the reference server's `types.rs` (precomputed
//! fields carried alongside raw data, `#[serde(skip)]` on anything derived),
//! adapted to the symbol-first schema this crate indexes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Method,
    Class,
    ModuleDoc,
    Import,
    Constant,
    Config,
}

impl SymbolKind {
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Method => "method",
            SymbolKind::Class => "class",
            SymbolKind::ModuleDoc => "module_doc",
            SymbolKind::Import => "import",
            SymbolKind::Constant => "constant",
            SymbolKind::Config => "config",
        }
    }

    /// Re-ranker preference weight: callables and classes first, see §4.8.
    pub fn kind_weight(&self) -> f32 {
        match self {
            SymbolKind::Function | SymbolKind::Method | SymbolKind::Class => 1.0,
            SymbolKind::ModuleDoc => 0.6,
            SymbolKind::Config => 0.5,
            SymbolKind::Constant => 0.4,
            SymbolKind::Import => 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    pub kind: SymbolKind,
    pub name: String,
    pub language: String,
    pub file_path: String,
    pub line_start: u32,
    pub line_end: u32,
    pub column_start: u32,
    pub signature: Option<String>,
    pub docstring: Option<String>,
    pub parent_name: Option<String>,
    pub keywords: Vec<String>,
    pub calls: Vec<String>,
    pub code_snippet: String,
    pub file_fingerprint: String,
}

impl Symbol {
    /// `(file_path, line_start, name)` uniquely identifies a symbol (§3,
    /// invariant a); this is the string used as the vector-store key.
    pub fn make_id(file_path: &str, line_start: u32, name: &str) -> String {
        format!("{file_path}:{line_start}:{name}")
    }

    /// Deterministic embedding context: kind, name, language, path,
    /// signature, docstring, parent, keywords, calls, snippet, in that
    /// fixed order (§4.6).
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            self.kind.label().to_string(),
            self.name.clone(),
            self.language.clone(),
            self.file_path.clone(),
        ];
        if let Some(sig) = &self.signature {
            parts.push(sig.clone());
        }
        if let Some(doc) = &self.docstring {
            parts.push(doc.clone());
        }
        if let Some(parent) = &self.parent_name {
            parts.push(parent.clone());
        }
        if !self.keywords.is_empty() {
            parts.push(self.keywords.join(" "));
        }
        if !self.calls.is_empty() {
            parts.push(self.calls.join(" "));
        }
        parts.push(self.code_snippet.clone());
        parts.join("\n")
    }

    pub fn is_test_path(&self) -> bool {
        let p = self.file_path.to_ascii_lowercase();
        p.contains("/test") || p.starts_with("test") || p.contains("_test.") || p.contains(".test.")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMetadata {
    pub pid: String,
    pub project_name: String,
    pub workspace_path: String,
    pub created_at: u64,
    pub last_accessed: u64,
    pub last_indexed: Option<u64>,
    pub embedder_model_tag: String,
    pub collection_name: String,
    pub symbol_counts: BTreeMap<String, usize>,
    pub language_counts: BTreeMap<String, usize>,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexState {
    Initializing,
    Building,
    Ready,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub line: u32,
    pub kind: String,
    pub name: String,
    pub score: f32,
    pub snippet: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub results: Vec<SearchHit>,
    pub partial: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Auto,
    Semantic,
    Regex,
}

impl SearchMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(SearchMode::Auto),
            "semantic" => Some(SearchMode::Semantic),
            "regex" => Some(SearchMode::Regex),
            _ => None,
        }
    }
}
