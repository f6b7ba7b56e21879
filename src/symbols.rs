//! Symbol Extractor (C4): tree-sitter-driven extraction of typed symbols.
//!
//! Directly adapted from the reference server's `ast.rs` node-classification
//! table and name/signature extraction heuristics, retargeted from the
//! teacher's lightweight `Symbol{name, kind, start_line, end_line, ...}`
//! shape onto this crate's richer [`crate::types::Symbol`] (which also
//! carries `docstring`, `calls`, `keywords`, `code_snippet`, and
//! `file_fingerprint` per §3).

use crate::error::{Error, Result};
use crate::fingerprint::hash_bytes;
use crate::types::{Symbol, SymbolKind};
use std::collections::HashSet;

#[cfg(feature = "treesitter")]
fn language_for(language_tag: &str) -> Option<tree_sitter::Language> {
    match language_tag {
        "rust" => Some(tree_sitter_rust::LANGUAGE.into()),
        "typescript" => Some(tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into()),
        "javascript" => Some(tree_sitter_javascript::LANGUAGE.into()),
        "python" => Some(tree_sitter_python::LANGUAGE.into()),
        "go" => Some(tree_sitter_go::LANGUAGE.into()),
        "c" => Some(tree_sitter_c::LANGUAGE.into()),
        "cpp" => Some(tree_sitter_cpp::LANGUAGE.into()),
        "java" => Some(tree_sitter_java::LANGUAGE.into()),
        _ => None,
    }
}

#[cfg(feature = "treesitter")]
fn classify_node(language_tag: &str, node_kind: &str) -> Option<SymbolKind> {
    use SymbolKind::*;
    Some(match (language_tag, node_kind) {
        ("rust", "function_item") => Function,
        ("rust", "struct_item" | "enum_item") => Class,
        ("rust", "trait_item") => Class,
        ("rust", "impl_item") => return None, // descend: methods inside are promoted
        ("rust", "type_item") => Constant,
        ("rust", "const_item" | "static_item") => Constant,
        ("rust", "mod_item") => return None,
        ("rust", "use_declaration") => Import,

        ("typescript" | "javascript", "function_declaration") => Function,
        ("typescript" | "javascript", "method_definition") => Method,
        ("typescript" | "javascript", "class_declaration") => Class,
        ("typescript", "interface_declaration") => Class,
        ("typescript", "type_alias_declaration") => Constant,
        ("typescript" | "javascript", "export_statement") => return None,
        ("typescript" | "javascript", "lexical_declaration" | "variable_declaration") => Constant,
        ("typescript" | "javascript", "import_statement") => Import,

        ("python", "function_definition") => Function,
        ("python", "class_definition") => Class,
        ("python", "import_statement" | "import_from_statement") => Import,

        ("go", "function_declaration") => Function,
        ("go", "method_declaration") => Method,
        ("go", "type_declaration") => return None,
        ("go", "type_spec") => Class,
        ("go", "const_declaration" | "var_declaration") => Constant,
        ("go", "import_declaration") => Import,

        ("c" | "cpp", "function_definition") => Function,
        ("c" | "cpp", "struct_specifier") => Class,
        ("cpp", "class_specifier") => Class,
        ("c" | "cpp", "enum_specifier") => Class,
        ("c" | "cpp", "preproc_include") => Import,

        ("java", "method_declaration") => Method,
        ("java", "class_declaration" | "interface_declaration" | "enum_declaration") => Class,
        ("java", "import_declaration") => Import,

        _ => return None,
    })
}

/// True for the language's line/block comment node kinds, used both to find
/// a symbol's leading doc block and a file's leading module comment.
#[cfg(feature = "treesitter")]
fn is_comment_kind(language: &str, kind: &str) -> bool {
    match language {
        "rust" | "java" => matches!(kind, "line_comment" | "block_comment"),
        _ => kind == "comment",
    }
}

/// Strips the language's comment punctuation (`///`, `//!`, `//`, `/** */`)
/// from one comment line, leaving the prose.
fn strip_comment_markers(text: &str) -> String {
    let t = text.trim();
    let t = t.strip_prefix("///").or_else(|| t.strip_prefix("//!")).or_else(|| t.strip_prefix("//")).unwrap_or(t);
    let t = t.strip_prefix("/**").or_else(|| t.strip_prefix("/*")).unwrap_or(t);
    let t = t.strip_suffix("*/").unwrap_or(t);
    t.trim().trim_start_matches('*').trim().to_string()
}

fn strip_string_quotes(text: &str) -> String {
    let t = text.trim();
    for q in ["\"\"\"", "'''", "\"", "'"] {
        if let Some(inner) = t.strip_prefix(q).and_then(|r| r.strip_suffix(q)) {
            return inner.trim().to_string();
        }
    }
    t.to_string()
}

/// The leading contiguous run of comment nodes at the top of a file, or (for
/// Python) a bare string expression as the module's first statement —
/// whichever one the language actually uses for a module docstring (§4.4).
#[cfg(feature = "treesitter")]
fn module_docstring(root: tree_sitter::Node, src: &[u8], language: &str) -> Option<String> {
    let mut cursor = root.walk();
    let mut lines = Vec::new();
    for child in root.children(&mut cursor) {
        if is_comment_kind(language, child.kind()) {
            if let Ok(text) = child.utf8_text(src) {
                lines.push(strip_comment_markers(text));
            }
        } else if child.kind() == "expression_statement" {
            if let Some(inner) = child.named_child(0) {
                if inner.kind() == "string" {
                    return inner.utf8_text(src).ok().map(strip_string_quotes);
                }
            }
            break;
        } else {
            break;
        }
    }
    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// First documentation block attached to a symbol's node (§4.4): the
/// contiguous comment siblings immediately preceding it, or — for Python,
/// whose docstrings live inside the body — the first bare string statement.
#[cfg(feature = "treesitter")]
fn symbol_docstring(node: tree_sitter::Node, src: &[u8], language: &str) -> Option<String> {
    if language == "python" {
        let body = node.child_by_field_name("body")?;
        let first = body.named_child(0)?;
        if first.kind() == "expression_statement" {
            let inner = first.named_child(0)?;
            if inner.kind() == "string" {
                return inner.utf8_text(src).ok().map(strip_string_quotes);
            }
        }
        return None;
    }

    let mut lines = Vec::new();
    let mut sibling = node.prev_sibling();
    while let Some(s) = sibling {
        if !is_comment_kind(language, s.kind()) {
            break;
        }
        if let Ok(text) = s.utf8_text(src) {
            lines.push(strip_comment_markers(text));
        }
        sibling = s.prev_sibling();
    }
    if lines.is_empty() {
        None
    } else {
        lines.reverse();
        Some(lines.join("\n"))
    }
}

/// `Import` nodes have no `name`/`type` field to hand to [`extract_name`];
/// the statement's own first line, semicolon trimmed, is the symbol name.
#[cfg(feature = "treesitter")]
fn import_name(node: tree_sitter::Node, src: &[u8]) -> Option<String> {
    let text = node.utf8_text(src).ok()?;
    let first_line = text.lines().next()?.trim().trim_end_matches(';');
    if first_line.is_empty() {
        None
    } else {
        Some(first_line.to_string())
    }
}

#[cfg(feature = "treesitter")]
fn extract_name(node: tree_sitter::Node, src: &[u8]) -> Option<String> {
    if let Some(n) = node.child_by_field_name("name") {
        return n.utf8_text(src).ok().map(|s| s.to_string());
    }
    if let Some(n) = node.child_by_field_name("type") {
        return n.utf8_text(src).ok().map(|s| s.to_string());
    }
    // Go type_spec: first named child is the identifier.
    if node.kind() == "type_spec" {
        if let Some(n) = node.named_child(0) {
            return n.utf8_text(src).ok().map(|s| s.to_string());
        }
    }
    // C/C++ function_definition: walk the declarator chain to find the
    // identifier immediately before the parameter list.
    if node.kind() == "function_definition" {
        if let Some(declarator) = node.child_by_field_name("declarator") {
            let mut cursor = declarator.walk();
            let mut best = None;
            for child in declarator.children(&mut cursor) {
                if child.kind() == "identifier" {
                    best = child.utf8_text(src).ok().map(|s| s.to_string());
                }
            }
            if best.is_some() {
                return best;
            }
        }
    }
    None
}

const MAX_SIGNATURE_CHARS: usize = 200;

#[cfg(feature = "treesitter")]
fn extract_signature(node: tree_sitter::Node, src: &[u8], language_tag: &str) -> Option<String> {
    let text = node.utf8_text(src).ok()?;
    let first_line = text.lines().next()?;
    let truncated = if language_tag == "python" {
        first_line.split(':').next().unwrap_or(first_line)
    } else {
        first_line.split('{').next().unwrap_or(first_line)
    };
    let truncated = truncated.trim();
    if truncated.len() > MAX_SIGNATURE_CHARS {
        let boundary = floor_char_boundary(truncated, MAX_SIGNATURE_CHARS);
        Some(format!("{}…", &truncated[..boundary]))
    } else if truncated.is_empty() {
        None
    } else {
        Some(truncated.to_string())
    }
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn code_snippet(text: &str, lines: usize) -> String {
    text.lines().take(lines).collect::<Vec<_>>().join("\n")
}

fn extract_calls(text: &str) -> Vec<String> {
    let re = regex::Regex::new(r"\b([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap();
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    for cap in re.captures_iter(text) {
        let name = cap[1].to_string();
        if seen.insert(name.clone()) {
            calls.push(name);
        }
        if calls.len() >= 20 {
            break;
        }
    }
    calls
}

fn extract_keywords(name: &str, signature: Option<&str>) -> Vec<String> {
    let mut words: Vec<String> = split_camel_snake(name);
    if let Some(sig) = signature {
        for word in sig.split(|c: char| !c.is_alphanumeric() && c != '_') {
            if word.len() > 2 {
                words.push(word.to_ascii_lowercase());
            }
        }
    }
    words.sort();
    words.dedup();
    words
}

fn split_camel_snake(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in s.chars() {
        if c == '_' || c == '-' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current).to_ascii_lowercase());
            }
        } else if c.is_uppercase() && !current.is_empty() {
            words.push(std::mem::take(&mut current).to_ascii_lowercase());
            current.push(c);
        } else {
            current.push(c);
        }
    }
    if !current.is_empty() {
        words.push(current.to_ascii_lowercase());
    }
    words
}

/// Extracts symbols from one file's contents. Unsupported languages or
/// parser failures return `Ok(vec![])` (§4.4: non-fatal, regex search still
/// works).
#[cfg(feature = "treesitter")]
pub fn extract_symbols(file_path: &str, language: &str, bytes: &[u8]) -> Result<Vec<Symbol>> {
    let Some(lang) = language_for(language) else { return Ok(Vec::new()) };
    let mut parser = tree_sitter::Parser::new();
    parser.set_language(&lang).map_err(|e| Error::Parse { path: file_path.into(), detail: e.to_string() })?;
    let Some(tree) = parser.parse(bytes, None) else {
        return Err(Error::Parse { path: file_path.into(), detail: "parser returned no tree".into() });
    };

    let fingerprint = hash_bytes(bytes);
    let mut out = Vec::new();

    if let Some(doc) = module_docstring(tree.root_node(), bytes, language) {
        out.push(Symbol {
            id: Symbol::make_id(file_path, 1, "module"),
            kind: SymbolKind::ModuleDoc,
            name: "module".to_string(),
            language: language.to_string(),
            file_path: file_path.to_string(),
            line_start: 1,
            line_end: 1,
            column_start: 0,
            signature: None,
            docstring: Some(doc.clone()),
            parent_name: None,
            keywords: Vec::new(),
            calls: Vec::new(),
            code_snippet: code_snippet(&doc, 5),
            file_fingerprint: fingerprint.clone(),
        });
    }

    let mut cursor = tree.walk();
    walk_node(tree.root_node(), bytes, language, file_path, &fingerprint, None, &mut out, &mut cursor);
    Ok(out)
}

#[cfg(feature = "treesitter")]
fn walk_node(
    node: tree_sitter::Node,
    src: &[u8],
    language: &str,
    file_path: &str,
    fingerprint: &str,
    parent_name: Option<&str>,
    out: &mut Vec<Symbol>,
    cursor: &mut tree_sitter::TreeCursor,
) {
    let kind = classify_node(language, node.kind());
    let mut next_parent = parent_name.map(|s| s.to_string());

    if let Some(mut symbol_kind) = kind {
        if parent_name.is_some() && symbol_kind == SymbolKind::Function && language != "go" {
            symbol_kind = SymbolKind::Method;
        }
        let name = if symbol_kind == SymbolKind::Import { import_name(node, src) } else { extract_name(node, src) };
        if let Some(name) = name {
            let text = node.utf8_text(src).unwrap_or("");
            let signature = if symbol_kind == SymbolKind::Import { None } else { extract_signature(node, src, language) };
            let docstring = if symbol_kind == SymbolKind::Import { None } else { symbol_docstring(node, src, language) };
            let keywords = extract_keywords(&name, signature.as_deref());
            let symbol = Symbol {
                id: Symbol::make_id(file_path, node.start_position().row as u32 + 1, &name),
                kind: symbol_kind,
                name: name.clone(),
                language: language.to_string(),
                file_path: file_path.to_string(),
                line_start: node.start_position().row as u32 + 1,
                line_end: node.end_position().row as u32 + 1,
                column_start: node.start_position().column as u32,
                signature,
                docstring,
                parent_name: parent_name.map(|s| s.to_string()),
                keywords,
                calls: extract_calls(text),
                code_snippet: code_snippet(text, 5),
                file_fingerprint: fingerprint.to_string(),
            };
            out.push(symbol);
            if matches!(symbol_kind, SymbolKind::Class) {
                next_parent = Some(name);
            }
        }
    }

    let mut child_cursor = node.walk();
    for child in node.children(&mut child_cursor) {
        walk_node(child, src, language, file_path, fingerprint, next_parent.as_deref(), out, cursor);
    }
}

#[cfg(not(feature = "treesitter"))]
pub fn extract_symbols(_file_path: &str, _language: &str, _bytes: &[u8]) -> Result<Vec<Symbol>> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rust_file() {
        let src = b"fn foo(x: i32) -> i32 {\n    x + 1\n}\n";
        let symbols = extract_symbols("a.rs", "rust", src).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "foo");
        assert_eq!(symbols[0].kind, SymbolKind::Function);
    }

    #[test]
    fn test_nested_symbols_promote_to_method() {
        let src = b"struct Foo;\nimpl Foo {\n    fn bar(&self) {}\n}\n";
        let symbols = extract_symbols("a.rs", "rust", src).unwrap();
        let bar = symbols.iter().find(|s| s.name == "bar").unwrap();
        assert_eq!(bar.kind, SymbolKind::Method);
    }

    #[test]
    fn test_unknown_ext_returns_none() {
        let symbols = extract_symbols("a.xyz", "unknown_lang", b"garbage").unwrap();
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_python_function() {
        let src = b"def greet(name):\n    return f'hi {name}'\n";
        let symbols = extract_symbols("a.py", "python", src).unwrap();
        assert_eq!(symbols.len(), 1);
        assert_eq!(symbols[0].name, "greet");
    }

    #[test]
    fn embedding_text_is_deterministic() {
        let src = b"fn foo(x: i32) -> i32 {\n    x + 1\n}\n";
        let a = extract_symbols("a.rs", "rust", src).unwrap();
        let b = extract_symbols("a.rs", "rust", src).unwrap();
        assert_eq!(a[0].embedding_text(), b[0].embedding_text());
    }

    #[test]
    fn rust_doc_comment_is_attached_to_the_function() {
        let src = b"/// adds one to x\nfn foo(x: i32) -> i32 {\n    x + 1\n}\n";
        let symbols = extract_symbols("a.rs", "rust", src).unwrap();
        let foo = symbols.iter().find(|s| s.name == "foo").unwrap();
        assert_eq!(foo.docstring.as_deref(), Some("adds one to x"));
    }

    #[test]
    fn rust_module_doc_comment_becomes_a_module_doc_symbol() {
        let src = b"//! top-level overview\nfn foo() {}\n";
        let symbols = extract_symbols("a.rs", "rust", src).unwrap();
        let module_doc = symbols.iter().find(|s| s.kind == SymbolKind::ModuleDoc).unwrap();
        assert_eq!(module_doc.docstring.as_deref(), Some("top-level overview"));
    }

    #[test]
    fn rust_use_declaration_is_classified_as_import() {
        let src = b"use std::collections::HashMap;\nfn foo() {}\n";
        let symbols = extract_symbols("a.rs", "rust", src).unwrap();
        let import = symbols.iter().find(|s| s.kind == SymbolKind::Import).unwrap();
        assert_eq!(import.name, "use std::collections::HashMap");
    }

    #[test]
    fn python_docstring_is_attached_to_the_function() {
        let src = b"def greet(name):\n    \"\"\"says hi\"\"\"\n    return name\n";
        let symbols = extract_symbols("a.py", "python", src).unwrap();
        let greet = symbols.iter().find(|s| s.name == "greet").unwrap();
        assert_eq!(greet.docstring.as_deref(), Some("says hi"));
    }

    #[test]
    fn python_import_is_classified() {
        let src = b"import os\ndef greet():\n    pass\n";
        let symbols = extract_symbols("a.py", "python", src).unwrap();
        assert!(symbols.iter().any(|s| s.kind == SymbolKind::Import && s.name.contains("import os")));
    }
}
