//! Hierarchical ignore-rule compilation and matching (C1).
//!
//! Three precedence layers, lowest to highest: built-in defaults, git-style
//! `.gitignore` files, and repo-specific `.rgignore`-family files. Compiled
//! with `ignore::gitignore::GitignoreBuilder`, the same crate the reference
//! server uses to drive `ignore::WalkBuilder` in `scan.rs`. Decisions are
//! cached by path with subtree-scoped invalidation.

use crate::error::{Error, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

const REPO_SPECIFIC_FILENAME: &str = ".rgignore";
const DECISION_CACHE_CAP: usize = 10_000;

struct Layers {
    defaults: Gitignore,
    git_style: Gitignore,
    repo_specific: Gitignore,
}

pub struct IgnoreEngine {
    root: PathBuf,
    layers: RwLock<Layers>,
    cache: RwLock<HashMap<PathBuf, bool>>,
}

fn build_defaults(root: &Path, skip_dirs: &[String]) -> Gitignore {
    let mut b = GitignoreBuilder::new(root);
    for dir in skip_dirs {
        let _ = b.add_line(None, &format!("{dir}/"));
    }
    b.build().unwrap_or_else(|_| Gitignore::empty())
}

fn build_from_files(root: &Path, filename: &str) -> Gitignore {
    let mut b = GitignoreBuilder::new(root);
    let mut found_any = false;
    for entry in walkdir_ignore_files(root, filename) {
        if b.add(&entry).is_none() {
            found_any = true;
        }
    }
    let _ = found_any;
    b.build().unwrap_or_else(|_| Gitignore::empty())
}

/// Finds every ignore file of the given name under `root`. Uses a plain
/// recursive walk (not `ignore::Walk`, to avoid circularity while building
/// the very rules that walk would apply).
fn walkdir_ignore_files(root: &Path, filename: &str) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else { continue };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                if path.file_name().and_then(|n| n.to_str()) == Some(".git") {
                    continue;
                }
                stack.push(path);
            } else if path.file_name().and_then(|n| n.to_str()) == Some(filename) {
                found.push(path);
            }
        }
    }
    found
}

impl IgnoreEngine {
    pub fn new(root: &Path, skip_dirs: &[String]) -> Self {
        let layers = Layers {
            defaults: build_defaults(root, skip_dirs),
            git_style: build_from_files(root, ".gitignore"),
            repo_specific: build_from_files(root, REPO_SPECIFIC_FILENAME),
        };
        Self { root: root.to_path_buf(), layers: RwLock::new(layers), cache: RwLock::new(HashMap::new()) }
    }

    /// Re-reads the ignore files rooted at this engine's workspace and
    /// invalidates the decision cache for the affected subtree.
    pub fn notify_changed(&self, changed_file: &Path) -> Result<()> {
        let filename = changed_file
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::InvalidRequest("ignore file has no name".into()))?;

        let mut layers = self.layers.write().unwrap();
        match filename {
            ".gitignore" => layers.git_style = build_from_files(&self.root, ".gitignore"),
            REPO_SPECIFIC_FILENAME => {
                layers.repo_specific = build_from_files(&self.root, REPO_SPECIFIC_FILENAME)
            }
            _ => return Err(Error::InvalidRequest(format!("not an ignore file: {filename}"))),
        }
        drop(layers);

        let affected_dir = changed_file.parent().unwrap_or(&self.root).to_path_buf();
        let mut cache = self.cache.write().unwrap();
        cache.retain(|p, _| !p.starts_with(&affected_dir));
        Ok(())
    }

    pub fn should_ignore(&self, path: &Path) -> bool {
        if let Some(hit) = self.cache.read().unwrap().get(path) {
            return *hit;
        }
        let decision = self.compute(path);
        let mut cache = self.cache.write().unwrap();
        if cache.len() >= DECISION_CACHE_CAP {
            cache.clear();
        }
        cache.insert(path.to_path_buf(), decision);
        decision
    }

    fn compute(&self, path: &Path) -> bool {
        let layers = self.layers.read().unwrap();
        let is_dir = path.is_dir();
        let mut ignored = matches(&layers.defaults, path, is_dir);
        apply_layer(&mut ignored, &layers.git_style, path, is_dir);
        apply_layer(&mut ignored, &layers.repo_specific, path, is_dir);
        ignored
    }

    /// Effective patterns for diagnostics; best-effort, not exhaustive.
    pub fn patterns_for(&self, path: &Path) -> Vec<String> {
        let layers = self.layers.read().unwrap();
        let is_dir = path.is_dir();
        [&layers.defaults, &layers.git_style, &layers.repo_specific]
            .into_iter()
            .filter_map(|g| match g.matched(path, is_dir) {
                ignore::Match::Ignore(glob) | ignore::Match::Whitelist(glob) => {
                    Some(glob.original().to_string())
                }
                ignore::Match::None => None,
            })
            .collect()
    }
}

fn matches(g: &Gitignore, path: &Path, is_dir: bool) -> bool {
    matches!(g.matched(path, is_dir), ignore::Match::Ignore(_))
}

fn apply_layer(current: &mut bool, g: &Gitignore, path: &Path, is_dir: bool) {
    match g.matched(path, is_dir) {
        ignore::Match::Ignore(_) => *current = true,
        ignore::Match::Whitelist(_) => *current = false,
        ignore::Match::None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(dir: &Path, rel: &str, content: &str) {
        let p = dir.join(rel);
        if let Some(parent) = p.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(p, content).unwrap();
    }

    #[test]
    fn defaults_ignore_skip_dirs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "target/debug/a.rs", "");
        let engine = IgnoreEngine::new(dir.path(), &["target".into()]);
        assert!(engine.should_ignore(&dir.path().join("target/debug/a.rs")));
        assert!(!engine.should_ignore(&dir.path().join("src/a.rs")));
    }

    #[test]
    fn git_style_file_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), "generated/b.py", "");
        let engine = IgnoreEngine::new(dir.path(), &[]);
        assert!(engine.should_ignore(&dir.path().join("generated/b.py")));
    }

    #[test]
    fn repo_specific_overrides_git_style_with_negation() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".gitignore", "generated/\n");
        write(dir.path(), REPO_SPECIFIC_FILENAME, "!generated/keep.py\n");
        write(dir.path(), "generated/keep.py", "");
        let engine = IgnoreEngine::new(dir.path(), &[]);
        assert!(!engine.should_ignore(&dir.path().join("generated/keep.py")));
    }

    #[test]
    fn notify_changed_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "generated/b.py", "");
        let engine = IgnoreEngine::new(dir.path(), &[]);
        assert!(!engine.should_ignore(&dir.path().join("generated/b.py")));

        write(dir.path(), REPO_SPECIFIC_FILENAME, "generated/\n");
        engine.notify_changed(&dir.path().join(REPO_SPECIFIC_FILENAME)).unwrap();
        assert!(engine.should_ignore(&dir.path().join("generated/b.py")));
    }
}
