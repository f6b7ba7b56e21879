//! File Discovery (C2): parallel workspace walk, ignore-filtered, classified
//! by language. Grounded on `scan.rs::walk_files_parallel`'s use of
//! `ignore::WalkBuilder` with a parallel visitor collecting into a shared
//! `Mutex<Vec<_>>`.

use crate::ignore_engine::IgnoreEngine;
use ignore::{WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub rel_path: String,
    pub language: Option<&'static str>,
    pub size: u64,
}

pub fn language_for_ext(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "rs" => "rust",
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" | "pyi" => "python",
        "go" => "go",
        "c" | "h" => "c",
        "cpp" | "cc" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "java" => "java",
        _ => return None,
    })
}

/// Walks `root` using the same `.gitignore`-aware parallel crawl as the
/// reference server, additionally consulting `engine` for repo-specific and
/// default-layer rules before a file is yielded.
pub fn walk_files_parallel(root: &Path, engine: &IgnoreEngine) -> Vec<DiscoveredFile> {
    let results: Mutex<Vec<DiscoveredFile>> = Mutex::new(Vec::new());
    let threads = rayon::current_num_threads().min(12).max(1);

    let walker = WalkBuilder::new(root)
        .hidden(true)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .threads(threads)
        .build_parallel();

    walker.run(|| {
        Box::new(|entry| {
            let Ok(entry) = entry else { return WalkState::Continue };
            let path = entry.path();
            if engine.should_ignore(path) {
                return if path.is_dir() { WalkState::Skip } else { WalkState::Continue };
            }
            if !path.is_file() {
                return WalkState::Continue;
            }
            let Ok(rel) = path.strip_prefix(root) else { return WalkState::Continue };
            let rel_path = rel.to_string_lossy().replace('\\', "/");
            let language = path.extension().and_then(|e| e.to_str()).and_then(language_for_ext);
            let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            results.lock().unwrap().push(DiscoveredFile {
                path: path.to_path_buf(),
                rel_path,
                language,
                size,
            });
            WalkState::Continue
        })
    });

    results.into_inner().unwrap()
}

/// First 8KB heuristic: a null byte anywhere in the prefix marks the file
/// binary. Matches `scan.rs::is_text_file`.
pub fn is_text_file(path: &Path) -> bool {
    use std::io::Read;
    let Ok(mut f) = std::fs::File::open(path) else { return false };
    let mut buf = [0u8; 8192];
    let Ok(n) = f.read(&mut buf) else { return false };
    !buf[..n].contains(&0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_mapping() {
        assert_eq!(language_for_ext("rs"), Some("rust"));
        assert_eq!(language_for_ext("tsx"), Some("typescript"));
        assert_eq!(language_for_ext("unknownext"), None);
    }

    #[test]
    fn walk_skips_ignored_dirs_and_finds_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("target")).unwrap();
        std::fs::write(dir.path().join("target/x.rs"), "fn x(){}").unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo(): pass").unwrap();

        let engine = IgnoreEngine::new(dir.path(), &["target".into()]);
        let found = walk_files_parallel(dir.path(), &engine);
        let rel: Vec<_> = found.iter().map(|f| f.rel_path.as_str()).collect();
        assert!(rel.contains(&"a.py"));
        assert!(!rel.contains(&"target/x.rs"));
    }

    #[test]
    fn binary_detection() {
        let dir = tempfile::tempdir().unwrap();
        let text = dir.path().join("t.txt");
        std::fs::write(&text, "hello").unwrap();
        let bin = dir.path().join("b.bin");
        std::fs::write(&bin, [0u8, 1, 2, 0, 3]).unwrap();
        assert!(is_text_file(&text));
        assert!(!is_text_file(&bin));
    }
}
