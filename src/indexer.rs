//! Incremental Indexer (C9): orchestrates discovery, extraction, embedding
//! and vector-store writes to keep the index in sync with the filesystem.
//!
//! The `TextEmbedder` trait is the seam that lets tests substitute a
//! deterministic fake for the real `fastembed`-backed [`crate::embedder::Embedder`],
//! the same extensibility shape as `scan.rs::DependencyScanner` in the
//! reference server (a small trait implemented by one real backend and any
//! number of test doubles).

use crate::config::Config;
use crate::discovery::{is_text_file, walk_files_parallel};
use crate::error::{Error, Result};
use crate::extraction_pool::extract_all;
use crate::fingerprint::{diff, hash_bytes};
use crate::ignore_engine::IgnoreEngine;
use crate::types::{IndexState, ProjectMetadata, Symbol};
use crate::vector_store::VectorStore;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

pub trait TextEmbedder: Send + Sync {
    fn dim(&self) -> usize;
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
    /// Whether this embedder is a real backend rather than a stand-in used
    /// when model loading failed (§7 `ModelUnavailable`); reported to agents
    /// via `get_search_capabilities` (§6) so they know semantic search works
    /// before trying it.
    fn is_available(&self) -> bool {
        true
    }
}

impl TextEmbedder for crate::embedder::Embedder {
    fn dim(&self) -> usize {
        crate::embedder::Embedder::dim(self)
    }
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        crate::embedder::Embedder::embed(self, texts)
    }
}

pub struct IndexProgress {
    pub files_total: AtomicU64,
    pub files_indexed: AtomicU64,
}

impl Default for IndexProgress {
    fn default() -> Self {
        Self { files_total: AtomicU64::new(0), files_indexed: AtomicU64::new(0) }
    }
}

pub struct Indexer {
    root: PathBuf,
    config: Config,
    ignore: Arc<IgnoreEngine>,
    store: Arc<VectorStore>,
    embedder: RwLock<Option<Arc<dyn TextEmbedder>>>,
    state: RwLock<IndexState>,
    progress: Arc<IndexProgress>,
}

impl Indexer {
    pub fn new(root: PathBuf, config: Config, ignore: Arc<IgnoreEngine>, store: Arc<VectorStore>) -> Self {
        Self {
            root,
            config,
            ignore,
            store,
            embedder: RwLock::new(None),
            state: RwLock::new(IndexState::Initializing),
            progress: Arc::new(IndexProgress::default()),
        }
    }

    pub fn set_embedder(&self, embedder: Arc<dyn TextEmbedder>) {
        *self.embedder.write().unwrap() = Some(embedder);
    }

    pub fn state(&self) -> IndexState {
        *self.state.read().unwrap()
    }

    pub fn progress(&self) -> (u64, u64) {
        (self.progress.files_indexed.load(Ordering::Relaxed), self.progress.files_total.load(Ordering::Relaxed))
    }

    /// Also returns the total byte size of every indexed file, so §3/§4.9's
    /// index-size statistic reflects what is actually on disk rather than a
    /// carried-forward counter that drifts as files are added or removed.
    fn current_fingerprints(&self) -> Result<(BTreeMap<String, String>, u64)> {
        let files = walk_files_parallel(&self.root, &self.ignore);
        let mut out = BTreeMap::new();
        let mut total_bytes = 0u64;
        for f in files {
            if !is_text_file(&f.path) {
                continue;
            }
            let Ok(bytes) = std::fs::read(&f.path) else { continue };
            total_bytes += bytes.len() as u64;
            out.insert(f.rel_path, hash_bytes(&bytes));
        }
        Ok((out, total_bytes))
    }

    /// §4.9: enumerate, diff against the store, remove what's gone, extract
    /// and embed what's new or changed.
    pub fn index_once(&self, force: bool, metadata: &mut ProjectMetadata, now: u64) -> Result<()> {
        *self.state.write().unwrap() = IndexState::Building;

        let (current, total_bytes) = self.current_fingerprints()?;
        let stored = self.store.list_fingerprints()?;

        let d = if force || stored.is_empty() {
            self.store.clear_all()?;
            crate::fingerprint::DiffResult { added: current.keys().cloned().collect(), removed: vec![], modified: vec![] }
        } else {
            diff(&current, &stored)
        };

        for path in &d.removed {
            self.store.delete_by_file(path)?;
        }

        let changed: Vec<String> = d.added.iter().chain(d.modified.iter()).cloned().collect();
        self.progress.files_total.store(changed.len() as u64, Ordering::Relaxed);
        self.progress.files_indexed.store(0, Ordering::Relaxed);

        let files = walk_files_parallel(&self.root, &self.ignore)
            .into_iter()
            .filter(|f| changed.contains(&f.rel_path))
            .collect::<Vec<_>>();

        let results = extract_all(&files, &self.config.parallel);
        let mut symbol_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut language_counts: BTreeMap<String, usize> = BTreeMap::new();

        for result in &results {
            // §4.9 per-file ordering: delete stale symbols for this file
            // before writing the fresh set, so readers never see a mix.
            self.store.delete_by_file(&result.path)?;
            if result.success {
                self.embed_and_store(&result.symbols)?;
                for s in &result.symbols {
                    *symbol_counts.entry(s.kind.label().to_string()).or_insert(0) += 1;
                    *language_counts.entry(s.language.clone()).or_insert(0) += 1;
                }
            }
            self.progress.files_indexed.fetch_add(1, Ordering::Relaxed);
        }

        metadata.last_indexed = Some(now);
        metadata.symbol_counts = symbol_counts;
        metadata.language_counts = language_counts;
        metadata.total_bytes = total_bytes;

        self.store.flush()?;
        *self.state.write().unwrap() = IndexState::Ready;
        Ok(())
    }

    fn embed_and_store(&self, symbols: &[Symbol]) -> Result<()> {
        if symbols.is_empty() {
            return Ok(());
        }
        let embedder = self.embedder.read().unwrap().clone();
        let Some(embedder) = embedder else {
            return Err(Error::ModelUnavailable("no embedder configured".into()));
        };
        let texts: Vec<String> = symbols.iter().map(|s| s.embedding_text()).collect();
        let vectors = embedder.embed(&texts)?;
        for (symbol, vector) in symbols.iter().zip(vectors) {
            self.store.upsert(symbol.clone(), vector)?;
        }
        Ok(())
    }

    /// Single-file path used by the watcher (§4.9, §4.10).
    pub fn update_file(&self, rel_path: &str) -> Result<()> {
        self.store.delete_by_file(rel_path)?;
        let abs = self.root.join(rel_path);
        if !abs.exists() {
            return Ok(()); // treated as a delete (§9)
        }
        let Ok(bytes) = std::fs::read(&abs) else { return Ok(()) };
        if !is_text_file(&abs) {
            return Ok(());
        }
        let language = abs.extension().and_then(|e| e.to_str()).and_then(crate::discovery::language_for_ext);
        let Some(language) = language else { return Ok(()) };
        let symbols = crate::symbols::extract_symbols(rel_path, language, &bytes)?;
        self.embed_and_store(&symbols)
    }

    /// Periodic full sweep (§4.9): re-derives the whole diff and reconciles.
    /// Unlike `index_once`, never clears the store wholesale.
    pub fn reconcile(&self, metadata: &mut ProjectMetadata, now: u64) -> Result<()> {
        self.index_once(false, metadata, now)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Convenience accessor for callers (tests, `ls`/`status` handlers) that
    /// only need the current fingerprint set, not a live store handle.
    pub fn store_fingerprints(&self) -> BTreeMap<String, String> {
        self.store.list_fingerprints().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::sync::Mutex;

    struct FakeEmbedder {
        dim: usize,
        calls: Mutex<usize>,
    }

    impl TextEmbedder for FakeEmbedder {
        fn dim(&self) -> usize {
            self.dim
        }
        fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            *self.calls.lock().unwrap() += 1;
            Ok(texts
                .iter()
                .map(|t| {
                    let h = blake3::hash(t.as_bytes());
                    let bytes = h.as_bytes();
                    (0..self.dim).map(|i| (bytes[i % 32] as f32) / 255.0).collect()
                })
                .collect())
        }
    }

    fn setup(dir: &Path) -> (Indexer, ProjectMetadata) {
        let ignore = Arc::new(IgnoreEngine::new(dir, &Config::default().skip_dirs));
        let store = Arc::new(VectorStore::open(&dir.join(".data"), 100, 16).unwrap());
        let indexer = Indexer::new(dir.to_path_buf(), Config::default(), ignore, store);
        indexer.set_embedder(Arc::new(FakeEmbedder { dim: 8, calls: Mutex::new(0) }));
        let meta = ProjectMetadata {
            pid: "p1".into(),
            project_name: "demo".into(),
            workspace_path: dir.to_string_lossy().to_string(),
            created_at: 0,
            last_accessed: 0,
            last_indexed: None,
            embedder_model_tag: "fast".into(),
            collection_name: "p1".into(),
            symbol_counts: BTreeMap::new(),
            language_counts: BTreeMap::new(),
            total_bytes: 0,
        };
        (indexer, meta)
    }

    #[test]
    fn empty_workspace_indexes_to_ready_with_zero_symbols() {
        let dir = tempfile::tempdir().unwrap();
        let (indexer, mut meta) = setup(dir.path());
        indexer.index_once(false, &mut meta, 1).unwrap();
        assert_eq!(indexer.state(), IndexState::Ready);
        assert_eq!(meta.symbol_counts.values().sum::<usize>(), 0);
    }

    #[test]
    fn add_then_rename_symbol_then_delete_file() {
        let dir = tempfile::tempdir().unwrap();
        let (indexer, mut meta) = setup(dir.path());
        std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();

        indexer.index_once(false, &mut meta, 1).unwrap();
        assert!(meta.symbol_counts.values().sum::<usize>() >= 1);

        std::fs::write(dir.path().join("a.py"), "def bar():\n    return 1\n").unwrap();
        indexer.update_file("a.py").unwrap();

        std::fs::remove_file(dir.path().join("a.py")).unwrap();
        indexer.reconcile(&mut meta, 2).unwrap();
        let fps = indexer.store.list_fingerprints().unwrap();
        assert!(!fps.contains_key("a.py"));
    }

    #[test]
    fn index_once_is_idempotent_with_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let (indexer, mut meta) = setup(dir.path());
        std::fs::write(dir.path().join("a.py"), "def foo():\n    return 1\n").unwrap();

        indexer.index_once(false, &mut meta, 1).unwrap();
        let first = indexer.store.list_fingerprints().unwrap();
        indexer.index_once(false, &mut meta, 2).unwrap();
        let second = indexer.store.list_fingerprints().unwrap();
        assert_eq!(first, second);
    }
}
