//! Shared integration-test harness: wires an `Indexer` directly against a
//! scratch workspace without going through the daemon's socket transport,
//! the same in-process-dispatch approach the reference server's
//! `tests/helpers/fixtures.rs::TestHarness` uses for fast, deterministic
//! tests.

use coderadar::config::Config;
use coderadar::error::Result;
use coderadar::ignore_engine::IgnoreEngine;
use coderadar::indexer::{Indexer, TextEmbedder};
use coderadar::types::ProjectMetadata;
use coderadar::vector_store::VectorStore;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

pub struct FakeEmbedder {
    pub dim: usize,
}

impl TextEmbedder for FakeEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
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

pub struct Harness {
    pub indexer: Indexer,
    pub metadata: ProjectMetadata,
    pub _temp_dir: TempDir,
    pub root: PathBuf,
}

impl Harness {
    pub fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("workspace");
        std::fs::create_dir_all(&root).unwrap();

        let config = Config::default();
        let ignore = Arc::new(IgnoreEngine::new(&root, &config.skip_dirs));
        let store = Arc::new(VectorStore::open(&temp_dir.path().join("data"), 100, 16).unwrap());
        let indexer = Indexer::new(root.clone(), config, ignore, store);
        indexer.set_embedder(Arc::new(FakeEmbedder { dim: 16 }));

        let metadata = ProjectMetadata {
            pid: "test-pid".into(),
            project_name: "test-project".into(),
            workspace_path: root.to_string_lossy().to_string(),
            created_at: 0,
            last_accessed: 0,
            last_indexed: None,
            embedder_model_tag: "fast".into(),
            collection_name: "test-pid".into(),
            symbol_counts: BTreeMap::new(),
            language_counts: BTreeMap::new(),
            total_bytes: 0,
        };

        Self { indexer, metadata, _temp_dir: temp_dir, root }
    }

    pub fn write_file(&self, rel_path: &str, content: &str) {
        let path = self.root.join(rel_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    pub fn index_once(&mut self, force: bool, now: u64) {
        let mut metadata = self.metadata.clone();
        self.indexer.index_once(force, &mut metadata, now).unwrap();
        self.metadata = metadata;
    }
}
