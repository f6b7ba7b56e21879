//! Vector Store (C7): persisted symbol records with an HNSW approximate
//! nearest-neighbour index over embeddings.
//!
//! Persistence is `sled` (sourced from the pack's `rmcp_memex` example,
//! which uses it the same way: an embedded KV store as the system of
//! record). Records are bincode-encoded (sourced from the pack's `charter`
//! example, which pairs `bincode` with `blake3` the same way this crate
//! does). The ANN index is `hnsw_rs` (sourced from `anortham-julie`'s
//! manifest; no ANN crate appears in any teacher Cargo.toml). The store is
//! the sole system of record for "what is indexed" (§4.7): fingerprints are
//! derived from it directly, never from a side file, so there is only one
//! place incremental diffs (§4.3) can drift from reality.

use crate::error::{Error, Result};
use crate::types::Symbol;
use hnsw_rs::anndists::dist::distances::DistCosine;
use hnsw_rs::hnsw::Hnsw;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct VectorRecord {
    symbol: Symbol,
    vector: Vec<f32>,
}

pub struct MetadataFilter {
    pub language: Option<String>,
    pub kinds: Option<Vec<String>>,
}

pub struct QueryMatch {
    pub id: String,
    pub distance: f32,
    pub symbol: Symbol,
}

/// In-memory ANN index plus the id<->integer mapping `hnsw_rs` requires.
///
/// `hnsw_rs` borrows the vectors it indexes rather than copying them, so
/// `arena` owns every vector ever inserted in a `Box<[f32]>` (stable
/// address, never reallocated) and `hnsw` is handed a `'static`-asserted
/// slice into it. The assertion is sound because entries are only ever
/// appended to `arena`, never removed or moved; `AnnIndex` itself owns the
/// arena for at least as long as `hnsw` does, so the borrow never outlives
/// its data in practice even though the type system can't see that through
/// the self-reference.
struct AnnIndex {
    hnsw: Hnsw<'static, f32, DistCosine>,
    arena: Vec<Box<[f32]>>,
    id_to_handle: HashMap<String, usize>,
    handle_to_id: HashMap<usize, String>,
    next_handle: AtomicUsize,
}

impl AnnIndex {
    fn new(construction_ef: usize, m: usize) -> Self {
        let hnsw = Hnsw::new(m, 100_000, 16, construction_ef, DistCosine {});
        Self {
            hnsw,
            arena: Vec::new(),
            id_to_handle: HashMap::new(),
            handle_to_id: HashMap::new(),
            next_handle: AtomicUsize::new(0),
        }
    }

    fn insert(&mut self, id: &str, vector: &[f32]) {
        if let Some(&old) = self.id_to_handle.get(id) {
            self.handle_to_id.remove(&old);
        }
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        self.arena.push(vector.to_vec().into_boxed_slice());
        let stored: &'static [f32] = unsafe { std::mem::transmute(&*self.arena[self.arena.len() - 1]) };
        self.hnsw.insert((stored, handle));
        self.id_to_handle.insert(id.to_string(), handle);
        self.handle_to_id.insert(handle, id.to_string());
    }

    fn remove(&mut self, id: &str) {
        // hnsw_rs has no hard-delete; tombstone by dropping the mapping so
        // search results for the stale handle are filtered out downstream.
        if let Some(handle) = self.id_to_handle.remove(id) {
            self.handle_to_id.remove(&handle);
        }
    }

    fn search(&self, query: &[f32], k: usize, search_ef: usize) -> Vec<(String, f32)> {
        self.hnsw
            .search(query, k, search_ef)
            .into_iter()
            .filter_map(|n| self.handle_to_id.get(&n.d_id).map(|id| (id.clone(), n.distance)))
            .collect()
    }
}

pub struct VectorStore {
    db: sled::Db,
    records: sled::Tree,
    fingerprints: sled::Tree,
    file_ids: sled::Tree,
    ann: RwLock<AnnIndex>,
}

impl VectorStore {
    pub fn open(data_dir: &Path, construction_ef: usize, m: usize) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db = sled::open(data_dir.join("vectors.sled"))?;
        let records = db.open_tree("records")?;
        let fingerprints = db.open_tree("fingerprints")?;
        let file_ids = db.open_tree("file_ids")?;

        let mut ann = AnnIndex::new(construction_ef, m);
        for item in records.iter() {
            let (key, value) = item?;
            let id = String::from_utf8_lossy(&key).to_string();
            if let Ok(rec) = bincode::deserialize::<VectorRecord>(&value) {
                ann.insert(&id, &rec.vector);
            }
        }

        Ok(Self { db, records, fingerprints, file_ids, ann: RwLock::new(ann) })
    }

    pub fn upsert(&self, symbol: Symbol, vector: Vec<f32>) -> Result<()> {
        let rec = VectorRecord { symbol: symbol.clone(), vector };
        let bytes = bincode::serialize(&rec).map_err(|e| Error::VectorStore(e.to_string()))?;
        self.records.insert(symbol.id.as_bytes(), bytes)?;
        self.fingerprints.insert(symbol.file_path.as_bytes(), symbol.file_fingerprint.as_bytes())?;

        let mut ids: Vec<String> = self
            .file_ids
            .get(symbol.file_path.as_bytes())?
            .and_then(|v| bincode::deserialize(&v).ok())
            .unwrap_or_default();
        if !ids.contains(&symbol.id) {
            ids.push(symbol.id.clone());
        }
        let ids_bytes = bincode::serialize(&ids).map_err(|e| Error::VectorStore(e.to_string()))?;
        self.file_ids.insert(symbol.file_path.as_bytes(), ids_bytes)?;

        self.ann.write().unwrap().insert(&rec.symbol.id, &rec.vector);
        Ok(())
    }

    /// §4.9 ordering: callers delete-then-upsert per file so a concurrent
    /// reader never observes a mix of stale and fresh records for one file.
    pub fn delete_by_file(&self, file_path: &str) -> Result<()> {
        let ids: Vec<String> = self
            .file_ids
            .get(file_path.as_bytes())?
            .and_then(|v| bincode::deserialize(&v).ok())
            .unwrap_or_default();
        self.delete_ids(&ids)?;
        self.file_ids.remove(file_path.as_bytes())?;
        self.fingerprints.remove(file_path.as_bytes())?;
        Ok(())
    }

    pub fn delete_ids(&self, ids: &[String]) -> Result<()> {
        let mut ann = self.ann.write().unwrap();
        for id in ids {
            self.records.remove(id.as_bytes())?;
            ann.remove(id);
        }
        Ok(())
    }

    pub fn query(&self, vector: &[f32], k: usize, search_ef: usize, filter: Option<&MetadataFilter>) -> Result<Vec<QueryMatch>> {
        let ann = self.ann.read().unwrap();
        let candidates = ann.search(vector, k.saturating_mul(4).max(k), search_ef);
        let mut out = Vec::with_capacity(k);
        for (id, distance) in candidates {
            let Some(bytes) = self.records.get(id.as_bytes())? else { continue };
            let Ok(rec) = bincode::deserialize::<VectorRecord>(&bytes) else { continue };
            if let Some(f) = filter {
                if let Some(lang) = &f.language {
                    if &rec.symbol.language != lang {
                        continue;
                    }
                }
                if let Some(kinds) = &f.kinds {
                    if !kinds.contains(&rec.symbol.kind.label().to_string()) {
                        continue;
                    }
                }
            }
            out.push(QueryMatch { id, distance, symbol: rec.symbol });
            if out.len() >= k {
                break;
            }
        }
        Ok(out)
    }

    /// Source of truth for §4.3's diff; never a sidecar file.
    pub fn list_fingerprints(&self) -> Result<BTreeMap<String, String>> {
        let mut out = BTreeMap::new();
        for item in self.fingerprints.iter() {
            let (k, v) = item?;
            out.insert(String::from_utf8_lossy(&k).to_string(), String::from_utf8_lossy(&v).to_string());
        }
        Ok(out)
    }

    pub fn symbol_count(&self) -> usize {
        self.records.len()
    }

    pub fn clear_all(&self) -> Result<()> {
        self.records.clear()?;
        self.fingerprints.clear()?;
        self.file_ids.clear()?;
        *self.ann.write().unwrap() = AnnIndex::new(100, 16);
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SymbolKind;

    fn symbol(id: &str, file: &str, fingerprint: &str) -> Symbol {
        Symbol {
            id: id.to_string(),
            kind: SymbolKind::Function,
            name: id.to_string(),
            language: "python".to_string(),
            file_path: file.to_string(),
            line_start: 1,
            line_end: 2,
            column_start: 0,
            signature: None,
            docstring: None,
            parent_name: None,
            keywords: vec![],
            calls: vec![],
            code_snippet: "pass".into(),
            file_fingerprint: fingerprint.to_string(),
        }
    }

    #[test]
    fn upsert_then_query_finds_exact_match() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), 100, 16).unwrap();
        store.upsert(symbol("a.py:1:foo", "a.py", "h1"), vec![1.0, 0.0, 0.0]).unwrap();
        store.upsert(symbol("b.py:1:bar", "b.py", "h2"), vec![0.0, 1.0, 0.0]).unwrap();

        let results = store.query(&[1.0, 0.0, 0.0], 1, 50, None).unwrap();
        assert_eq!(results[0].symbol.name, "foo");
    }

    #[test]
    fn delete_by_file_removes_fingerprint_and_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), 100, 16).unwrap();
        store.upsert(symbol("a.py:1:foo", "a.py", "h1"), vec![1.0, 0.0]).unwrap();
        assert_eq!(store.symbol_count(), 1);

        store.delete_by_file("a.py").unwrap();
        assert_eq!(store.symbol_count(), 0);
        assert!(!store.list_fingerprints().unwrap().contains_key("a.py"));
    }

    #[test]
    fn list_fingerprints_reflects_current_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), 100, 16).unwrap();
        store.upsert(symbol("a.py:1:foo", "a.py", "h1"), vec![1.0, 0.0]).unwrap();
        let fps = store.list_fingerprints().unwrap();
        assert_eq!(fps.get("a.py"), Some(&"h1".to_string()));
    }

    #[test]
    fn clear_all_empties_everything() {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::open(dir.path(), 100, 16).unwrap();
        store.upsert(symbol("a.py:1:foo", "a.py", "h1"), vec![1.0, 0.0]).unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.symbol_count(), 0);
        assert!(store.list_fingerprints().unwrap().is_empty());
    }
}
