//! Fingerprint Store (C3): content-addressed per-file digests driving
//! incremental diffs. Digest algorithm is `blake3`, sourced from the pack's
//! charter example for cheap, high-quality content hashing; the store itself
//! has no independent persistence — `VectorStore::list_fingerprints` is the
//! source of truth (§4.7), this module only computes digests and diffs.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

pub fn hash_bytes(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hash_bytes(&bytes))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

/// Pure set/value diff (§4.3): never consults timestamps, only whether the
/// digest for a path changed or is missing from `stored`.
pub fn diff(current: &BTreeMap<String, String>, stored: &BTreeMap<String, String>) -> DiffResult {
    let current_keys: BTreeSet<&String> = current.keys().collect();
    let stored_keys: BTreeSet<&String> = stored.keys().collect();

    let mut added = Vec::new();
    let mut modified = Vec::new();
    for path in &current_keys {
        match stored.get(*path) {
            None => added.push((*path).clone()),
            Some(old_digest) if old_digest != &current[*path] => modified.push((*path).clone()),
            Some(_) => {}
        }
    }
    let removed: Vec<String> = stored_keys.difference(&current_keys).map(|p| (*p).clone()).collect();

    added.sort();
    modified.sort();
    let mut removed = removed;
    removed.sort();
    DiffResult { added, removed, modified }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff_partitions_are_disjoint_and_complete() {
        let mut stored = BTreeMap::new();
        stored.insert("a.py".to_string(), "h1".to_string());
        stored.insert("b.py".to_string(), "h2".to_string());

        let mut current = BTreeMap::new();
        current.insert("a.py".to_string(), "h1".to_string()); // unchanged
        current.insert("b.py".to_string(), "h2-new".to_string()); // modified
        current.insert("c.py".to_string(), "h3".to_string()); // added
        // b is present, a is present; "removed" would be none here; test removal separately

        let d = diff(&current, &stored);
        assert_eq!(d.added, vec!["c.py".to_string()]);
        assert_eq!(d.modified, vec!["b.py".to_string()]);
        assert!(d.removed.is_empty());
    }

    #[test]
    fn removed_file_detected() {
        let mut stored = BTreeMap::new();
        stored.insert("a.py".to_string(), "h1".to_string());
        let current = BTreeMap::new();
        let d = diff(&current, &stored);
        assert_eq!(d.removed, vec!["a.py".to_string()]);
        assert!(d.added.is_empty() && d.modified.is_empty());
    }

    #[test]
    fn same_bytes_same_digest() {
        assert_eq!(hash_bytes(b"fn foo() {}"), hash_bytes(b"fn foo() {}"));
        assert_ne!(hash_bytes(b"fn foo() {}"), hash_bytes(b"fn bar() {}"));
    }
}
