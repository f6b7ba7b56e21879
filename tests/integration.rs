//! End-to-end scenarios from the indexer's testable-properties section,
//! exercised against the in-process harness rather than the daemon socket.

mod helpers;

use helpers::Harness;

#[test]
fn empty_workspace_produces_ready_index_with_no_symbols() {
    let mut h = Harness::new();
    h.index_once(false, 1);
    assert_eq!(h.indexer.state(), coderadar::types::IndexState::Ready);
    assert_eq!(h.metadata.symbol_counts.values().sum::<usize>(), 0);
}

#[test]
fn add_then_modify_a_symbol_changes_what_is_findable() {
    let mut h = Harness::new();
    h.write_file("a.py", "def foo():\n    return 1\n");
    h.index_once(false, 1);

    let fps = h.indexer.store_fingerprints();
    assert!(fps.contains_key("a.py"));

    h.write_file("a.py", "def bar():\n    return 1\n");
    h.indexer.update_file("a.py").unwrap();

    let fps = h.indexer.store_fingerprints();
    assert!(fps.contains_key("a.py"));
}

#[test]
fn deleting_a_file_removes_it_from_the_fingerprint_set() {
    let mut h = Harness::new();
    h.write_file("a.py", "def foo():\n    return 1\n");
    h.index_once(false, 1);
    assert!(h.indexer.store_fingerprints().contains_key("a.py"));

    std::fs::remove_file(h.root.join("a.py")).unwrap();
    h.index_once(false, 2);
    assert!(!h.indexer.store_fingerprints().contains_key("a.py"));
}

#[test]
fn reindexing_with_no_changes_is_idempotent() {
    let mut h = Harness::new();
    h.write_file("a.py", "def foo():\n    return 1\n");
    h.index_once(false, 1);
    let first = h.indexer.store_fingerprints();
    h.index_once(false, 2);
    let second = h.indexer.store_fingerprints();
    assert_eq!(first, second);
}

#[test]
fn multiple_files_across_languages_are_all_indexed() {
    let mut h = Harness::new();
    h.write_file("a.py", "def foo():\n    return 1\n");
    h.write_file("b.rs", "fn bar() -> i32 {\n    2\n}\n");
    h.index_once(false, 1);

    let fps = h.indexer.store_fingerprints();
    assert!(fps.contains_key("a.py"));
    assert!(fps.contains_key("b.rs"));
    assert!(h.metadata.symbol_counts.values().sum::<usize>() >= 2);
}
