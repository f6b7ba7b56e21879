//! Parallel Extraction Pool (C5): batches files across a rayon thread pool
//! and runs [`crate::symbols::extract_symbols`] on each, isolating failures
//! per-batch with shrink-and-retry. Grounded on `scan.rs::scan_files`'s use
//! of `par_iter().map()` over a pre-walked file list, and on
//! `semantic.rs::build_semantic_index`'s worker-count capping
//! (`num_cpus().min(total_batches).min(8)`).

use crate::config::ParallelConfig;
use crate::discovery::DiscoveredFile;
use crate::types::Symbol;
use rayon::prelude::*;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

pub struct ExtractionResult {
    pub path: String,
    pub symbols: Vec<Symbol>,
    pub success: bool,
    pub error: Option<String>,
}

fn worker_count(cfg: &ParallelConfig, total: usize) -> usize {
    let cap = cfg.max_workers.unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4));
    cap.min(total.max(1)).min(8).max(1)
}

/// Crude proportional-to-size cost estimate used to pack batches toward
/// `target_batch_seconds` of wall time rather than a flat file count —
/// extraction cost scales with bytes parsed, not file count, so a batch of
/// ten tiny files and a batch of ten huge ones should not cost the same.
fn estimate_cost_seconds(file: &DiscoveredFile) -> f64 {
    ((file.size as f64 / 1024.0) * 0.001).max(0.0005)
}

/// Packs files into batches, biggest-first within a language group, so a
/// worker amortizes one language's overhead per batch (§4.5), stopping each
/// batch once its estimated cost would exceed `target_batch_seconds`.
fn batch_files<'a>(files: &'a [DiscoveredFile], cfg: &ParallelConfig) -> Vec<Vec<&'a DiscoveredFile>> {
    let mut sorted: Vec<&DiscoveredFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.language.cmp(&b.language).then(b.size.cmp(&a.size)));

    let mut batches = Vec::new();
    let mut current: Vec<&DiscoveredFile> = Vec::new();
    let mut current_cost = 0.0;
    for file in sorted {
        let cost = estimate_cost_seconds(file);
        let over_budget = current_cost + cost > cfg.target_batch_seconds && current.len() >= cfg.min_batch;
        if !current.is_empty() && (over_budget || current.len() >= cfg.max_batch) {
            batches.push(std::mem::take(&mut current));
            current_cost = 0.0;
        }
        current_cost += cost;
        current.push(file);
    }
    if !current.is_empty() {
        batches.push(current);
    }
    if batches.is_empty() {
        return batches;
    }
    // Respect min_batch by merging small trailing batches into the previous one.
    if batches.last().map(|b| b.len()).unwrap_or(0) < cfg.min_batch && batches.len() > 1 {
        let tail = batches.pop().unwrap();
        batches.last_mut().unwrap().extend(tail);
    }
    batches
}

fn extract_one(file: &DiscoveredFile) -> ExtractionResult {
    let bytes = match std::fs::read(&file.path) {
        Ok(b) => b,
        Err(e) => {
            return ExtractionResult {
                path: file.rel_path.clone(),
                symbols: Vec::new(),
                success: false,
                error: Some(e.to_string()),
            }
        }
    };
    let language = file.language.unwrap_or("");
    match crate::symbols::extract_symbols(&file.rel_path, language, &bytes) {
        Ok(symbols) => ExtractionResult { path: file.rel_path.clone(), symbols, success: true, error: None },
        Err(e) => ExtractionResult {
            path: file.rel_path.clone(),
            symbols: Vec::new(),
            success: false,
            error: Some(e.to_string()),
        },
    }
}

/// `extract_one`, but a panicking parser for one bad file becomes a failed
/// [`ExtractionResult`] instead of taking the whole batch down with it.
fn extract_one_isolated(file: &DiscoveredFile) -> ExtractionResult {
    match panic::catch_unwind(AssertUnwindSafe(|| extract_one(file))) {
        Ok(result) => result,
        Err(_) => ExtractionResult {
            path: file.rel_path.clone(),
            symbols: Vec::new(),
            success: false,
            error: Some("worker panicked while extracting this file".into()),
        },
    }
}

/// Runs a batch on a dedicated thread under `timeout`, so a single pathological
/// file (e.g. a degenerate parse that never returns) doesn't stall the whole
/// pool indefinitely (§4.5, §5 cancellation). `None` means the batch didn't
/// finish in time; the orphaned thread is left to finish and its result is
/// discarded — native threads can't be preempted, so this is a best-effort
/// "stop waiting", not a kill.
fn run_batch_timed(batch: &[&DiscoveredFile], timeout: Duration) -> Option<Vec<ExtractionResult>> {
    let owned: Vec<DiscoveredFile> = batch.iter().map(|f| (*f).clone()).collect();
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            owned.iter().map(extract_one_isolated).collect::<Vec<_>>()
        }));
        let _ = tx.send(result);
    });
    match rx.recv_timeout(timeout) {
        Ok(Ok(results)) => Some(results),
        Ok(Err(_)) | Err(_) => None,
    }
}

/// Shrink-and-retry (§4.5): a batch that fails or times out is split in half
/// and retried, recursing down to single files, so one bad file never costs
/// the rest of an otherwise-healthy batch their results.
fn run_batch_with_isolation(batch: &[&DiscoveredFile], timeout: Duration) -> Vec<ExtractionResult> {
    if batch.len() <= 1 {
        return batch.iter().map(|f| extract_one_isolated(f)).collect();
    }
    if let Some(results) = run_batch_timed(batch, timeout) {
        return results;
    }
    tracing::warn!(files = batch.len(), "batch extraction failed or timed out; retrying at half granularity");
    let mid = (batch.len() / 2).max(1);
    let (left, right) = batch.split_at(mid);
    let mut out = run_batch_with_isolation(left, timeout);
    out.extend(run_batch_with_isolation(right, timeout));
    out
}

/// Consecutive-failure threshold (§4.5): once this many batches in a row need
/// shrink-and-retry, the remaining work gives up on parallelism and falls
/// back to the fully sequential path rather than thrashing retry after retry.
const CONSECUTIVE_FAILURE_FALLBACK_THRESHOLD: usize = 3;

/// Runs extraction over `files`. On repeated failure within a batch, retries
/// at half granularity, then singleton, before giving up on that file
/// (§4.5: isolation — one bad file never loses an otherwise-healthy batch).
/// After `CONSECUTIVE_FAILURE_FALLBACK_THRESHOLD` consecutive batch failures,
/// the rest of the run falls back to the plain sequential path.
pub fn extract_all(files: &[DiscoveredFile], cfg: &ParallelConfig) -> Vec<ExtractionResult> {
    if !cfg.enabled || files.len() < 4 {
        return files.iter().map(extract_one).collect();
    }

    let workers = worker_count(cfg, files.len());
    let pool = rayon::ThreadPoolBuilder::new().num_threads(workers).build();
    let batches = batch_files(files, cfg);
    let timeout = Duration::from_secs(cfg.worker_timeout_seconds.max(1));

    let consecutive_failures = AtomicUsize::new(0);
    let sequential_fallback = AtomicBool::new(false);

    let run_batch = |batch: &[&DiscoveredFile]| -> Vec<ExtractionResult> {
        if sequential_fallback.load(Ordering::Relaxed) {
            return batch.iter().map(|f| extract_one_isolated(f)).collect();
        }
        match run_batch_timed(batch, timeout) {
            Some(results) => {
                consecutive_failures.store(0, Ordering::Relaxed);
                results
            }
            None => {
                let failures = consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= CONSECUTIVE_FAILURE_FALLBACK_THRESHOLD {
                    sequential_fallback.store(true, Ordering::Relaxed);
                    tracing::warn!(
                        "extraction pool: {failures} consecutive batch failures, falling back to sequential extraction"
                    );
                }
                run_batch_with_isolation(batch, timeout)
            }
        }
    };

    match pool {
        Ok(pool) => pool.install(|| batches.par_iter().flat_map(|b| run_batch(b)).collect()),
        Err(_) => files.iter().map(extract_one).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn file(name: &str, lang: &str, size: u64) -> DiscoveredFile {
        DiscoveredFile { path: PathBuf::from(name), rel_path: name.to_string(), language: Some(Box::leak(lang.to_string().into_boxed_str())), size }
    }

    #[test]
    fn batching_respects_max_batch() {
        let cfg = ParallelConfig { max_batch: 2, min_batch: 1, ..Default::default() };
        let files = vec![file("a.rs", "rust", 10), file("b.rs", "rust", 20), file("c.rs", "rust", 5)];
        let batches = batch_files(&files, &cfg);
        assert!(batches.iter().all(|b| b.len() <= 2));
        let total: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total, 3);
    }

    #[test]
    fn extract_all_is_order_independent_but_complete() {
        let dir = tempfile::tempdir().unwrap();
        let mut files = Vec::new();
        for i in 0..6 {
            let p = dir.path().join(format!("f{i}.py"));
            std::fs::write(&p, format!("def f{i}():\n    pass\n")).unwrap();
            files.push(DiscoveredFile { path: p, rel_path: format!("f{i}.py"), language: Some("python"), size: 10 });
        }
        let cfg = ParallelConfig::default();
        let results = extract_all(&files, &cfg);
        assert_eq!(results.len(), 6);
        assert!(results.iter().all(|r| r.success));
    }

    #[test]
    fn batching_splits_once_estimated_cost_exceeds_target() {
        let cfg = ParallelConfig { target_batch_seconds: 0.01, min_batch: 1, max_batch: 100, ..Default::default() };
        // Each file is ~10MB, comfortably over the 0.01s target on its own.
        let files = vec![file("a.rs", "rust", 10_000_000), file("b.rs", "rust", 10_000_000), file("c.rs", "rust", 10_000_000)];
        let batches = batch_files(&files, &cfg);
        assert!(batches.len() > 1, "large files should not all land in one batch when over budget");
    }

    #[test]
    fn missing_file_is_a_nonfatal_error() {
        let files = vec![DiscoveredFile { path: PathBuf::from("/nonexistent/x.py"), rel_path: "x.py".into(), language: Some("python"), size: 0 }];
        let cfg = ParallelConfig::default();
        let results = extract_all(&files, &cfg);
        assert_eq!(results.len(), 1);
        assert!(!results[0].success);
    }
}
