//! Filesystem Watcher (C10): debounced change events feeding the indexer.
//!
//! Directly adapted from `watch.rs`'s `notify`-channel-plus-debounce-thread
//! shape, with two behavioral changes required by §4.10: the debounce
//! window is 60s (not 500ms, since this index additionally embeds), and
//! ignore-file changes bypass the debounce entirely and trigger an
//! immediate reload. An "agent-active" heuristic (no RPC for ~2 minutes)
//! pauses batched reindexing, which the reference watcher has no concept of.

use crate::config::WatcherConfig;
use crate::indexer::Indexer;
use crate::types::ProjectMetadata;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

pub struct LastRpcActivity(AtomicU64);

impl LastRpcActivity {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }
    pub fn touch(&self, now_secs: u64) {
        self.0.store(now_secs, Ordering::Relaxed);
    }
    fn is_active(&self, now_secs: u64, inactivity_window: u64) -> bool {
        let last = self.0.load(Ordering::Relaxed);
        last != 0 && now_secs.saturating_sub(last) < inactivity_window
    }
}

pub fn start_watcher(
    root: PathBuf,
    indexer: Arc<Indexer>,
    ignore_engine: Arc<crate::ignore_engine::IgnoreEngine>,
    metadata: Arc<RwLock<ProjectMetadata>>,
    activity: Arc<LastRpcActivity>,
    cfg: WatcherConfig,
) -> Option<RecommendedWatcher> {
    let (tx, rx) = mpsc::channel::<Event>();

    let mut watcher = match RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!(error = %e, "failed to create filesystem watcher");
            return None;
        }
    };

    if let Err(e) = watcher.watch(&root, RecursiveMode::Recursive) {
        tracing::warn!(error = %e, path = %root.display(), "failed to watch workspace root");
        return None;
    }
    tracing::info!(path = %root.display(), "watching workspace");

    let rt_handle = tokio::runtime::Handle::current();
    std::thread::spawn(move || {
        debounce_loop(rx, root, indexer, ignore_engine, metadata, activity, cfg, rt_handle);
    });

    Some(watcher)
}

fn now_secs() -> u64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn debounce_loop(
    rx: mpsc::Receiver<Event>,
    root: PathBuf,
    indexer: Arc<Indexer>,
    ignore_engine: Arc<crate::ignore_engine::IgnoreEngine>,
    metadata: Arc<RwLock<ProjectMetadata>>,
    activity: Arc<LastRpcActivity>,
    cfg: WatcherConfig,
    rt_handle: tokio::runtime::Handle,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let poll_interval = Duration::from_secs(1).min(Duration::from_secs(cfg.debounce_seconds.max(1)));

    loop {
        match rx.recv_timeout(poll_interval) {
            Ok(event) => {
                let relevant =
                    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_));
                if !relevant {
                    continue;
                }
                for path in event.paths {
                    if is_ignore_file(&path) {
                        let _ = ignore_engine.notify_changed(&path);
                        pending.remove(&path);
                        trigger_reconcile(&indexer, &metadata, &rt_handle);
                        continue;
                    }
                    pending.insert(path, Instant::now());
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pending.is_empty() {
                    continue;
                }
                if !activity.is_active(now_secs(), cfg.inactivity_seconds) {
                    // §4.10: pause batched reindexing once no RPC has arrived
                    // for the inactivity window — nobody is waiting on fresh results.
                    continue;
                }
                let cutoff = Instant::now().checked_sub(Duration::from_secs(cfg.debounce_seconds));
                let Some(cutoff) = cutoff else { continue };
                let ready: Vec<PathBuf> =
                    pending.iter().filter(|(_, t)| **t <= cutoff).map(|(p, _)| p.clone()).collect();
                if ready.is_empty() {
                    continue;
                }
                for path in &ready {
                    pending.remove(path);
                }
                process_ready(&root, &ready, &indexer);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn is_ignore_file(path: &PathBuf) -> bool {
    matches!(path.file_name().and_then(|n| n.to_str()), Some(".gitignore") | Some(".rgignore"))
}

fn process_ready(root: &PathBuf, paths: &[PathBuf], indexer: &Arc<Indexer>) {
    for abs in paths {
        let Ok(rel) = abs.strip_prefix(root) else { continue };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if let Err(e) = indexer.update_file(&rel) {
            tracing::warn!(path = %rel, error = %e, "incremental update failed");
        }
    }
}

fn trigger_reconcile(indexer: &Arc<Indexer>, metadata: &Arc<RwLock<ProjectMetadata>>, rt_handle: &tokio::runtime::Handle) {
    let mut meta = rt_handle.block_on(metadata.write());
    if let Err(e) = indexer.reconcile(&mut meta, now_secs()) {
        tracing::warn!(error = %e, "ignore-triggered reconcile failed");
    }
}
