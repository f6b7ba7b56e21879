//! Per-project configuration, loaded from an optional TOML file with
//! programmatic defaults and environment overrides, mirroring the way
//! `init.rs`/`main.rs` in the reference server build up `ScanConfig`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HnswConfig {
    pub construction_ef: usize,
    pub search_ef: usize,
    pub m: usize,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self { construction_ef: 100, search_ef: 50, m: 16 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    pub enabled: bool,
    pub max_workers: Option<usize>,
    pub target_batch_seconds: f64,
    pub min_batch: usize,
    pub max_batch: usize,
    pub worker_timeout_seconds: u64,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_workers: None,
            target_batch_seconds: 1.5,
            min_batch: 1,
            max_batch: 15,
            worker_timeout_seconds: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_results: usize,
    pub regex_timeout_seconds: u64,
    pub pattern_max_chars: usize,
    pub oversample: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { max_results: 200, regex_timeout_seconds: 30, pattern_max_chars: 500, oversample: 2 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub debounce_seconds: u64,
    pub inactivity_seconds: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { debounce_seconds: 60, inactivity_seconds: 120 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub period_seconds: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self { period_seconds: 900 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub embedding_model_tag: String,
    pub log_level: String,
    pub ignore_warning: bool,
    pub network_enabled: bool,
    pub hnsw: HnswConfig,
    pub parallel: ParallelConfig,
    pub search: SearchConfig,
    pub watcher: WatcherConfig,
    pub reconcile: ReconcileConfig,
    pub skip_dirs: Vec<String>,
    /// §4.11/§6: container_prefix -> host_prefix, applied to result paths
    /// before they're returned. Empty means paths are returned as-is.
    pub path_map: BTreeMap<String, String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            embedding_model_tag: "fast".into(),
            log_level: "INFO".into(),
            ignore_warning: true,
            network_enabled: true,
            hnsw: HnswConfig::default(),
            parallel: ParallelConfig::default(),
            search: SearchConfig::default(),
            watcher: WatcherConfig::default(),
            reconcile: ReconcileConfig::default(),
            skip_dirs: vec![
                ".git".into(),
                "node_modules".into(),
                "__pycache__".into(),
                "target".into(),
                "dist".into(),
                "build".into(),
                ".next".into(),
                "vendor".into(),
            ],
            path_map: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads `<project_root>/coderadar.toml` if present, falling back to
    /// defaults. A missing file is not an error; a malformed one is.
    pub fn load(project_root: &Path) -> crate::error::Result<Self> {
        let path = project_root.join("coderadar.toml");
        let mut cfg = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            toml::from_str(&text).map_err(|e| {
                crate::error::Error::InvalidRequest(format!("malformed {}: {e}", path.display()))
            })?
        } else {
            Config::default()
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("CODERADAR_EMBEDDING_MODEL_TAG") {
            self.embedding_model_tag = v;
        }
        if let Ok(v) = std::env::var("CODERADAR_LOG_LEVEL") {
            self.log_level = v;
        }
        if let Ok(v) = std::env::var("CODERADAR_NETWORK_ENABLED") {
            self.network_enabled = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("CODERADAR_WATCHER_DEBOUNCE_SECONDS") {
            if let Ok(n) = v.parse() {
                self.watcher.debounce_seconds = n;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = Config::default();
        assert_eq!(cfg.hnsw.m, 16);
        assert_eq!(cfg.search.max_results, 200);
        assert!(cfg.skip_dirs.contains(&"node_modules".to_string()));
        assert!(cfg.path_map.is_empty());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.embedding_model_tag, "fast");
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("coderadar.toml"), "not valid = [ toml").unwrap();
        assert!(Config::load(dir.path()).is_err());
    }
}
