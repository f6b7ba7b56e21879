//! Project Registry (C12): resolves a workspace path to a stable project id,
//! owns the per-project data directory, and enforces name uniqueness.
//!
//! `pid` derivation follows the same content-addressing approach as
//! [`crate::fingerprint`] (blake3 over a canonical string), rather than a
//! counter or UUID, so the same user+workspace pair always resolves to the
//! same data directory across daemon restarts.

use crate::error::{Error, Result};
use crate::types::ProjectMetadata;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub fn derive_pid(user_id: &str, workspace_path: &Path) -> String {
    let canon = workspace_path.to_string_lossy().replace('\\', "/");
    let key = format!("{user_id}\u{0}{canon}");
    blake3::hash(key.as_bytes()).to_hex()[..16].to_string()
}

pub struct Registry {
    base_dir: PathBuf,
}

impl Registry {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&base_dir)?;
        Ok(Self { base_dir })
    }

    pub fn project_dir(&self, pid: &str) -> PathBuf {
        self.base_dir.join(pid)
    }

    fn metadata_path(&self, pid: &str) -> PathBuf {
        self.project_dir(pid).join("project_info.json")
    }

    pub fn load_metadata(&self, pid: &str) -> Result<Option<ProjectMetadata>> {
        let path = self.metadata_path(pid);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| Error::InvalidRequest(format!("corrupt project metadata: {e}")))
    }

    pub fn save_metadata(&self, metadata: &ProjectMetadata) -> Result<()> {
        std::fs::create_dir_all(self.project_dir(&metadata.pid))?;
        let text = serde_json::to_string_pretty(metadata).map_err(|e| Error::VectorStore(e.to_string()))?;
        std::fs::write(self.metadata_path(&metadata.pid), text)?;
        Ok(())
    }

    /// Every project_name currently registered, for uniqueness checks
    /// (§3 invariant, §8 property 6).
    fn all_project_names(&self) -> Result<BTreeMap<String, String>> {
        let mut names = BTreeMap::new();
        if !self.base_dir.exists() {
            return Ok(names);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let pid = entry.file_name().to_string_lossy().to_string();
            if let Some(meta) = self.load_metadata(&pid)? {
                names.insert(meta.project_name, meta.pid);
            }
        }
        Ok(names)
    }

    /// Resolves `workspace_path` to its project, creating metadata on first
    /// use. If an existing `pid`'s recorded `workspace_path` no longer
    /// matches, the caller is told to force a full rebuild (§8, scenario 4).
    pub fn resolve(
        &self,
        user_id: &str,
        workspace_path: &Path,
        project_name: &str,
        now: u64,
    ) -> Result<(ProjectMetadata, bool)> {
        let canonical = workspace_path.canonicalize().unwrap_or_else(|_| workspace_path.to_path_buf());
        let pid = derive_pid(user_id, &canonical);

        if let Some(mut meta) = self.load_metadata(&pid)? {
            let moved = meta.workspace_path != canonical.to_string_lossy();
            if moved {
                meta.workspace_path = canonical.to_string_lossy().to_string();
            }
            meta.last_accessed = now;
            self.save_metadata(&meta)?;
            return Ok((meta, moved));
        }

        let existing_names = self.all_project_names()?;
        if let Some(existing_pid) = existing_names.get(project_name) {
            if existing_pid != &pid {
                return Err(Error::InvalidRequest(format!(
                    "project name '{project_name}' is already in use by another workspace"
                )));
            }
        }

        let meta = ProjectMetadata {
            pid: pid.clone(),
            project_name: project_name.to_string(),
            workspace_path: canonical.to_string_lossy().to_string(),
            created_at: now,
            last_accessed: now,
            last_indexed: None,
            embedder_model_tag: "fast".to_string(),
            collection_name: pid.clone(),
            symbol_counts: BTreeMap::new(),
            language_counts: BTreeMap::new(),
            total_bytes: 0,
        };
        self.save_metadata(&meta)?;
        Ok((meta, false))
    }

    pub fn remove(&self, pid: &str) -> Result<()> {
        let dir = self.project_dir(pid);
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<ProjectMetadata>> {
        let mut out = Vec::new();
        if !self.base_dir.exists() {
            return Ok(out);
        }
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            let pid = entry.file_name().to_string_lossy().to_string();
            if let Some(meta) = self.load_metadata(&pid)? {
                out.push(meta);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_same_pid() {
        let a = derive_pid("u1", Path::new("/workspace/a"));
        let b = derive_pid("u1", Path::new("/workspace/a"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_user_different_pid() {
        let a = derive_pid("u1", Path::new("/workspace/a"));
        let b = derive_pid("u2", Path::new("/workspace/a"));
        assert_ne!(a, b);
    }

    #[test]
    fn resolve_creates_then_reuses_metadata() {
        let base = tempfile::tempdir().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let registry = Registry::new(base.path().to_path_buf()).unwrap();

        let (meta1, moved1) = registry.resolve("u1", ws.path(), "demo", 100).unwrap();
        assert!(!moved1);
        let (meta2, moved2) = registry.resolve("u1", ws.path(), "demo", 200).unwrap();
        assert!(!moved2);
        assert_eq!(meta1.pid, meta2.pid);
        assert_eq!(meta2.last_accessed, 200);
    }

    #[test]
    fn duplicate_project_name_rejected() {
        let base = tempfile::tempdir().unwrap();
        let ws1 = tempfile::tempdir().unwrap();
        let ws2 = tempfile::tempdir().unwrap();
        let registry = Registry::new(base.path().to_path_buf()).unwrap();

        registry.resolve("u1", ws1.path(), "demo", 100).unwrap();
        let result = registry.resolve("u1", ws2.path(), "demo", 100);
        assert!(result.is_err());
    }
}
