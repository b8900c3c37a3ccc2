//! The persistence boundary.
//!
//! The engine never talks to storage. The caller persists the state around
//! `run`/`resume` calls through a [`WorkflowStore`], most simply the
//! file-backed [`JsonFileStore`] (one pretty-printed JSON file per workflow
//! id). Because a suspended run can sit for days, the store is where stale
//! writes are caught: [`JsonFileStore::put_if_newer`] rejects a state whose
//! revision counter is not ahead of what is already on disk.

use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::state::WorkflowState;

/// External storage for workflow states, keyed by workflow id.
pub trait WorkflowStore: Send + Sync {
    fn get(&self, id: Uuid) -> Result<Option<WorkflowState>>;
    fn put(&self, id: Uuid, state: &WorkflowState) -> Result<()>;
    /// Returns whether a state was actually removed.
    fn delete(&self, id: Uuid) -> Result<bool>;
}

/// One JSON file per workflow under a base directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Create the store, creating the base directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create store directory: {}", dir.display()))?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// Ids of every persisted workflow.
    pub fn list(&self) -> Result<Vec<Uuid>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store directory: {}", self.dir.display()))?
        {
            let entry = entry.context("Failed to read store directory entry")?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str())
                && let Ok(id) = stem.parse::<Uuid>()
            {
                ids.push(id);
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Write the state only if its revision counter is ahead of whatever is
    /// already on disk. Two callers racing on the same suspended workflow
    /// surface here as an error instead of a silent overwrite.
    pub fn put_if_newer(&self, id: Uuid, state: &WorkflowState) -> Result<()> {
        if let Some(existing) = self.get(id)?
            && existing.revision >= state.revision
        {
            bail!(
                "Stale write for workflow {}: stored revision {} >= incoming revision {}",
                id,
                existing.revision,
                state.revision
            );
        }
        self.put(id, state)
    }
}

impl WorkflowStore for JsonFileStore {
    fn get(&self, id: Uuid) -> Result<Option<WorkflowState>> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read workflow file: {}", path.display()))?;
        let state: WorkflowState = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse workflow file: {}", path.display()))?;
        Ok(Some(state))
    }

    fn put(&self, id: Uuid, state: &WorkflowState) -> Result<()> {
        let path = self.path_for(id);
        let content =
            serde_json::to_string_pretty(state).context("Failed to serialize workflow state")?;
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write workflow file: {}", path.display()))?;
        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool> {
        let path = self.path_for(id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete workflow file: {}", path.display()))?;
        Ok(true)
    }
}
