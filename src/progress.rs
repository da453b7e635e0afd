use crate::error::{Artifact, BatchError};
use crate::item::WorkItem;
use crate::util::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

/// Which items have reached a terminal state. Ids serialize sorted so equal
/// states always produce the same bytes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub completed: BTreeSet<WorkItem>,
    #[serde(default)]
    pub failed: BTreeSet<WorkItem>,
    #[serde(default, rename = "timestamp")]
    pub last_checkpoint: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reasons: BTreeMap<WorkItem, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_digest: Option<String>,
}

impl ProgressState {
    pub fn is_terminal(&self, item: &WorkItem) -> bool {
        self.completed.contains(item) || self.failed.contains(item)
    }

    /// Mark `item` completed. Returns false if it already had a terminal state.
    pub fn record_completed(&mut self, item: &WorkItem) -> bool {
        if self.is_terminal(item) {
            return false;
        }
        self.completed.insert(item.clone())
    }

    /// Mark `item` failed. Returns false if it already had a terminal state.
    pub fn record_failed(&mut self, item: &WorkItem, reason: &str) -> bool {
        if self.is_terminal(item) {
            return false;
        }
        self.reasons.insert(item.clone(), reason.to_string());
        self.failed.insert(item.clone())
    }

    pub fn terminal_count(&self) -> usize {
        self.completed.len() + self.failed.len()
    }

    pub fn touch(&mut self) {
        self.last_checkpoint = crate::util::unix_now();
    }
}

/// Durable home of a [`ProgressState`].
#[derive(Debug, Clone)]
pub struct ProgressStore {
    path: PathBuf,
}

impl ProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty state; anything unreadable is corrupt.
    pub fn load(&self) -> Result<ProgressState, BatchError> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(ProgressState::default()),
            Err(e) => return Err(BatchError::corrupt(&self.path, e)),
        };
        let state: ProgressState =
            serde_json::from_slice(&raw).map_err(|e| BatchError::corrupt(&self.path, e))?;

        if let Some(both) = state.completed.intersection(&state.failed).next() {
            return Err(BatchError::corrupt(
                &self.path,
                format!("{both} is listed as both completed and failed"),
            ));
        }
        Ok(state)
    }

    /// Replace the stored state. The previous checkpoint survives a crash
    /// mid-write.
    pub fn save(&self, state: &ProgressState) -> Result<(), BatchError> {
        write_atomic(&self.path, |w| {
            serde_json::to_writer_pretty(&mut *w, state).map_err(io::Error::from)?;
            w.write_all(b"\n")
        })
        .map_err(|e| BatchError::persistence(Artifact::Checkpoint, &self.path, e))
    }
}
