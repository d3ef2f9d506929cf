//! State snapshots
//!
//! JSON file holding every known task, every batch and the queue sequence
//! counter. Writes go to a sibling temp file that is renamed into place.

use crate::error::StateError;
use injector_queue::{BatchJob, Task};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Persisted injector state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub tasks: Vec<Task>,
    pub batches: Vec<BatchJob>,
    pub next_sequence: u64,
}

/// Reads and writes snapshots at a fixed path
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the snapshot; `None` if the file does not exist yet
    ///
    /// # Errors
    /// - `StateError::Io` for unreadable files
    /// - `StateError::Serde` for corrupt contents
    pub async fn load(&self) -> Result<Option<StateSnapshot>, StateError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StateError::io(&self.path, e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Replace the snapshot atomically
    ///
    /// # Errors
    /// - `StateError::Io` if the temp file cannot be written or renamed
    pub async fn save(&self, snapshot: &StateSnapshot) -> Result<(), StateError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StateError::io(parent, e))?;
        }

        let temp = self.temp_path();
        tokio::fs::write(&temp, &bytes)
            .await
            .map_err(|e| StateError::io(&temp, e))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|e| StateError::io(&self.path, e))?;

        tracing::debug!(
            "Saved state ({} tasks, {} batches) to {}",
            snapshot.tasks.len(),
            snapshot.batches.len(),
            self.path.display()
        );
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("nested/state.json"));
        let snapshot = StateSnapshot {
            next_sequence: 7,
            ..StateSnapshot::default()
        };

        store.save(&snapshot).await.unwrap();
        assert_eq!(store.load().await.unwrap(), Some(snapshot));
        assert!(!store.temp_path().exists());
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            StateStore::new(path).load().await,
            Err(StateError::Serde(_))
        ));
    }
}
