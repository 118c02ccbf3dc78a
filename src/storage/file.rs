use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::traits::{state_key, StateStore};
use crate::errors::{ErrorReason, OrchestrationError};
use crate::types::StateItem;

/// Persists each state as `<dir>/<id>.json` so it survives agent restarts.
pub struct FileStateStore {
    directory: PathBuf,
    // Serializes read-modify-write sequences.
    lock: Mutex<()>,
}

impl FileStateStore {
    pub async fn open(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory)
            .await
            .with_context(|| format!("creating state directory {}", directory.display()))?;

        Ok(Self {
            directory,
            lock: Mutex::new(()),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        let key = state_key(id);
        if key.is_empty()
            || !key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || key.starts_with('.')
        {
            return Err(OrchestrationError::api(
                format!("Invalid state id '{}'.", id),
                ErrorReason::Http400BadRequestResponse,
            )
            .into());
        }
        Ok(self.directory.join(format!("{}.json", key)))
    }

    async fn read(&self, path: &Path) -> Result<Option<StateItem>> {
        match tokio::fs::read_to_string(path).await {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, path: &Path, state: &StateItem) -> Result<()> {
        tokio::fs::write(path, serde_json::to_vec_pretty(state)?).await?;
        Ok(())
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn create_state(&self, state: StateItem) -> Result<bool> {
        let path = self.path_for(&state.id)?;
        let _guard = self.lock.lock().await;
        if self.read(&path).await?.is_some() {
            return Ok(false);
        }
        self.write(&path, &state).await?;
        Ok(true)
    }

    async fn get_state(&self, id: &str) -> Result<Option<StateItem>> {
        let path = self.path_for(id)?;
        self.read(&path).await
    }

    async fn update_state(&self, state: StateItem) -> Result<bool> {
        let path = self.path_for(&state.id)?;
        let _guard = self.lock.lock().await;
        let replaced = self.read(&path).await?.is_some();
        self.write(&path, &state).await?;
        Ok(replaced)
    }

    async fn delete_state(&self, id: &str) -> Result<bool> {
        let path = self.path_for(id)?;
        let _guard = self.lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_state_ids(&self) -> Result<Vec<String>> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(state) = self.read(&path).await? {
                ids.push(state.id);
            }
        }
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_states_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStateStore::open(dir.path()).await.unwrap();
            assert!(store
                .create_state(StateItem::new("Barrier", json!({ "Status": "Ready" })))
                .await
                .unwrap());
        }

        let store = FileStateStore::open(dir.path()).await.unwrap();
        let state = store.get_state("barrier").await.unwrap().unwrap();
        assert_eq!(state.id, "Barrier");
        assert_eq!(store.list_state_ids().await.unwrap(), vec!["Barrier"]);

        assert!(store.delete_state("Barrier").await.unwrap());
        assert!(store.get_state("Barrier").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_writes_absent_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();

        assert!(!store
            .update_state(StateItem::new("Counter", json!({ "value": 1 })))
            .await
            .unwrap());
        assert!(store
            .update_state(StateItem::new("counter", json!({ "value": 2 })))
            .await
            .unwrap());
        assert_eq!(
            store.get_state("COUNTER").await.unwrap().unwrap().definition["value"],
            2
        );
    }

    #[tokio::test]
    async fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStateStore::open(dir.path()).await.unwrap();
        assert!(store.get_state("../escape").await.is_err());
        assert!(store.get_state("").await.is_err());
    }
}
