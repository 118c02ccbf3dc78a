use anyhow::Result;
use async_trait::async_trait;

use crate::types::StateItem;

/// Backing store for the state documents served on `/api/state/{id}`. Ids are
/// case-insensitive.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Inserts a new state. Returns false when the id is already taken.
    async fn create_state(&self, state: StateItem) -> Result<bool>;
    async fn get_state(&self, id: &str) -> Result<Option<StateItem>>;
    /// Writes the state, creating it when absent. Returns whether a state was replaced.
    async fn update_state(&self, state: StateItem) -> Result<bool>;
    /// Returns whether a state was removed.
    async fn delete_state(&self, id: &str) -> Result<bool>;
    async fn list_state_ids(&self) -> Result<Vec<String>>;
}

pub(crate) fn state_key(id: &str) -> String {
    id.trim().to_lowercase()
}
