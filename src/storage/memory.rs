use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{state_key, StateStore};
use crate::types::StateItem;

#[derive(Clone, Default)]
pub struct InMemoryStateStore {
    states: Arc<RwLock<HashMap<String, StateItem>>>,
}

impl InMemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for InMemoryStateStore {
    async fn create_state(&self, state: StateItem) -> Result<bool> {
        let mut states = self.states.write();
        let key = state_key(&state.id);
        if states.contains_key(&key) {
            return Ok(false);
        }
        states.insert(key, state);
        Ok(true)
    }

    async fn get_state(&self, id: &str) -> Result<Option<StateItem>> {
        Ok(self.states.read().get(&state_key(id)).cloned())
    }

    async fn update_state(&self, state: StateItem) -> Result<bool> {
        Ok(self
            .states
            .write()
            .insert(state_key(&state.id), state)
            .is_some())
    }

    async fn delete_state(&self, id: &str) -> Result<bool> {
        Ok(self.states.write().remove(&state_key(id)).is_some())
    }

    async fn list_state_ids(&self) -> Result<Vec<String>> {
        let mut ids: Vec<String> = self.states.read().values().map(|s| s.id.clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
