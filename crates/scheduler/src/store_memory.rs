//! In-memory store for tests and non-durable setups.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;

use crate::{Result, store::DeferredStore, types::DeferredAction};

/// In-memory store backed by `HashMap`. Nothing survives the process.
#[derive(Default)]
pub struct InMemoryStore {
    actions: Mutex<HashMap<String, DeferredAction>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeferredStore for InMemoryStore {
    async fn load_all(&self) -> Result<Vec<DeferredAction>> {
        let actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = actions.values().cloned().collect();
        all.sort_by(|a, b| a.deadline_ms.cmp(&b.deadline_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn save(&self, action: &DeferredAction) -> Result<()> {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        actions.insert(action.id.clone(), action.clone());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut actions = self.actions.lock().unwrap_or_else(|e| e.into_inner());
        Ok(actions.remove(id).is_some())
    }
}
