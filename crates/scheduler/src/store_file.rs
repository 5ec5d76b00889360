//! JSON file-backed deferred action store with atomic writes.

use std::{collections::BTreeMap, path::PathBuf};

use {
    async_trait::async_trait,
    botlink_common::fs::{read_optional, write_atomic},
    tokio::sync::Mutex,
    tracing::warn,
};

use crate::{
    Result,
    error::Context,
    store::DeferredStore,
    types::{DeferredAction, StoredAction},
};

type ActionMap = BTreeMap<String, StoredAction>;

/// File-backed store: one JSON object mapping id to `{deadline_ms, command}`.
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Store at `<data_dir>/core/deferred_actions.json`.
    pub fn in_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self::new(data_dir.into().join(crate::DEFERRED_ACTIONS_FILE))
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Corrupt or unreadable files read as empty; the next write replaces them.
    async fn read_map(&self) -> ActionMap {
        let raw = match read_optional(&self.path).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return ActionMap::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "deferred actions unreadable, treating as empty");
                return ActionMap::new();
            },
        };
        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "deferred actions file corrupt, treating as empty");
            ActionMap::new()
        })
    }

    async fn write_map(&self, map: &ActionMap) -> Result<()> {
        let json = serde_json::to_string_pretty(map)?;
        write_atomic(&self.path, json.as_bytes())
            .await
            .with_context(|| format!("writing {}", self.path.display()))
    }
}

#[async_trait]
impl DeferredStore for FileStore {
    async fn load_all(&self) -> Result<Vec<DeferredAction>> {
        let mut all: Vec<_> = self
            .read_map()
            .await
            .into_iter()
            .map(|(id, stored)| DeferredAction::from_stored(id, stored))
            .collect();
        all.sort_by(|a, b| a.deadline_ms.cmp(&b.deadline_ms).then_with(|| a.id.cmp(&b.id)));
        Ok(all)
    }

    async fn save(&self, action: &DeferredAction) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await;
        map.insert(action.id.clone(), action.to_stored());
        self.write_map(&map).await
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut map = self.read_map().await;
        if map.remove(id).is_none() {
            return Ok(false);
        }
        self.write_map(&map).await?;
        Ok(true)
    }
}
