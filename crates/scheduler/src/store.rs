//! Persistence trait for deferred actions.

use async_trait::async_trait;

use crate::{Result, types::DeferredAction};

/// Persistence backend for deferred actions.
#[async_trait]
pub trait DeferredStore: Send + Sync {
    /// All persisted actions, ordered by deadline.
    async fn load_all(&self) -> Result<Vec<DeferredAction>>;
    /// Insert or replace by id.
    async fn save(&self, action: &DeferredAction) -> Result<()>;
    /// Remove by id. Returns `false` when nothing was stored under it.
    async fn remove(&self, id: &str) -> Result<bool>;
}
