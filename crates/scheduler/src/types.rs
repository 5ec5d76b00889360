use {
    botlink_protocol::Command,
    serde::{Deserialize, Serialize},
};

/// A pending one-shot command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeferredAction {
    pub id: String,
    /// Unix milliseconds at which the command is due.
    pub deadline_ms: u64,
    pub command: Command,
}

/// On-disk value; the id is the map key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoredAction {
    pub deadline_ms: u64,
    pub command: Command,
}

impl DeferredAction {
    pub(crate) fn from_stored(id: String, stored: StoredAction) -> Self {
        Self {
            id,
            deadline_ms: stored.deadline_ms,
            command: stored.command,
        }
    }

    pub(crate) fn to_stored(&self) -> StoredAction {
        StoredAction {
            deadline_ms: self.deadline_ms,
            command: self.command.clone(),
        }
    }
}
