//! Keeps `<data_dir>/core/group_list.json` fresh.
//!
//! Requests the group list at most once per interval, and again whenever a
//! group is renamed; the `ok` response is written to disk for lookups such as
//! [`group_name`].

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use {
    async_trait::async_trait,
    botlink_common::fs::{read_optional, write_atomic},
    botlink_protocol::{Frame, command::get_group_list},
    serde_json::Value,
    tokio::time::Instant,
    tracing::{debug, info},
};

use crate::{context::HandlerContext, handler::Handler};

pub const NAME: &str = "group-list";

/// Echo the request is sent with; also the marker of its response.
const ECHO: &str = "get_group_list";
const REQUEST_INTERVAL: Duration = Duration::from_secs(300);
const GROUP_LIST_FILE: &str = "core/group_list.json";

pub struct GroupList {
    path: PathBuf,
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl GroupList {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(GROUP_LIST_FILE),
            interval: REQUEST_INTERVAL,
            last_request: Mutex::new(None),
        }
    }

    /// Claim the request slot if the interval has passed (or `force`).
    fn claim(&self, force: bool) -> bool {
        let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        let due = force || last.is_none_or(|at| at.elapsed() >= self.interval);
        if due {
            *last = Some(Instant::now());
        }
        due
    }
}

#[async_trait]
impl Handler for GroupList {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Caches the group list"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        match frame {
            Frame::Response(response) => {
                if response.is_ok() && response.echo.as_deref() == Some(ECHO) {
                    let json = serde_json::to_string_pretty(&response.data)?;
                    write_atomic(&self.path, json.as_bytes()).await?;
                    let count = response.data.as_array().map_or(0, Vec::len);
                    info!(count, path = %self.path.display(), "saved group list");
                }
                Ok(())
            },
            Frame::Event(event) => {
                let renamed = event.sub_type() == Some("group_name");
                if self.claim(renamed) {
                    debug!(renamed, "requesting group list");
                    ctx.send(get_group_list(true)).await?;
                }
                Ok(())
            },
        }
    }
}

/// Look up a group's display name in the saved list.
pub async fn group_name(data_dir: &Path, group_id: &str) -> Option<String> {
    saved_groups(data_dir).await?.iter().find_map(|group| {
        if id_of(group)? != group_id {
            return None;
        }
        group.get("group_name").and_then(Value::as_str).map(str::to_string)
    })
}

/// Ids of every group in the saved list; empty when nothing is saved yet.
pub async fn group_ids(data_dir: &Path) -> Vec<String> {
    saved_groups(data_dir)
        .await
        .map(|groups| groups.iter().filter_map(id_of).collect())
        .unwrap_or_default()
}

async fn saved_groups(data_dir: &Path) -> Option<Vec<Value>> {
    let raw = read_optional(&data_dir.join(GROUP_LIST_FILE)).await.ok()??;
    match serde_json::from_str(&raw).ok()? {
        Value::Array(groups) => Some(groups),
        _ => None,
    }
}

fn id_of(group: &Value) -> Option<String> {
    match group.get("group_id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        _ => None,
    }
}
