//! Fixtures shared by the handler and dispatcher tests.

use std::{path::Path, sync::Arc, time::Duration};

use {
    async_trait::async_trait,
    botlink_protocol::{Command, Frame},
    botlink_scheduler::{ActionFn, InMemoryStore, Scheduler},
    botlink_switches::SwitchStore,
    tokio::sync::Mutex,
};

use crate::context::{HandlerContext, Outbound, PluginDirectory};

pub const OWNER: &str = "10000";

/// Outbound that records every command.
#[derive(Default)]
pub struct RecordingOutbound {
    pub sent: Mutex<Vec<Command>>,
}

impl RecordingOutbound {
    pub async fn take(&self) -> Vec<Command> {
        std::mem::take(&mut *self.sent.lock().await)
    }
}

#[async_trait]
impl Outbound for RecordingOutbound {
    async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.sent.lock().await.push(command);
        Ok(())
    }
}

/// Context with a recording outbound, a switch store under `data_dir` and a
/// scheduler whose actions go to the same outbound.
pub fn context(data_dir: &Path) -> (HandlerContext, Arc<RecordingOutbound>) {
    let outbound = Arc::new(RecordingOutbound::default());
    let sink = Arc::clone(&outbound);
    let executor: ActionFn = Arc::new(move |cmd| {
        let sink = Arc::clone(&sink);
        Box::pin(async move { sink.send(cmd).await })
    });
    let scheduler = Scheduler::new(Arc::new(InMemoryStore::new()), executor)
        .with_persist_threshold(Duration::from_secs(5));
    let ctx = HandlerContext {
        outbound: Arc::clone(&outbound) as Arc<dyn Outbound>,
        switches: Arc::new(SwitchStore::new(data_dir)),
        scheduler: Arc::new(scheduler),
        owner_id: Some(OWNER.to_string()),
        data_dir: data_dir.to_path_buf(),
        plugins: PluginDirectory::default(),
    };
    (ctx, outbound)
}

pub fn frame(json: &str) -> Frame {
    match Frame::parse(json) {
        Ok(frame) => frame,
        Err(e) => panic!("bad test frame {json}: {e}"),
    }
}

pub fn group_message(group_id: &str, user_id: &str, role: &str, text: &str) -> Frame {
    Frame::from_value(serde_json::json!({
        "post_type": "message",
        "message_type": "group",
        "group_id": group_id,
        "user_id": user_id,
        "message_id": 555,
        "raw_message": text,
        "sender": {"role": role},
    }))
    .unwrap_or_else(|e| panic!("bad group message: {e}"))
}
