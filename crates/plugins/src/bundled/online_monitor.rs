//! Tells the owner when the bot comes online and when the gateway's
//! reported online status flips.

use std::sync::Mutex;

use {async_trait::async_trait, botlink_protocol::Frame, serde_json::Value, tracing::info};

use crate::{context::HandlerContext, handler::Handler};

pub const NAME: &str = "online-monitor";

pub struct OnlineMonitor {
    /// Last `status.online` seen on a heartbeat; `None` before the first one.
    last_online: Mutex<Option<bool>>,
}

impl OnlineMonitor {
    pub fn new() -> Self {
        Self {
            last_online: Mutex::new(None),
        }
    }

    /// Record a heartbeat and return the new state when it differs from the
    /// previous one. A first heartbeat reporting offline counts as a change.
    fn observe(&self, online: bool) -> Option<bool> {
        let mut last = self.last_online.lock().unwrap_or_else(|e| e.into_inner());
        let previous = last.replace(online);
        match previous {
            Some(prev) if prev == online => None,
            None if online => None,
            _ => Some(online),
        }
    }
}

impl Default for OnlineMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Handler for OnlineMonitor {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Owner notices for connect and online status changes"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        let Some(event) = frame.as_event() else {
            return Ok(());
        };

        if event.is_meta("lifecycle") && event.sub_type() == Some("connect") {
            let self_id = event.self_id().unwrap_or_default();
            info!(self_id = %self_id, "gateway lifecycle connect");
            return ctx.notify_owner(format!("Bot {self_id} is online")).await;
        }

        if event.is_meta("heartbeat") {
            let online = event
                .get("status")
                .and_then(|s| s.get("online"))
                .and_then(Value::as_bool);
            if let Some(changed) = online.and_then(|online| self.observe(online)) {
                let state = if changed { "back online" } else { "offline" };
                info!(state, "gateway online status changed");
                return ctx.notify_owner(format!("Bot is {state}")).await;
            }
        }
        Ok(())
    }
}
