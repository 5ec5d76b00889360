//! What a handler can reach while handling a frame.

use std::{
    path::PathBuf,
    sync::{Arc, RwLock},
};

use {
    anyhow::Context as _,
    async_trait::async_trait,
    botlink_protocol::{
        Command, Event, Segment, TokenContext,
        command::{send_group_msg, send_private_msg},
    },
    botlink_scheduler::Scheduler,
    botlink_switches::SwitchStore,
};

/// Outbound half of the connection, provided by the gateway.
///
/// Sends are fire-and-forget: a reply, if any, comes back later as a
/// `Frame::Response` carrying the command's echo token.
#[async_trait]
pub trait Outbound: Send + Sync {
    async fn send(&self, command: Command) -> anyhow::Result<()>;
}

/// Shared services handed to every handler invocation.
#[derive(Clone)]
pub struct HandlerContext {
    pub outbound: Arc<dyn Outbound>,
    pub switches: Arc<SwitchStore>,
    pub scheduler: Arc<Scheduler>,
    /// Operator that receives reports and diagnostics.
    pub owner_id: Option<String>,
    pub data_dir: PathBuf,
    pub plugins: PluginDirectory,
}

/// Name and description of an active handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PluginSummary {
    pub name: String,
    pub description: String,
}

/// The active handler set as handlers see it, in dispatch order.
///
/// Published by the dispatcher on every activation.
#[derive(Clone, Default)]
pub struct PluginDirectory {
    entries: Arc<RwLock<Arc<Vec<PluginSummary>>>>,
}

impl PluginDirectory {
    pub fn list(&self) -> Arc<Vec<PluginSummary>> {
        Arc::clone(&self.entries.read().unwrap_or_else(|e| e.into_inner()))
    }

    pub(crate) fn publish(&self, entries: Vec<PluginSummary>) {
        *self.entries.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(entries);
    }
}

impl HandlerContext {
    pub async fn send(&self, command: Command) -> anyhow::Result<()> {
        self.outbound.send(command).await
    }

    /// Reply where `event` came from: quoting it in a group, or privately to
    /// the sender.
    pub async fn reply(
        &self,
        event: &Event,
        text: impl Into<String>,
        token: Option<&TokenContext>,
    ) -> anyhow::Result<()> {
        let text = text.into();
        let command = if let Some(group_id) = event.group_id() {
            let mut message = Vec::with_capacity(2);
            if let Some(message_id) = event.message_id() {
                message.push(Segment::reply(message_id));
            }
            message.push(Segment::text(text));
            send_group_msg(&group_id, message)
        } else {
            let user_id = event.user_id().context("event has neither group nor sender")?;
            send_private_msg(&user_id, vec![Segment::text(text)])
        };
        self.send(command.with_optional_token(token)).await
    }

    /// Private message to the owner. A no-op when no owner is configured.
    pub async fn notify_owner(&self, text: impl Into<String>) -> anyhow::Result<()> {
        let Some(owner) = &self.owner_id else {
            return Ok(());
        };
        self.send(send_private_msg(owner, vec![Segment::text(text)]))
            .await
    }

    pub fn is_owner(&self, user_id: &str) -> bool {
        self.owner_id.as_deref() == Some(user_id)
    }

    /// Owner of the bot, or owner/admin of the group the event came from.
    pub fn is_admin(&self, event: &Event) -> bool {
        if event.user_id().is_some_and(|u| self.is_owner(&u)) {
            return true;
        }
        matches!(event.sender_role(), Some("owner" | "admin"))
    }
}
