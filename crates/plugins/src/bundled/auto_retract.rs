//! Retracts sent messages whose command carried a `del_msg=<secs>` token.

use std::time::Duration;

use {
    async_trait::async_trait,
    botlink_protocol::{Frame, RETRACT_AFTER_KEY, command::delete_msg},
    tracing::debug,
};

use crate::{context::HandlerContext, handler::Handler};

pub const NAME: &str = "auto-retract";

pub struct AutoRetract;

#[async_trait]
impl Handler for AutoRetract {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Deletes bot messages tagged for retraction"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        let Some(response) = frame.as_response().filter(|r| r.is_ok()) else {
            return Ok(());
        };
        let token = response.token();
        let Some(secs) = token
            .get(RETRACT_AFTER_KEY)
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
        else {
            return Ok(());
        };
        let Some(message_id) = response.data_id("message_id") else {
            debug!(echo = ?response.echo, "retract requested but response has no message_id");
            return Ok(());
        };

        ctx.scheduler
            .schedule(
                format!("retract-{message_id}"),
                Duration::from_secs(secs),
                delete_msg(&message_id),
            )
            .await?;
        Ok(())
    }
}
