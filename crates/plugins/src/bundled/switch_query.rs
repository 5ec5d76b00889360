//! `switch` in a group lists the modules enabled there.

use {
    async_trait::async_trait,
    botlink_protocol::{Frame, RETRACT_AFTER_KEY, TokenContext},
};

use crate::{bundled::group_list, context::HandlerContext, handler::Handler};

pub const NAME: &str = "switch-query";

const COMMAND: &str = "switch";
/// The listing is retracted after this many seconds.
const RETRACT_AFTER_SECS: u64 = 30;

pub struct SwitchQuery;

#[async_trait]
impl Handler for SwitchQuery {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Lists the modules enabled in a group"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        let Some(event) = frame.as_event().filter(|e| e.is_group_message()) else {
            return Ok(());
        };
        let is_command = event
            .raw_message()
            .is_some_and(|text| text.trim().eq_ignore_ascii_case(COMMAND));
        if !is_command || !ctx.is_admin(event) {
            return Ok(());
        }
        let Some(group_id) = event.group_id() else {
            return Ok(());
        };

        let modules = ctx.switches.enabled_modules(&group_id).await?;
        let group = group_list::group_name(&ctx.data_dir, &group_id)
            .await
            .unwrap_or_else(|| group_id.clone());
        let text = if modules.is_empty() {
            format!("No modules are enabled in {group}")
        } else {
            let lines: Vec<_> = modules
                .iter()
                .enumerate()
                .map(|(i, m)| format!("{}. {m}", i + 1))
                .collect();
            format!("Modules enabled in {group}:\n{}", lines.join("\n"))
        };
        let token = TokenContext::new().with(RETRACT_AFTER_KEY, RETRACT_AFTER_SECS);
        ctx.reply(event, text, Some(&token)).await
    }
}
