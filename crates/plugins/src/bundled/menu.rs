//! `menu` lists the active handlers and what they do.

use {
    async_trait::async_trait,
    botlink_protocol::{Frame, RETRACT_AFTER_KEY, TokenContext},
};

use crate::{
    context::{HandlerContext, PluginSummary},
    handler::Handler,
};

pub const NAME: &str = "menu";

const COMMAND: &str = "menu";
const RETRACT_AFTER_SECS: u64 = 30;

pub struct Menu;

#[async_trait]
impl Handler for Menu {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Lists the loaded plugins"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        let Some(event) = frame.as_event().filter(|e| e.is_message()) else {
            return Ok(());
        };
        let is_command = event
            .raw_message()
            .is_some_and(|text| text.trim().eq_ignore_ascii_case(COMMAND));
        if !is_command {
            return Ok(());
        }
        let token = TokenContext::new().with(RETRACT_AFTER_KEY, RETRACT_AFTER_SECS);
        ctx.reply(event, render(&ctx.plugins.list()), Some(&token)).await
    }
}

fn render(plugins: &[PluginSummary]) -> String {
    let mut text = String::from("Menu");
    for plugin in plugins {
        text.push_str("\n\n[");
        text.push_str(&plugin.name);
        text.push(']');
        if !plugin.description.is_empty() {
            text.push('\n');
            text.push_str(&plugin.description);
        }
    }
    text
}
