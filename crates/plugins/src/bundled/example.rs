//! Demo plugin: per-group switch plus a correlated `whoami` lookup.
//!
//! `example on` / `example off` (admins) flip the group's switch.
//! `example whoami` asks the gateway for the caller's profile and answers
//! once the tagged response comes back.

use {
    async_trait::async_trait,
    botlink_protocol::{
        Event, Frame, Response, Segment, TokenContext,
        command::{get_stranger_info, send_group_msg},
    },
    botlink_switches::Scope,
    serde_json::Value,
};

use crate::{context::HandlerContext, handler::Handler};

pub const NAME: &str = "example";

const PREFIX: &str = "example";
const WHOAMI: &str = "whoami";

pub struct Example;

impl Example {
    async fn on_message(&self, ctx: &HandlerContext, event: &Event) -> anyhow::Result<()> {
        let Some(text) = event.raw_message().map(str::trim) else {
            return Ok(());
        };
        let Some(arg) = text.strip_prefix(PREFIX).map(str::trim) else {
            return Ok(());
        };
        let (Some(group_id), Some(user_id)) = (event.group_id(), event.user_id()) else {
            return Ok(());
        };
        let scope = Scope::Group(&group_id);

        if matches!(arg, "on" | "off") && ctx.is_admin(event) {
            let enabled = arg == "on";
            ctx.switches.set(NAME, scope, enabled).await?;
            let state = if enabled { "enabled" } else { "disabled" };
            return ctx
                .reply(event, format!("{NAME} is {state} in this group"), None)
                .await;
        }

        if arg == WHOAMI && ctx.switches.is_enabled(NAME, scope).await? {
            let token = TokenContext::new()
                .with("module", NAME)
                .with("action", WHOAMI)
                .with("group", &group_id)
                .with("actor", &user_id);
            return ctx
                .send(get_stranger_info(&user_id).with_token(&token))
                .await;
        }
        Ok(())
    }

    async fn on_response(&self, ctx: &HandlerContext, response: &Response) -> anyhow::Result<()> {
        let token = response.token();
        if !token.matches("module", NAME) || !token.matches("action", WHOAMI) {
            return Ok(());
        }
        let (Some(group_id), Some(actor)) = (token.get("group"), token.get("actor")) else {
            return Ok(());
        };
        let nickname = response
            .data
            .get("nickname")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        ctx.send(send_group_msg(group_id, vec![
            Segment::at(actor),
            Segment::text(format!(" you are {nickname}")),
        ]))
        .await
    }
}

#[async_trait]
impl Handler for Example {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Switch toggle and whoami demo"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        match frame {
            Frame::Event(event) if event.is_group_message() => self.on_message(ctx, event).await,
            Frame::Response(response) if response.is_ok() => self.on_response(ctx, response).await,
            _ => Ok(()),
        }
    }
}
