//! Caches every group's member list under
//! `<data_dir>/core/group_member_list/<group_id>.json`.
//!
//! All groups in the saved group list are refreshed at most once per
//! interval. A join or leave notice refreshes that group right away.

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
    time::Duration,
};

use {
    async_trait::async_trait,
    botlink_common::fs::{read_optional, write_atomic},
    botlink_protocol::{Frame, Response, command::get_group_member_list},
    serde_json::Value,
    tokio::time::Instant,
    tracing::{debug, info, warn},
};

use crate::{bundled::group_list, context::HandlerContext, handler::Handler};

pub const NAME: &str = "group-member-list";

const ACTION: &str = "get_group_member_list";
const REQUEST_INTERVAL: Duration = Duration::from_secs(300);
const MEMBER_LIST_DIR: &str = "core/group_member_list";

pub struct GroupMemberList {
    data_dir: PathBuf,
    interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl GroupMemberList {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            interval: REQUEST_INTERVAL,
            last_request: Mutex::new(None),
        }
    }

    fn claim(&self) -> bool {
        let mut last = self.last_request.lock().unwrap_or_else(|e| e.into_inner());
        let due = last.is_none_or(|at| at.elapsed() >= self.interval);
        if due {
            *last = Some(Instant::now());
        }
        due
    }

    async fn save(&self, response: &Response) -> anyhow::Result<()> {
        let token = response.token();
        if !token.matches("action", ACTION) {
            return Ok(());
        }
        let Some(group_id) = token.get("group_id").filter(|g| is_group_id(g)) else {
            return Ok(());
        };
        let count = response.data.as_array().map_or(0, Vec::len);
        if count == 0 {
            warn!(group_id, "empty member list, keeping the cached one");
            return Ok(());
        }
        let path = member_list_path(&self.data_dir, group_id);
        let json = serde_json::to_string_pretty(&response.data)?;
        write_atomic(&path, json.as_bytes()).await?;
        info!(group_id, count, "saved group member list");
        Ok(())
    }
}

#[async_trait]
impl Handler for GroupMemberList {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Caches the member list of every group"
    }

    async fn handle(&self, ctx: &HandlerContext, frame: &Frame) -> anyhow::Result<()> {
        match frame {
            Frame::Response(response) => {
                if response.is_ok() {
                    self.save(response).await?;
                }
                Ok(())
            },
            Frame::Event(event) => {
                let membership = matches!(
                    event.notice_type(),
                    Some("group_increase" | "group_decrease")
                );
                if membership && let Some(group_id) = event.group_id() {
                    debug!(group_id, "membership changed, requesting member list");
                    ctx.send(get_group_member_list(&group_id)).await?;
                }
                if self.claim() {
                    let groups = group_list::group_ids(&ctx.data_dir).await;
                    debug!(groups = groups.len(), "requesting member lists");
                    for group_id in groups {
                        ctx.send(get_group_member_list(&group_id)).await?;
                    }
                }
                Ok(())
            },
        }
    }
}

/// Group ids become file names, so only plain ids are accepted.
fn is_group_id(group_id: &str) -> bool {
    !group_id.is_empty() && group_id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

fn member_list_path(data_dir: &Path, group_id: &str) -> PathBuf {
    data_dir.join(MEMBER_LIST_DIR).join(format!("{group_id}.json"))
}

/// User ids in a group's cached member list; empty when none is cached.
pub async fn member_ids(data_dir: &Path, group_id: &str) -> Vec<String> {
    if !is_group_id(group_id) {
        return Vec::new();
    }
    let Ok(Some(raw)) = read_optional(&member_list_path(data_dir, group_id)).await else {
        return Vec::new();
    };
    let Ok(Value::Array(members)) = serde_json::from_str(&raw) else {
        return Vec::new();
    };
    members
        .iter()
        .filter_map(|member| match member.get("user_id")? {
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::test_support,
        botlink_protocol::TokenContext,
        tempfile::TempDir,
    };

    async fn save_group_list(data_dir: &Path, json: &str) {
        write_atomic(&data_dir.join("core/group_list.json"), json.as_bytes())
            .await
            .unwrap();
    }

    fn heartbeat() -> Frame {
        test_support::frame(r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#)
    }

    fn membership(notice_type: &str, group_id: &str) -> Frame {
        test_support::frame(&format!(
            r#"{{"post_type":"notice","notice_type":"{notice_type}","group_id":{group_id},"user_id":5}}"#
        ))
    }

    fn response(group_id: &str, data: &str) -> Frame {
        let echo = get_group_member_list(group_id).echo.unwrap();
        test_support::frame(&format!(
            r#"{{"status":"ok","retcode":0,"echo":"{echo}","data":{data}}}"#
        ))
    }

    fn requested_groups(sent: &[botlink_protocol::Command]) -> Vec<String> {
        sent.iter()
            .map(|cmd| {
                assert_eq!(cmd.action, ACTION);
                let token = TokenContext::decode(cmd.echo.as_deref().unwrap());
                token.get("group_id").unwrap().to_string()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_every_saved_group_once_per_interval() {
        let tmp = TempDir::new().unwrap();
        save_group_list(tmp.path(), r#"[{"group_id":777},{"group_id":"888"}]"#).await;
        let (ctx, outbound) = test_support::context(tmp.path());
        let handler = GroupMemberList::new(tmp.path());

        handler.handle(&ctx, &heartbeat()).await.unwrap();
        handler.handle(&ctx, &heartbeat()).await.unwrap();
        assert_eq!(requested_groups(&outbound.take().await), ["777", "888"]);

        tokio::time::advance(Duration::from_secs(301)).await;
        handler.handle(&ctx, &heartbeat()).await.unwrap();
        assert_eq!(requested_groups(&outbound.take().await), ["777", "888"]);
    }

    #[tokio::test(start_paused = true)]
    async fn membership_notice_refreshes_that_group() {
        let tmp = TempDir::new().unwrap();
        let (ctx, outbound) = test_support::context(tmp.path());
        let handler = GroupMemberList::new(tmp.path());
        handler.handle(&ctx, &heartbeat()).await.unwrap();
        assert!(outbound.take().await.is_empty());

        handler.handle(&ctx, &membership("group_increase", "777")).await.unwrap();
        handler.handle(&ctx, &membership("group_decrease", "888")).await.unwrap();
        handler.handle(&ctx, &membership("group_ban", "999")).await.unwrap();

        assert_eq!(requested_groups(&outbound.take().await), ["777", "888"]);
    }

    #[tokio::test]
    async fn ok_response_is_cached_per_group() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let handler = GroupMemberList::new(tmp.path());

        handler
            .handle(&ctx, &response("777", r#"[{"user_id":1},{"user_id":"2"}]"#))
            .await
            .unwrap();
        handler
            .handle(&ctx, &response("888", r#"[{"user_id":3}]"#))
            .await
            .unwrap();

        assert_eq!(member_ids(tmp.path(), "777").await, ["1", "2"]);
        assert_eq!(member_ids(tmp.path(), "888").await, ["3"]);
        assert!(member_ids(tmp.path(), "999").await.is_empty());
    }

    #[tokio::test]
    async fn empty_list_keeps_the_cached_one() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let handler = GroupMemberList::new(tmp.path());

        handler
            .handle(&ctx, &response("777", r#"[{"user_id":1}]"#))
            .await
            .unwrap();
        handler.handle(&ctx, &response("777", "[]")).await.unwrap();

        assert_eq!(member_ids(tmp.path(), "777").await, ["1"]);
    }

    #[tokio::test]
    async fn foreign_responses_are_ignored() {
        let tmp = TempDir::new().unwrap();
        let (ctx, _) = test_support::context(tmp.path());
        let handler = GroupMemberList::new(tmp.path());
        let frame = test_support::frame(
            r#"{"status":"ok","retcode":0,"echo":"get_group_list","data":[{"user_id":1}]}"#,
        );

        handler.handle(&ctx, &frame).await.unwrap();
        let escaped = test_support::frame(
            r#"{"status":"ok","echo":"action=get_group_member_list&group_id=..%2Fx","data":[{"user_id":1}]}"#,
        );
        handler.handle(&ctx, &escaped).await.unwrap();

        assert!(!tmp.path().join(MEMBER_LIST_DIR).exists());
    }
}
