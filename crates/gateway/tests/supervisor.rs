#![allow(clippy::unwrap_used, clippy::expect_used)]
//! End-to-end runs against an in-process WebSocket server.

use std::{path::Path, sync::Arc, time::Duration};

use {
    botlink_config::BotConfig,
    botlink_gateway::Gateway,
    botlink_plugins::bundled,
    botlink_protocol::command::delete_msg,
    botlink_scheduler::{DeferredAction, DeferredStore, FileStore},
    futures::{SinkExt, StreamExt},
    secrecy::Secret,
    serde_json::{Value, json},
    tempfile::TempDir,
    tokio::{
        net::{TcpListener, TcpStream},
        time::timeout,
    },
    tokio_tungstenite::{
        WebSocketStream, accept_async, accept_hdr_async,
        tungstenite::{
            Message,
            handshake::server::{ErrorResponse, Request, Response},
            http::header::AUTHORIZATION,
        },
    },
};

const OWNER: &str = "10000";

fn config(addr: std::net::SocketAddr, data_dir: &Path) -> Arc<BotConfig> {
    let mut config = BotConfig::default();
    config.gateway.url = format!("ws://{addr}");
    config.gateway.access_token = Some(Secret::new("s3cret".to_string()));
    config.gateway.reconnect_delay_ms = 50;
    config.gateway.handshake_timeout_ms = 500;
    config.owner.user_id = Some(OWNER.to_string());
    config.storage.data_dir = data_dir.to_path_buf();
    config.plugins.dir = data_dir.join("plugins");
    Arc::new(config)
}

/// Read text frames until one matches.
async fn wait_for(
    ws: &mut WebSocketStream<TcpStream>,
    mut pred: impl FnMut(&Value) -> bool,
) -> Value {
    timeout(Duration::from_secs(5), async {
        loop {
            let msg = ws.next().await.expect("stream ended").expect("ws error");
            if let Message::Text(text) = msg {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                if pred(&value) {
                    return value;
                }
            }
        }
    })
    .await
    .expect("timed out waiting for frame")
}

fn is_owner_report(value: &Value) -> bool {
    value["action"] == "send_private_msg"
        && value["params"]["user_id"] == json!(10000)
        && value["params"]["message"][0]["data"]["text"]
            .as_str()
            .is_some_and(|t| t.contains("Loaded"))
}

#[tokio::test]
async fn authenticates_reports_and_dispatches() {
    let tmp = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config(listener.local_addr().unwrap(), tmp.path());
    let gateway = Gateway::build(config, bundled::catalog());
    let run = tokio::spawn(gateway.run());

    let (stream, _) = listener.accept().await.unwrap();
    let mut auth = None;
    let capture = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        auth = req
            .headers()
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_string());
        Ok(resp)
    };
    let mut ws = accept_hdr_async(stream, capture).await.unwrap();
    assert_eq!(auth.as_deref(), Some("Bearer s3cret"));

    let report = wait_for(&mut ws, is_owner_report).await;
    let text = report["params"]["message"][0]["data"]["text"].as_str().unwrap();
    assert!(text.contains("switch-query"));

    // Garbage is skipped without dropping the connection.
    ws.send(Message::Text("not json".into())).await.unwrap();
    let event = json!({
        "post_type": "message",
        "message_type": "group",
        "group_id": 123456,
        "user_id": 10000,
        "message_id": 9,
        "raw_message": "switch",
        "sender": {"role": "member"},
    });
    ws.send(Message::Text(event.to_string().into())).await.unwrap();

    let reply = wait_for(&mut ws, |v| v["action"] == "send_group_msg").await;
    assert_eq!(reply["params"]["group_id"], json!(123456));
    assert!(reply["echo"].as_str().unwrap().contains("del_msg=30"));

    let mut menu = event.clone();
    menu["raw_message"] = json!("menu");
    ws.send(Message::Text(menu.to_string().into())).await.unwrap();
    let listing = wait_for(&mut ws, |v| {
        v["action"] == "send_group_msg"
            && v["params"]["message"][1]["data"]["text"]
                .as_str()
                .is_some_and(|t| t.starts_with("Menu"))
    })
    .await;
    let text = listing["params"]["message"][1]["data"]["text"].as_str().unwrap();
    assert!(text.contains("[group-member-list]"));

    run.abort();
}

#[tokio::test]
async fn recovers_overdue_actions_and_reconnects() {
    let tmp = TempDir::new().unwrap();
    FileStore::in_data_dir(tmp.path())
        .save(&DeferredAction {
            id: "retract-77".to_string(),
            deadline_ms: 1,
            command: delete_msg("77"),
        })
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = config(listener.local_addr().unwrap(), tmp.path());
    let gateway = Gateway::build(config, bundled::catalog());
    let scheduler = gateway.scheduler();
    let run = tokio::spawn(gateway.run());

    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    let retract = wait_for(&mut ws, |v| v["action"] == "delete_msg").await;
    assert_eq!(retract["params"]["message_id"], json!(77));

    // The record is gone once executed.
    timeout(Duration::from_secs(5), async {
        while !scheduler.list().await.unwrap().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    drop(ws);

    // The supervisor comes back after its delay and reports again, without
    // repeating the executed action.
    let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut ws = accept_async(stream).await.unwrap();
    wait_for(&mut ws, is_owner_report).await;
    let repeat = timeout(Duration::from_millis(300), async {
        wait_for(&mut ws, |v| v["action"] == "delete_msg").await
    })
    .await;
    assert!(repeat.is_err());

    run.abort();
}

#[tokio::test]
async fn stalled_handshake_is_retried() {
    let tmp = TempDir::new().unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let mut config = (*config(listener.local_addr().unwrap(), tmp.path())).clone();
    config.gateway.handshake_timeout_ms = 100;
    let gateway = Gateway::build(Arc::new(config), bundled::catalog());
    let run = tokio::spawn(gateway.run());

    // Accept but never answer the upgrade.
    let mut held = Vec::new();
    for _ in 0..2 {
        let (stream, _) = timeout(Duration::from_secs(5), listener.accept())
            .await
            .unwrap()
            .unwrap();
        held.push(stream);
    }
    assert_eq!(held.len(), 2);

    run.abort();
}
