//! Telegram transport against a fake Bot API served by axum.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::Path, extract::State, routing::post};
use serde_json::{Value, json};

use blindchat_channels::Transport;
use blindchat_channels::telegram::TelegramTransport;
use blindchat_core::config::TelegramConfig;
use blindchat_core::deliver::Deliver;
use blindchat_core::notice::Notice;
use blindchat_core::types::{Command, InboundKind, MediaKind, Outbound, ParticipantId, Payload};

#[derive(Default)]
struct FakeBotApi {
    calls: Mutex<Vec<(String, Value)>>,
    updates_served: Mutex<bool>,
}

impl FakeBotApi {
    fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

async fn handle(
    State(api): State<Arc<FakeBotApi>>,
    Path((_token, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    api.calls.lock().unwrap().push((method.clone(), body.clone()));

    let response = match method.as_str() {
        "getMe" => json!({ "ok": true, "result": { "id": 1, "username": "blind_bot" } }),
        "getUpdates" => {
            let first = !std::mem::replace(&mut *api.updates_served.lock().unwrap(), true);
            let updates = if first {
                json!([{ "update_id": 41, "message": { "chat": { "id": 7 }, "text": "/connect" } }])
            } else {
                tokio::time::sleep(Duration::from_millis(50)).await;
                json!([])
            };
            json!({ "ok": true, "result": updates })
        }
        "sendMessage" if body["chat_id"] == 666 => json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }),
        _ => json!({ "ok": true, "result": true }),
    };
    Json(response)
}

async fn start_fake_api() -> (Arc<FakeBotApi>, String) {
    let api = Arc::new(FakeBotApi::default());
    let app = Router::new()
        .route("/{token}/{method}", post(handle))
        .with_state(api.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    (api, format!("http://{addr}"))
}

fn transport(api_url: &str, extra: Value) -> TelegramTransport {
    let mut config = json!({ "bot_token": "123:abc", "api_url": api_url, "poll_timeout_secs": 1 });
    if let (Some(config), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
        config.extend(extra.clone());
    }
    let config: TelegramConfig = serde_json::from_value(config).unwrap();
    TelegramTransport::from_config(&config).unwrap()
}

#[tokio::test]
async fn test_deliver_notice_and_media() {
    let (api, url) = start_fake_api().await;
    let transport = transport(&url, json!({}));

    transport
        .deliver(ParticipantId(5), Outbound::Notice(Notice::Welcome))
        .await
        .unwrap();
    transport
        .deliver(
            ParticipantId(5),
            Outbound::Content(Payload::Media {
                kind: MediaKind::Photo,
                file_id: "AgAD".into(),
                caption: Some("sunset".into()),
            }),
        )
        .await
        .unwrap();

    let messages = api.calls_to("sendMessage");
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["chat_id"], 5);
    assert!(messages[0]["reply_markup"]["inline_keyboard"].is_array());

    let photos = api.calls_to("sendPhoto");
    assert_eq!(photos[0]["photo"], "AgAD");
    assert_eq!(photos[0]["caption"], "sunset");
}

#[tokio::test]
async fn test_deliver_reports_api_failure() {
    let (_api, url) = start_fake_api().await;
    let transport = transport(&url, json!({}));

    let err = transport
        .deliver(ParticipantId(666), Outbound::Content(Payload::text("hello")))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("blocked"));
}

#[tokio::test]
async fn test_register_polling_mode() {
    let (api, url) = start_fake_api().await;
    let transport = transport(&url, json!({}));

    transport.register().await.unwrap();

    let commands = api.calls_to("setMyCommands");
    assert_eq!(commands.len(), 1);
    assert_eq!(commands[0]["commands"].as_array().unwrap().len(), Command::MENU.len());
    assert_eq!(api.calls_to("deleteWebhook").len(), 1);
    assert!(api.calls_to("setWebhook").is_empty());
}

#[tokio::test]
async fn test_register_webhook_mode_sends_secret() {
    let (api, url) = start_fake_api().await;
    let transport = transport(
        &url,
        json!({
            "mode": "webhook",
            "webhook_url": "https://bot.example.com/webhook",
            "secret_token": "s3cret",
            "register_commands": false
        }),
    );

    transport.register().await.unwrap();

    assert!(api.calls_to("setMyCommands").is_empty());
    let hooks = api.calls_to("setWebhook");
    assert_eq!(hooks[0]["url"], "https://bot.example.com/webhook");
    assert_eq!(hooks[0]["secret_token"], "s3cret");
    assert_eq!(transport.webhook_secret(), Some("s3cret"));
}

#[tokio::test]
async fn test_polling_feeds_inbound_and_advances_offset() {
    let (api, url) = start_fake_api().await;
    let transport = transport(&url, json!({}));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = transport.start(tx).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no update within timeout")
        .expect("channel closed");
    assert_eq!(event.participant, ParticipantId(7));
    assert_eq!(event.kind, InboundKind::Command { command: Command::Connect });

    // The next poll acknowledges update 41.
    for _ in 0..100 {
        if api.calls_to("getUpdates").iter().any(|b| b["offset"] == 42) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(api.calls_to("getUpdates").iter().any(|b| b["offset"] == 42));

    handle.shutdown();
}

#[tokio::test]
async fn test_status_reports_bot_account() {
    let (_api, url) = start_fake_api().await;
    let status = transport(&url, json!({})).status().await;
    assert!(status.connected);
    assert_eq!(status.account.as_deref(), Some("blind_bot"));
}

#[tokio::test]
async fn test_shutdown_interrupts_retry_backoff() {
    // Nothing listens on this port, so every getUpdates fails fast.
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let transport = transport(&format!("http://127.0.0.1:{port}"), json!({}));

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let handle = transport.start(tx).await.unwrap();

    // Let the first poll fail and the loop enter its back-off.
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.shutdown();

    // The polling task drops its sender once it stops.
    let closed = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await;
    assert!(matches!(closed, Ok(None)), "polling did not stop promptly");
}
