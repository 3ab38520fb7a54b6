//! Telegram transport over the Bot HTTP API (no SDK dependency).
//!
//! Updates arrive either by long polling `getUpdates` or through the
//! gateway's webhook endpoint. Media is relayed by `file_id`, so nothing is
//! ever downloaded.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use blindchat_core::config::{TelegramConfig, UpdateMode};
use blindchat_core::deliver::Deliver;
use blindchat_core::types::{
    CallbackAction, Command, InboundEvent, InboundKind, MediaKind, Outbound, ParticipantId,
    Payload,
};

use crate::{InboundSender, Transport, TransportHandle, TransportMeta, TransportStatus};

const TRANSPORT_ID: &str = "telegram";

/// Pause after a failed `getUpdates` before polling again.
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum TelegramError {
    #[error("Telegram bot token is not configured")]
    MissingToken,

    #[error("Telegram API {method} failed ({code}): {description}")]
    Api {
        method: String,
        code: i64,
        description: String,
    },

    #[error("Telegram HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

// --- Bot API wire types (only the fields the relay needs) ---

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub animation: Option<FileRef>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub voice: Option<FileRef>,
    #[serde(default)]
    pub document: Option<FileRef>,
    #[serde(default)]
    pub video: Option<FileRef>,
    #[serde(default)]
    pub sticker: Option<FileRef>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FileRef {
    pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Map an update to an inbound event. Unsupported updates yield `None`.
pub fn parse_update(update: &Update) -> Option<InboundEvent> {
    if let Some(query) = &update.callback_query {
        let action = CallbackAction::parse(query.data.as_deref()?)?;
        let chat_id = query
            .message
            .as_ref()
            .map(|m| m.chat.id)
            .unwrap_or(query.from.id);
        return Some(InboundEvent::new(
            TRANSPORT_ID,
            ParticipantId(chat_id),
            InboundKind::Callback {
                action,
                query_id: query.id.clone(),
            },
        ));
    }

    let message = update.message.as_ref()?;
    let participant = ParticipantId(message.chat.id);
    let kind = match parse_message(message)? {
        Payload::Text { text } => match Command::parse(&text) {
            Some(command) => InboundKind::Command { command },
            None if text.starts_with('/') => return None,
            None => InboundKind::Message {
                payload: Payload::Text { text },
            },
        },
        payload => InboundKind::Message { payload },
    };
    Some(InboundEvent::new(TRANSPORT_ID, participant, kind))
}

fn parse_message(message: &Message) -> Option<Payload> {
    if let Some(text) = &message.text {
        return Some(Payload::text(text.clone()));
    }

    let media = |kind, file: &FileRef| Payload::Media {
        kind,
        file_id: file.file_id.clone(),
        caption: message.caption.clone(),
    };

    // Animations also carry a `document`, so they are checked first.
    if let Some(file) = &message.animation {
        return Some(media(MediaKind::Animation, file));
    }
    if let Some(sizes) = &message.photo {
        let largest = sizes.iter().max_by_key(|s| u64::from(s.width) * u64::from(s.height))?;
        return Some(Payload::Media {
            kind: MediaKind::Photo,
            file_id: largest.file_id.clone(),
            caption: message.caption.clone(),
        });
    }
    if let Some(file) = &message.voice {
        return Some(media(MediaKind::Voice, file));
    }
    if let Some(file) = &message.document {
        return Some(media(MediaKind::Document, file));
    }
    if let Some(file) = &message.video {
        return Some(media(MediaKind::Video, file));
    }
    if let Some(file) = &message.sticker {
        return Some(Payload::Media {
            kind: MediaKind::Sticker,
            file_id: file.file_id.clone(),
            caption: None,
        });
    }
    None
}

fn welcome_keyboard() -> serde_json::Value {
    json!({
        "inline_keyboard": [[
            { "text": "🔗 Connect", "callback_data": CallbackAction::Connect.data() },
            { "text": "📊 Status", "callback_data": CallbackAction::Status.data() },
        ]]
    })
}

/// Build the Bot API method and body that deliver `message` to `chat_id`.
pub fn outbound_request(chat_id: i64, message: &Outbound) -> (&'static str, serde_json::Value) {
    match message {
        Outbound::Notice(notice) => {
            let mut body = json!({ "chat_id": chat_id, "text": notice.text() });
            if notice.wants_keyboard() {
                body["reply_markup"] = welcome_keyboard();
            }
            ("sendMessage", body)
        }
        Outbound::Content(Payload::Text { text }) => {
            ("sendMessage", json!({ "chat_id": chat_id, "text": text }))
        }
        Outbound::Content(Payload::Media {
            kind,
            file_id,
            caption,
        }) => {
            let (method, field) = match kind {
                MediaKind::Animation => ("sendAnimation", "animation"),
                MediaKind::Photo => ("sendPhoto", "photo"),
                MediaKind::Voice => ("sendVoice", "voice"),
                MediaKind::Document => ("sendDocument", "document"),
                MediaKind::Video => ("sendVideo", "video"),
                MediaKind::Sticker => ("sendSticker", "sticker"),
            };
            let mut body = json!({ "chat_id": chat_id });
            body[field] = json!(file_id);
            if let Some(caption) = caption.as_ref().filter(|_| *kind != MediaKind::Sticker) {
                body["caption"] = json!(caption);
            }
            (method, body)
        }
    }
}

fn command_menu() -> serde_json::Value {
    let commands: Vec<_> = Command::MENU
        .iter()
        .map(|c| json!({ "command": c.name(), "description": c.description() }))
        .collect();
    json!({ "commands": commands })
}

pub struct TelegramTransport {
    client: reqwest::Client,
    base_url: String,
    mode: UpdateMode,
    webhook_url: Option<String>,
    secret_token: Option<String>,
    poll_timeout: Duration,
    register_commands: bool,
}

impl TelegramTransport {
    pub fn from_config(config: &TelegramConfig) -> Result<Self, TelegramError> {
        let token = config
            .resolve_bot_token()
            .ok_or(TelegramError::MissingToken)?;
        let poll_timeout = Duration::from_secs(config.poll_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(poll_timeout + Duration::from_secs(15))
            .build()?;

        Ok(Self {
            client,
            base_url: format!("{}/bot{}", config.api_url.trim_end_matches('/'), token),
            mode: config.mode,
            webhook_url: config.webhook_url.clone(),
            secret_token: config.resolve_secret_token(),
            poll_timeout,
            register_commands: config.register_commands,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
    ) -> Result<T, TelegramError> {
        call_api(&self.client, &self.base_url, method, body).await
    }
}

async fn call_api<T: DeserializeOwned>(
    client: &reqwest::Client,
    base_url: &str,
    method: &str,
    body: &serde_json::Value,
) -> Result<T, TelegramError> {
    let resp: ApiResponse<T> = client
        .post(format!("{base_url}/{method}"))
        .json(body)
        .send()
        .await?
        .json()
        .await?;

    match resp {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        other => Err(TelegramError::Api {
            method: method.to_string(),
            code: other.error_code.unwrap_or_default(),
            description: other
                .description
                .unwrap_or_else(|| "no result in response".to_string()),
        }),
    }
}

#[async_trait]
impl Deliver for TelegramTransport {
    async fn deliver(&self, to: ParticipantId, message: Outbound) -> anyhow::Result<()> {
        let (method, body) = outbound_request(to.0, &message);
        let _: serde_json::Value = self.call(method, &body).await?;
        debug!(participant = %to, method, "Telegram message sent");
        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    fn id(&self) -> &str {
        TRANSPORT_ID
    }

    fn meta(&self) -> TransportMeta {
        TransportMeta {
            label: "Telegram".into(),
            description: "Telegram Bot API".into(),
            docs_url: Some("https://core.telegram.org/bots/api".into()),
        }
    }

    async fn register(&self) -> anyhow::Result<()> {
        if self.register_commands {
            let _: bool = self.call("setMyCommands", &command_menu()).await?;
            info!(commands = Command::MENU.len(), "Telegram command menu registered");
        }

        match self.mode {
            UpdateMode::Webhook => {
                let url = self
                    .webhook_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("webhook mode requires telegram.webhook_url"))?;
                let mut body = json!({
                    "url": url,
                    "allowed_updates": ["message", "callback_query"],
                });
                if let Some(secret) = &self.secret_token {
                    body["secret_token"] = json!(secret);
                }
                let _: bool = self.call("setWebhook", &body).await?;
                info!(url, "Telegram webhook registered");
            }
            UpdateMode::Polling => {
                // getUpdates is refused while a webhook is set.
                let _: bool = self.call("deleteWebhook", &json!({})).await?;
            }
        }
        Ok(())
    }

    async fn start(&self, inbound: InboundSender) -> anyhow::Result<TransportHandle> {
        let (shutdown_tx, mut shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        if self.mode == UpdateMode::Webhook {
            // Updates are pushed to the gateway; nothing to run here.
            tokio::spawn(async move {
                let _ = shutdown_rx.await;
                drop(inbound);
            });
            return Ok(TransportHandle::new(shutdown_tx));
        }

        let client = self.client.clone();
        let base_url = self.base_url.clone();
        let timeout_secs = self.poll_timeout.as_secs();

        tokio::spawn(async move {
            info!("Telegram channel started, long polling");
            let mut offset: Option<i64> = None;

            loop {
                let mut body = json!({
                    "timeout": timeout_secs,
                    "allowed_updates": ["message", "callback_query"],
                });
                if let Some(offset) = offset {
                    body["offset"] = json!(offset);
                }

                tokio::select! {
                    _ = &mut shutdown_rx => {
                        info!("Telegram channel stopped");
                        break;
                    }
                    result = call_api::<Vec<Update>>(&client, &base_url, "getUpdates", &body) => {
                        match result {
                            Ok(updates) => {
                                for update in &updates {
                                    offset = Some(update.update_id + 1);
                                    let Some(event) = parse_update(update) else {
                                        debug!(update_id = update.update_id, "Ignoring unsupported update");
                                        continue;
                                    };
                                    if inbound.send(event).is_err() {
                                        info!("Inbound receiver dropped, stopping Telegram polling");
                                        return;
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(%e, "Telegram getUpdates failed, retrying");
                                tokio::select! {
                                    _ = &mut shutdown_rx => {
                                        info!("Telegram channel stopped");
                                        break;
                                    }
                                    _ = tokio::time::sleep(RETRY_DELAY) => {}
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok(TransportHandle::new(shutdown_tx))
    }

    fn parse_webhook(&self, body: &serde_json::Value) -> Option<InboundEvent> {
        let update = Update::deserialize(body).ok()?;
        parse_update(&update)
    }

    fn webhook_secret(&self) -> Option<&str> {
        self.secret_token.as_deref()
    }

    async fn acknowledge(&self, query_id: &str) -> anyhow::Result<()> {
        let _: bool = self
            .call("answerCallbackQuery", &json!({ "callback_query_id": query_id }))
            .await?;
        Ok(())
    }

    async fn status(&self) -> TransportStatus {
        match self.call::<User>("getMe", &json!({})).await {
            Ok(me) => TransportStatus {
                connected: true,
                account: me.username.or_else(|| Some(me.id.to_string())),
                error: None,
            },
            Err(e) => TransportStatus {
                connected: false,
                account: None,
                error: Some(e.to_string()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindchat_core::notice::Notice;

    fn update(value: serde_json::Value) -> Update {
        serde_json::from_value(value).unwrap()
    }

    fn message_update(message: serde_json::Value) -> Update {
        let mut message = message;
        message["chat"] = json!({ "id": 4242 });
        update(json!({ "update_id": 1, "message": message }))
    }

    #[test]
    fn test_parse_text_message() {
        let event = parse_update(&message_update(json!({ "text": "hello there" }))).unwrap();
        assert_eq!(event.participant, ParticipantId(4242));
        assert_eq!(event.transport, "telegram");
        assert_eq!(
            event.kind,
            InboundKind::Message {
                payload: Payload::text("hello there")
            }
        );
    }

    #[test]
    fn test_parse_commands() {
        let event = parse_update(&message_update(json!({ "text": "/connect" }))).unwrap();
        assert_eq!(
            event.kind,
            InboundKind::Command {
                command: Command::Connect
            }
        );

        let event = parse_update(&message_update(json!({ "text": "/next@blindchat_bot" }))).unwrap();
        assert_eq!(event.kind, InboundKind::Command { command: Command::Next });

        // Unknown commands are not relayed to the partner.
        assert!(parse_update(&message_update(json!({ "text": "/settings" }))).is_none());
    }

    #[test]
    fn test_parse_every_media_kind() {
        let cases = [
            (json!({ "animation": { "file_id": "anim" }, "document": { "file_id": "doc" } }), MediaKind::Animation, "anim"),
            (json!({ "voice": { "file_id": "v" } }), MediaKind::Voice, "v"),
            (json!({ "document": { "file_id": "d" } }), MediaKind::Document, "d"),
            (json!({ "video": { "file_id": "vid" } }), MediaKind::Video, "vid"),
            (json!({ "sticker": { "file_id": "st" } }), MediaKind::Sticker, "st"),
        ];

        for (message, expected_kind, expected_file) in cases {
            let event = parse_update(&message_update(message)).unwrap();
            match event.kind {
                InboundKind::Message {
                    payload: Payload::Media { kind, file_id, .. },
                } => {
                    assert_eq!(kind, expected_kind);
                    assert_eq!(file_id, expected_file);
                }
                other => panic!("unexpected kind: {other:?}"),
            }
        }
    }

    #[test]
    fn test_parse_photo_takes_largest_size_and_caption() {
        let event = parse_update(&message_update(json!({
            "photo": [
                { "file_id": "small", "width": 90, "height": 90 },
                { "file_id": "large", "width": 1280, "height": 960 },
                { "file_id": "medium", "width": 320, "height": 240 }
            ],
            "caption": "look"
        })))
        .unwrap();

        assert_eq!(
            event.kind,
            InboundKind::Message {
                payload: Payload::Media {
                    kind: MediaKind::Photo,
                    file_id: "large".into(),
                    caption: Some("look".into()),
                }
            }
        );
    }

    #[test]
    fn test_parse_callback_query() {
        let event = parse_update(&update(json!({
            "update_id": 7,
            "callback_query": {
                "id": "cbq-1",
                "from": { "id": 99 },
                "message": { "chat": { "id": 4242 } },
                "data": "connect"
            }
        })))
        .unwrap();

        assert_eq!(event.participant, ParticipantId(4242));
        assert_eq!(
            event.kind,
            InboundKind::Callback {
                action: CallbackAction::Connect,
                query_id: "cbq-1".into()
            }
        );
    }

    #[test]
    fn test_parse_callback_without_message_uses_sender() {
        let event = parse_update(&update(json!({
            "update_id": 8,
            "callback_query": { "id": "cbq-2", "from": { "id": 99 }, "data": "status" }
        })))
        .unwrap();
        assert_eq!(event.participant, ParticipantId(99));
    }

    #[test]
    fn test_parse_ignores_unsupported_updates() {
        assert!(parse_update(&update(json!({ "update_id": 1 }))).is_none());
        assert!(parse_update(&message_update(json!({ "location": { "latitude": 1.0 } }))).is_none());
        assert!(
            parse_update(&update(json!({
                "update_id": 2,
                "callback_query": { "id": "x", "from": { "id": 1 }, "data": "nope" }
            })))
            .is_none()
        );
    }

    #[test]
    fn test_outbound_notice_request() {
        let (method, body) = outbound_request(5, &Outbound::Notice(Notice::Welcome));
        assert_eq!(method, "sendMessage");
        assert_eq!(body["chat_id"], 5);
        assert_eq!(body["text"], Notice::Welcome.text());
        assert_eq!(
            body["reply_markup"]["inline_keyboard"][0][0]["callback_data"],
            "connect"
        );

        let (_, body) = outbound_request(5, &Outbound::Notice(Notice::Waiting));
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn test_outbound_media_requests() {
        let (method, body) = outbound_request(
            5,
            &Outbound::Content(Payload::Media {
                kind: MediaKind::Video,
                file_id: "vid".into(),
                caption: Some("clip".into()),
            }),
        );
        assert_eq!(method, "sendVideo");
        assert_eq!(body["video"], "vid");
        assert_eq!(body["caption"], "clip");

        let (method, body) = outbound_request(
            5,
            &Outbound::Content(Payload::Media {
                kind: MediaKind::Sticker,
                file_id: "st".into(),
                caption: Some("ignored".into()),
            }),
        );
        assert_eq!(method, "sendSticker");
        assert_eq!(body["sticker"], "st");
        assert!(body.get("caption").is_none());
    }

    #[test]
    fn test_command_menu_lists_every_command() {
        let menu = command_menu();
        let commands = menu["commands"].as_array().unwrap();
        assert_eq!(commands.len(), Command::MENU.len());
        assert!(commands.iter().any(|c| c["command"] == "connect"));
    }

    #[test]
    fn test_api_error_response_parse() {
        let resp: ApiResponse<serde_json::Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 403,
            "description": "Forbidden: bot was blocked by the user"
        }))
        .unwrap();
        assert!(!resp.ok);
        assert_eq!(resp.error_code, Some(403));
        assert!(resp.result.is_none());
    }

    #[test]
    fn test_from_config_requires_token() {
        let config: TelegramConfig = serde_json::from_value(json!({})).unwrap();
        assert!(matches!(
            TelegramTransport::from_config(&config),
            Err(TelegramError::MissingToken)
        ));

        let config: TelegramConfig =
            serde_json::from_value(json!({ "bot_token": "123:abc", "api_url": "http://localhost:9/" }))
                .unwrap();
        let transport = TelegramTransport::from_config(&config).unwrap();
        assert_eq!(transport.base_url, "http://localhost:9/bot123:abc");
        assert_eq!(transport.id(), "telegram");
        assert_eq!(transport.meta().label, "Telegram");
        assert!(transport.webhook_secret().is_none());
    }
}
