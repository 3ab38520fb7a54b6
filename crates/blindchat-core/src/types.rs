use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notice::Notice;

/// Opaque participant handle assigned by the transport (a Telegram chat id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub i64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ParticipantId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

/// Media kinds the relay forwards by platform file reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Animation,
    Photo,
    Voice,
    Document,
    Video,
    Sticker,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Animation => "animation",
            MediaKind::Photo => "photo",
            MediaKind::Voice => "voice",
            MediaKind::Document => "document",
            MediaKind::Video => "video",
            MediaKind::Sticker => "sticker",
        }
    }
}

/// Relayed content. Opaque to the pairing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        file_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text { text: text.into() }
    }

    /// Short label for logs; never includes the content itself.
    pub fn kind_label(&self) -> &'static str {
        match self {
            Payload::Text { .. } => "text",
            Payload::Media { kind, .. } => kind.as_str(),
        }
    }
}

/// Anything the core asks a transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum Outbound {
    Notice(Notice),
    Content(Payload),
}

/// Bot commands understood by the dispatch layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Start,
    Help,
    Connect,
    Status,
    Next,
    Stop,
    Cancel,
}

impl Command {
    /// Commands advertised to the platform's command menu.
    pub const MENU: [Command; 6] = [
        Command::Connect,
        Command::Next,
        Command::Stop,
        Command::Cancel,
        Command::Status,
        Command::Help,
    ];

    /// Parse a `/command[@bot] [args]` message.
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name);
        match name.to_ascii_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "connect" => Some(Command::Connect),
            "status" => Some(Command::Status),
            "next" => Some(Command::Next),
            "stop" => Some(Command::Stop),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Connect => "connect",
            Command::Status => "status",
            Command::Next => "next",
            Command::Stop => "stop",
            Command::Cancel => "cancel",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Command::Start => "Show the welcome message",
            Command::Help => "How Blindchat works",
            Command::Connect => "Find a random partner",
            Command::Status => "Show your current status",
            Command::Next => "Leave this chat and find someone new",
            Command::Stop => "End the current chat",
            Command::Cancel => "Stop searching for a partner",
        }
    }
}

/// Inline keyboard buttons attached to the welcome notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackAction {
    Connect,
    Status,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        match data.trim() {
            "connect" => Some(CallbackAction::Connect),
            "status" => Some(CallbackAction::Status),
            _ => None,
        }
    }

    pub fn data(&self) -> &'static str {
        match self {
            CallbackAction::Connect => "connect",
            CallbackAction::Status => "status",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundKind {
    Command { command: Command },
    Callback { action: CallbackAction, query_id: String },
    Message { payload: Payload },
}

/// Inbound event from a transport, already reduced to what the core needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub transport: String,
    pub participant: ParticipantId,
    pub kind: InboundKind,
    pub timestamp: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(transport: &str, participant: ParticipantId, kind: InboundKind) -> Self {
        Self {
            transport: transport.to_string(),
            participant,
            kind,
            timestamp: Utc::now(),
        }
    }
}
