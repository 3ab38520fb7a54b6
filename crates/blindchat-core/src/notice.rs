//! User-facing notices sent by the engine and the dispatch layer.

use serde::{Deserialize, Serialize};

use crate::session::SessionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", content = "state", rename_all = "snake_case")]
pub enum Notice {
    Welcome,
    Help,
    Waiting,
    Connected,
    AlreadyConnected,
    NothingToStop,
    ChatEnded,
    PartnerLeft,
    SearchCancelled,
    NotWaiting,
    NotConnected,
    PartnerUnavailable,
    Status(SessionState),
    SomethingWentWrong,
}

impl Notice {
    pub fn text(&self) -> &'static str {
        match self {
            Notice::Welcome => {
                "👋 Welcome to Blindchat! Talk anonymously with a random stranger. \
                 Tap Connect or send /connect to begin, /help lists every command."
            }
            Notice::Help => {
                "How it works:\n\
                 /connect - find a random partner\n\
                 /next - leave this chat and find someone new\n\
                 /stop - end the current chat\n\
                 /cancel - stop searching\n\
                 /status - show where you are\n\n\
                 Everything you send while connected (text, photos, stickers, \
                 voice, video, files) goes straight to your partner."
            }
            Notice::Waiting => "🔎 Looking for a partner... you'll be connected as soon as someone joins.",
            Notice::Connected => "✅ You're connected! Say hi. Send /stop to end the chat.",
            Notice::AlreadyConnected => "You're already in a chat. Send /stop to end it or /next to switch.",
            Notice::NothingToStop => "You're not in a chat. Send /connect to find someone.",
            Notice::ChatEnded => "Chat ended. Send /connect to find someone new.",
            Notice::PartnerLeft => "Your partner left the chat. Send /connect to find someone new.",
            Notice::SearchCancelled => "Search cancelled.",
            Notice::NotWaiting => "You're not searching right now.",
            Notice::NotConnected => "You're not connected to anyone. Send /connect first.",
            Notice::PartnerUnavailable => "Your partner is no longer available. Send /connect to find someone new.",
            Notice::Status(SessionState::Connected) => "💬 You're currently chatting with someone.",
            Notice::Status(SessionState::Waiting) => "⏳ You're in the waiting list.",
            Notice::Status(SessionState::Idle) => "You're not connected. Send /connect to start.",
            Notice::SomethingWentWrong => "Something went wrong. Please try again.",
        }
    }

    /// Whether the transport should attach the Connect/Status keyboard.
    pub fn wants_keyboard(&self) -> bool {
        matches!(self, Notice::Welcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_texts_differ() {
        let connected = Notice::Status(SessionState::Connected).text();
        let waiting = Notice::Status(SessionState::Waiting).text();
        let idle = Notice::Status(SessionState::Idle).text();
        assert_ne!(connected, waiting);
        assert_ne!(waiting, idle);
    }

    #[test]
    fn test_only_welcome_has_keyboard() {
        assert!(Notice::Welcome.wants_keyboard());
        assert!(!Notice::Help.wants_keyboard());
        assert!(!Notice::Connected.wants_keyboard());
    }

    #[test]
    fn test_notice_serialization() {
        let json = serde_json::to_value(Notice::Status(SessionState::Waiting)).unwrap();
        assert_eq!(json["notice"], "status");
        assert_eq!(json["state"], "waiting");
    }
}
