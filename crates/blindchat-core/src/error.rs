use thiserror::Error;

use crate::types::ParticipantId;

#[derive(Debug, Error)]
pub enum BlindchatError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, BlindchatError>;

/// Errors returned by pairing operations to the dispatch layer.
#[derive(Debug, Error)]
pub enum PairingError {
    #[error("participant {0} is not in a chat")]
    NotConnected(ParticipantId),

    #[error("partner of participant {0} is no longer available")]
    PartnerUnavailable(ParticipantId),

    /// The state transition was committed; only the notification failed.
    #[error("delivery to participant {participant} failed: {source}")]
    DeliveryFailed {
        participant: ParticipantId,
        #[source]
        source: anyhow::Error,
    },
}

/// Waiting pool errors. Never surfaced to participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PoolError {
    #[error("waiting pool is empty")]
    Empty,

    #[error("participant {0} is already waiting")]
    AlreadyQueued(ParticipantId),
}
