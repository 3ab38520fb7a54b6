//! Transport abstraction and built-in transport implementations.
//!
//! A transport connects the pairing engine to one messaging platform. It
//! delivers outbound messages (the core's [`Deliver`] capability) and feeds
//! inbound events into an [`InboundSender`]. Transports are feature-gated.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use blindchat_core::deliver::Deliver;
use blindchat_core::types::InboundEvent;

#[cfg(feature = "telegram")]
pub mod telegram;

/// Transport metadata for status output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportMeta {
    pub label: String,
    pub description: String,
    pub docs_url: Option<String>,
}

/// Transport health status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportStatus {
    pub connected: bool,
    pub account: Option<String>,
    pub error: Option<String>,
}

/// Handle to stop a running transport.
pub struct TransportHandle {
    shutdown_tx: tokio::sync::oneshot::Sender<()>,
}

impl TransportHandle {
    pub fn new(shutdown_tx: tokio::sync::oneshot::Sender<()>) -> Self {
        Self { shutdown_tx }
    }

    pub fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
    }
}

/// Receiver for inbound events from a transport.
pub type InboundReceiver = mpsc::UnboundedReceiver<InboundEvent>;

/// Sender for inbound events (used by transports and the webhook endpoint).
pub type InboundSender = mpsc::UnboundedSender<InboundEvent>;

/// The core transport trait.
#[async_trait]
pub trait Transport: Deliver {
    /// Unique transport identifier (e.g. "telegram").
    fn id(&self) -> &str;

    fn meta(&self) -> TransportMeta;

    /// One-time bootstrap with the platform (command menu, webhook).
    /// Failing here is fatal for the process.
    async fn register(&self) -> anyhow::Result<()>;

    /// Start receiving updates. Push-based transports only keep the sender
    /// around; updates then arrive through [`Transport::parse_webhook`].
    async fn start(&self, inbound: InboundSender) -> anyhow::Result<TransportHandle>;

    /// Turn a webhook request body into an event, if it carries one.
    fn parse_webhook(&self, body: &serde_json::Value) -> Option<InboundEvent>;

    /// Secret the webhook caller must present, if configured.
    fn webhook_secret(&self) -> Option<&str>;

    /// Acknowledge an interactive callback (button press).
    async fn acknowledge(&self, query_id: &str) -> anyhow::Result<()>;

    async fn status(&self) -> TransportStatus;
}
