//! Gateway shared state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use blindchat_channels::{InboundReceiver, InboundSender, Transport};
use blindchat_core::config::Config;
use blindchat_core::pairing::PairingEngine;

/// Shared state for the router task and HTTP handlers.
pub struct GatewayState {
    pub config: Arc<Config>,
    pub engine: Arc<PairingEngine>,
    pub transport: Arc<dyn Transport>,
    /// Webhook requests and polling both feed this channel.
    pub inbound: InboundSender,
    pub started_at: DateTime<Utc>,
    #[cfg(feature = "metrics")]
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl GatewayState {
    /// Build the state around one transport. The transport doubles as the
    /// engine's deliverer. Returns the receiving end of the inbound channel
    /// for [`crate::router::start_router`].
    pub fn new<T: Transport>(config: Arc<Config>, transport: Arc<T>) -> (Self, InboundReceiver) {
        let (inbound, rx) = mpsc::unbounded_channel();
        let engine = Arc::new(PairingEngine::new(transport.clone()));

        let state = Self {
            config,
            engine,
            transport,
            inbound,
            started_at: Utc::now(),
            #[cfg(feature = "metrics")]
            metrics_handle: None,
        };
        (state, rx)
    }

    #[cfg(feature = "metrics")]
    pub fn with_metrics_handle(
        mut self,
        handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}
