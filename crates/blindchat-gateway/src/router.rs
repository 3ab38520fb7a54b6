//! Routes inbound transport events to pairing-engine operations.
//!
//! Events are spread over a fixed set of workers keyed by participant, so one
//! participant's events are handled strictly in arrival order while different
//! participants proceed in parallel. Errors the requester can act on become
//! notices; delivery failures are only logged because the peer may simply be
//! unreachable.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use blindchat_channels::InboundReceiver;
use blindchat_core::error::PairingError;
use blindchat_core::notice::Notice;
use blindchat_core::types::{
    CallbackAction, Command, InboundEvent, InboundKind, Outbound, ParticipantId,
};

use crate::state::GatewayState;

/// Number of router workers. A participant always lands on the same one.
pub const ROUTER_WORKERS: usize = 16;

fn worker_for(id: ParticipantId) -> usize {
    id.0.rem_euclid(ROUTER_WORKERS as i64) as usize
}

/// Start routing events from the inbound receiver until every sender is gone.
pub fn start_router(state: Arc<GatewayState>, mut rx: InboundReceiver) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let transport = state.transport.id().to_string();
        info!(transport = %transport, workers = ROUTER_WORKERS, "Event router started");

        let mut queues = Vec::with_capacity(ROUTER_WORKERS);
        let mut workers = Vec::with_capacity(ROUTER_WORKERS);
        for _ in 0..ROUTER_WORKERS {
            let (tx, mut worker_rx) = mpsc::unbounded_channel::<InboundEvent>();
            let state = state.clone();
            workers.push(tokio::spawn(async move {
                while let Some(event) = worker_rx.recv().await {
                    handle_event(&state, event).await;
                }
            }));
            queues.push(tx);
        }

        while let Some(event) = rx.recv().await {
            let participant = event.participant;
            if queues[worker_for(participant)].send(event).is_err() {
                warn!(participant = %participant, "Router worker is gone, dropping event");
            }
        }

        // Let the workers drain what is already queued.
        drop(queues);
        for worker in workers {
            let _ = worker.await;
        }

        info!(transport = %transport, "Event router stopped");
    })
}

/// Dispatch one event and translate any error into a notice for the sender.
pub async fn handle_event(state: &GatewayState, event: InboundEvent) {
    let participant = event.participant;
    if let Err(e) = dispatch(state, event).await {
        #[cfg(feature = "metrics")]
        crate::metrics::record_error(error_kind(&e));
        report(state, participant, e).await;
    }

    #[cfg(feature = "metrics")]
    crate::metrics::set_pool_size(state.engine.store().waiting_len().await);
}

/// Run the engine operation an event asks for.
pub async fn dispatch(state: &GatewayState, event: InboundEvent) -> Result<(), PairingError> {
    let id = event.participant;
    let command = match event.kind {
        InboundKind::Command { command } => command,
        InboundKind::Callback { action, query_id } => {
            if let Err(e) = state.transport.acknowledge(&query_id).await {
                warn!(participant = %id, %e, "Failed to acknowledge callback");
            }
            match action {
                CallbackAction::Connect => Command::Connect,
                CallbackAction::Status => Command::Status,
            }
        }
        InboundKind::Message { payload } => {
            let kind = payload.kind_label();
            state.engine.relay(id, payload).await?;
            debug!(participant = %id, kind, "Relayed message");
            #[cfg(feature = "metrics")]
            crate::metrics::record_relay(kind);
            return Ok(());
        }
    };

    debug!(participant = %id, command = command.name(), "Dispatching command");
    match command {
        Command::Start => notify(state, id, Notice::Welcome).await,
        Command::Help => notify(state, id, Notice::Help).await,
        Command::Status => {
            let session_state = state.engine.status(id).await;
            notify(state, id, Notice::Status(session_state)).await
        }
        Command::Connect => {
            let _outcome = state.engine.connect(id).await?;
            #[cfg(feature = "metrics")]
            crate::metrics::record_connect(&_outcome);
            Ok(())
        }
        Command::Next => {
            let _outcome = state.engine.next(id).await?;
            #[cfg(feature = "metrics")]
            crate::metrics::record_connect(&_outcome.connect);
            Ok(())
        }
        Command::Stop => state.engine.stop(id).await.map(|_| ()),
        Command::Cancel => state.engine.cancel(id).await.map(|_| ()),
    }
}

async fn notify(state: &GatewayState, id: ParticipantId, notice: Notice) -> Result<(), PairingError> {
    state
        .transport
        .deliver(id, Outbound::Notice(notice))
        .await
        .map_err(|source| PairingError::DeliveryFailed {
            participant: id,
            source,
        })
}

async fn report(state: &GatewayState, requester: ParticipantId, error: PairingError) {
    let notice = match &error {
        PairingError::NotConnected(_) => Notice::NotConnected,
        PairingError::PartnerUnavailable(_) => Notice::PartnerUnavailable,
        PairingError::DeliveryFailed { participant, source } => {
            warn!(requester = %requester, participant = %participant, error = %source, "Delivery failed");
            return;
        }
    };

    debug!(participant = %requester, %error, "Reporting error to participant");
    if let Err(e) = notify(state, requester, notice).await {
        warn!(participant = %requester, %e, "Failed to report error");
    }
}

#[cfg(feature = "metrics")]
fn error_kind(error: &PairingError) -> &'static str {
    match error {
        PairingError::NotConnected(_) => "not_connected",
        PairingError::PartnerUnavailable(_) => "partner_unavailable",
        PairingError::DeliveryFailed { .. } => "delivery_failed",
    }
}
