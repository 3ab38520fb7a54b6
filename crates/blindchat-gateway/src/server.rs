//! Axum HTTP server: health check and the Telegram webhook endpoint.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::state::GatewayState;

/// Header Telegram echoes the configured `secret_token` in.
pub const SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

/// Build the gateway router without binding it.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/webhook", post(webhook_handler));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(state)
}

/// Start the gateway HTTP server and serve until Ctrl+C.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let app = build_router(state);

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    let snapshot = state.engine.snapshot().await;
    let (idle, waiting, connected, pool_size) = (
        snapshot.idle,
        snapshot.waiting,
        snapshot.connected,
        snapshot.pool.len(),
    );
    let consistent = tokio::task::spawn_blocking(move || snapshot.violations().is_empty())
        .await
        .unwrap_or(false);

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "transport": state.transport.id(),
        "mode": state.config.update_mode(),
        "uptime_secs": state.uptime_secs(),
        "sessions": {
            "idle": idle,
            "waiting": waiting,
            "connected": connected,
        },
        "pool_size": pool_size,
        "consistent": consistent,
    }))
}

async fn webhook_handler(
    State(state): State<Arc<GatewayState>>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> StatusCode {
    if let Some(secret) = state.transport.webhook_secret() {
        let presented = headers.get(SECRET_HEADER).and_then(|v| v.to_str().ok());
        if presented != Some(secret) {
            warn!("Webhook request with missing or wrong secret token");
            return StatusCode::UNAUTHORIZED;
        }
    }

    let Some(event) = state.transport.parse_webhook(&body) else {
        debug!("Webhook update carried no supported event");
        return StatusCode::OK;
    };

    if state.inbound.send(event).is_err() {
        warn!("Event router is gone, rejecting webhook update");
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::OK
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.metrics_handle {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            warn!(%e, "Failed to listen for Ctrl+C, serving until killed");
            std::future::pending::<()>().await;
        }
    }
}
