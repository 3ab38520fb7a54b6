//! HTTP gateway and event router for Blindchat.
//!
//! The router drains the transport's inbound channel into the pairing
//! engine; the HTTP server exposes `/health` and accepts webhook updates.

pub mod router;
pub mod server;
pub mod state;

#[cfg(feature = "metrics")]
pub mod metrics;

pub use router::{dispatch, handle_event, start_router};
pub use server::{build_router, start_gateway};
pub use state::GatewayState;
