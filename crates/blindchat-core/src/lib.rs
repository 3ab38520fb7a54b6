//! Core types, config, errors, and the pairing engine for Blindchat.
//!
//! The engine owns a single [`store::SessionStore`] that guards both the
//! per-participant sessions and the FIFO [`pool::WaitingPool`]. Transports
//! plug in through the [`deliver::Deliver`] trait.

pub mod config;
pub mod deliver;
pub mod error;
pub mod notice;
pub mod pairing;
pub mod pool;
pub mod session;
pub mod store;
pub mod types;
