//! Resilient WebSocket connection management.
//!
//! # Architecture
//!
//! - [`ConnectionManager`]: Owns one logical connection and keeps it alive
//! - [`backoff`]: Reconnect delay curve and attempt budget
//! - [`codec`]: Inbound frame decoding and outbound payload encoding
//! - [`Callbacks`]: Lifecycle hooks for open, message, close and error
//! - [`NetworkSignal`]: Host connectivity changes fed into the manager
//!
//! Internally every lifecycle change is an event handled by a pure state machine. Socket tasks,
//! the heartbeat and timers only produce events, so a late event from a superseded socket or a
//! cancelled timer is recognised and dropped.

pub mod backoff;
pub mod callbacks;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
mod heartbeat;
mod machine;
pub mod network;
mod socket;
mod timer;

pub use callbacks::Callbacks;
pub use codec::{Outgoing, Payload};
pub use connection::ConnectionManager;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use machine::{ConnectionStatus, close_code};
pub use network::NetworkSignal;
