//! Realtime socket layer: connection management and typed event fan-out.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐     frames      ┌───────────────┐
//! │ SocketConnection │ ──────────────► │   EventBus    │
//! │ (owns the socket,│                 │ (typed fan-out│
//! │  reconnects)     │ ◄── commands ── │  to handlers) │
//! └──────────────────┘   SocketHandle  └───────────────┘
//! ```
//!
//! The connection layer never interprets payloads; it decodes frames into
//! [`anochat_shared::ServerEvent`] values and emits them on the bus. State
//! machines subscribe by [`EventKind`] and write back through a
//! [`SocketHandle`].

mod bus;
mod connection;

pub use bus::{EventBus, EventKind, SocketEvent, Subscription};
pub use connection::{
    ConnectionState, ReconnectConfig, SocketConnection, SocketHandle,
};
