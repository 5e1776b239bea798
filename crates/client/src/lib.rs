//! Realtime session client for the anochat matching service.
//!
//! UI layers own rendering and the Telegram host glue; this crate owns the
//! socket lifecycle, the typed event fan-out and the session state
//! machines. The usual entry point is [`SessionController`].

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod search;
pub mod session;
pub mod storage;
pub mod typing;
pub mod ws;

pub use api::ApiClient;
pub use chat::{ChatMessage, ChatSession, ChatState};
pub use config::ClientConfig;
pub use error::ClientError;
pub use search::{normalize_criteria, SearchPhase, SearchState};
pub use session::{LocalUser, SessionController, SessionSnapshot};
pub use typing::TypingTimer;
pub use ws::{
    ConnectionState, EventBus, EventKind, ReconnectConfig, SocketConnection, SocketEvent,
    SocketHandle, Subscription,
};

/// Lock a mutex, recovering the guard if a panicking handler poisoned it.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
