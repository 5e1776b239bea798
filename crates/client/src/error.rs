//! Client-side error taxonomy.

use anochat_shared::CriteriaError;
use thiserror::Error;

/// Errors surfaced by the session controller and the socket layer.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A command was attempted while the socket is not connected. Commands
    /// are never queued across outages.
    #[error("not connected to the realtime server")]
    NotConnected,

    /// The connect budget was exhausted without a completed handshake.
    #[error("connection failed after {attempts} attempts")]
    ConnectFailed { attempts: u32 },

    /// The connection was torn down while a connect attempt was in flight.
    #[error("connect attempt cancelled")]
    ConnectCancelled,

    /// The server rejected the session token during the handshake.
    #[error("unauthorized: the session token was rejected")]
    Unauthorized,

    #[error(transparent)]
    Criteria(#[from] CriteriaError),

    /// A chat command was issued with no active chat session.
    #[error("no active chat")]
    NoActiveChat,

    /// Message content was empty or whitespace-only.
    #[error("message content is empty")]
    EmptyMessage,

    /// Chat rating outside the accepted 1-5 range.
    #[error("rating {0} is out of range (1-5)")]
    RatingOutOfRange(u8),
}
