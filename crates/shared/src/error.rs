//! Shared error types.

use thiserror::Error;

/// Failure talking to the REST API.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("decode error: {0}")]
    Decode(String),
}

impl ApiError {
    /// True when the server rejected the bearer token.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status: 401, .. })
    }
}

/// Search criteria rejected client-side, before any command reaches the
/// wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CriteriaError {
    #[error("own gender must be male or female")]
    OwnGenderAny,
    #[error("age {age} is below the minimum of 18")]
    Underage { age: u8 },
    #[error("age range is inverted: {min} > {max}")]
    InvertedAgeRange { min: u8, max: u8 },
}
