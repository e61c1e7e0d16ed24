//! Error types for the token crate.

use thiserror::Error;

/// Errors raised by a token store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend could not be reached.
    #[error("token store unavailable: {0}")]
    Unavailable(String),

    /// The key holds a value of a different kind.
    #[error("wrong value type at key {key}")]
    WrongType { key: String },

    /// An internal lock was poisoned.
    #[error("token store lock poisoned")]
    LockPoisoned,
}

/// Errors that can occur during presence token operations.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The scanned payload could not be parsed.
    #[error("invalid token format: {0}")]
    InvalidFormat(String),

    /// The token is unknown to the store or past its validity window.
    #[error("token expired or unknown")]
    Expired,

    /// The token belongs to another session.
    #[error("token issued for session {found}, claimed for {expected}")]
    SessionMismatch { expected: String, found: String },

    /// The token store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// A stored record could not be (de)serialized.
    #[error("token serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TokenError {
    /// Whether the failure comes from the backing store rather than the token itself.
    pub fn is_store_failure(&self) -> bool {
        matches!(self, TokenError::Store(_))
    }
}
