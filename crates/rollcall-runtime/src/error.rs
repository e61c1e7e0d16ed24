//! Error types for the runtime.

use rollcall_token::TokenError;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the history and session stores.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history store unavailable: {0}")]
    Unavailable(String),

    #[error("history store lock poisoned")]
    LockPoisoned,
}

/// Errors raised while handling random presence checks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    /// No open challenge with this id for this user. Covers answered, timed out and cancelled ones.
    #[error("challenge {0} is not open")]
    NotOpen(Uuid),

    /// The notifier could not reach the user.
    #[error("challenge delivery failed: {0}")]
    Delivery(String),

    #[error("session {0} not found")]
    SessionNotFound(String),
}

/// Errors returned by engine operations other than claim submission.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("session {0} not found")]
    SessionNotFound(String),

    #[error("no attendance record for user {user_id} in session {session_id}")]
    RecordNotFound { user_id: String, session_id: String },

    #[error("attendance record already reviewed")]
    AlreadyReviewed,

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    Challenge(#[from] ChallengeError),
}
