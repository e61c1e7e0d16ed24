//! Error and rejection types for claim verification.

use serde::Serialize;
use thiserror::Error;

/// Failure of a face or liveness evaluator.
#[derive(Debug, Clone, Error)]
pub enum EvaluatorError {
    /// The model or service behind the evaluator could not answer.
    #[error("evaluator unavailable: {0}")]
    Unavailable(String),

    /// The sample could not be evaluated.
    #[error("invalid sample: {0}")]
    InvalidInput(String),
}

/// Why the scanned token was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenRejection {
    #[error("token is malformed")]
    InvalidFormat,

    #[error("token is expired or unknown")]
    Expired,

    #[error("token belongs to another session")]
    SessionMismatch,
}

/// A claim refused before scoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimRejection {
    #[error("session not found")]
    SessionNotFound,

    #[error("attendance window is closed")]
    WindowClosed,

    #[error("attendance already marked")]
    AlreadyMarked,

    /// A reviewer already resolved the record.
    #[error("attendance record already reviewed")]
    RecordFinalized,

    #[error(transparent)]
    Token(#[from] TokenRejection),
}
