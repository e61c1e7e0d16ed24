//! Rollcall runtime
//!
//! The [`AttendanceEngine`] is the boundary of the system: sessions are started and ended through
//! it, claims are submitted to it, and reviewers resolve records through it. Underneath it:
//!
//! - [`store`]: the attendance history and session stores, with in-memory backends
//! - [`scheduler`]: random presence checks for admitted users
//!
//! Transport is not part of this crate; an HTTP or RPC layer calls the engine directly.

pub mod engine;
pub mod error;
pub mod scheduler;
pub mod store;

pub use engine::{AnomalyReport, AttendanceEngine, ClaimOutcome, EngineBuilder, RiskView};
pub use error::{ChallengeError, EngineError, HistoryError};
pub use scheduler::{Challenge, ChallengeNotifier, ChallengeResponse, ChallengeScheduler, LogNotifier};
pub use store::{
    AttendanceStore, MemoryAttendanceStore, MemorySessionStore, RecordQuery, RecordUpdate, ReplaceGuard,
    SessionStore, UpdateOutcome, WriteOutcome,
};
