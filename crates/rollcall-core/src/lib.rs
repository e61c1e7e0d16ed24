//! # rollcall-core
//!
//! Types and configuration shared by every Rollcall crate.
//!
//! - [`claim`]: the ephemeral inputs a student device submits
//! - [`record`]: the persistent attendance record and per-factor verification snapshot
//! - [`session`]: the class session and its attendance window
//! - [`token`]: presence tokens and their scannable payload
//! - [`config`]: YAML configuration for every component

// Configuration types shared across all Rollcall crates
pub mod config;

pub mod claim;
pub mod record;
pub mod session;
pub mod token;

pub use claim::{AccessPoint, BeaconSighting, FaceSample, GeoLocation, LivenessFrame, VerificationClaim, WirelessScan};
pub use config::{
    CampusConfig, ChallengeConfig, ConfigError, FactorWeights, GeofenceConfig, RiskConfig, RiskPoints,
    RollcallConfig, RoomConfig, ScoringConfig, SessionConfig, TokenConfig,
};
pub use record::{
    AnomalyTag, AttendanceRecord, AttendanceStatus, ChallengeOutcome, Factor, FactorOutcome, FactorState,
    ManualReview, ReviewDecision, VerificationResult,
};
pub use session::{Session, SessionStatus};
pub use token::{PresenceToken, Redemption, TokenPayload};

/// Upper bound of both the verification score and the risk score.
pub const MAX_SCORE: u32 = 100;
