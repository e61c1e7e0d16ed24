//! Attendance records and the verification snapshot they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::MAX_SCORE;
use crate::claim::GeoLocation;

/// Status of an attendance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Partial,
    /// Scored below the pass threshold; waiting for a reviewer.
    PendingReview,
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
            AttendanceStatus::Late => "late",
            AttendanceStatus::Partial => "partial",
            AttendanceStatus::PendingReview => "pending_review",
        };
        write!(f, "{}", s)
    }
}

/// Machine-readable anomaly label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnomalyTag {
    EdgeMarking,
    ShortDuration,
    FailedRandomChecks,
    DeviceHopping,
    ConsistentTiming,
    BatchMarking,
    RemoteMarking,
}

impl fmt::Display for AnomalyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AnomalyTag::EdgeMarking => "EDGE_MARKING",
            AnomalyTag::ShortDuration => "SHORT_DURATION",
            AnomalyTag::FailedRandomChecks => "FAILED_RANDOM_CHECKS",
            AnomalyTag::DeviceHopping => "DEVICE_HOPPING",
            AnomalyTag::ConsistentTiming => "CONSISTENT_TIMING",
            AnomalyTag::BatchMarking => "BATCH_MARKING",
            AnomalyTag::RemoteMarking => "REMOTE_MARKING",
        };
        write!(f, "{}", s)
    }
}

/// A verification factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Factor {
    Token,
    Face,
    Liveness,
    Location,
    Wifi,
    Beacon,
}

impl Factor {
    pub const ALL: [Factor; 6] = [
        Factor::Token,
        Factor::Face,
        Factor::Liveness,
        Factor::Location,
        Factor::Wifi,
        Factor::Beacon,
    ];
}

impl fmt::Display for Factor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Factor::Token => "token",
            Factor::Face => "face",
            Factor::Liveness => "liveness",
            Factor::Location => "location",
            Factor::Wifi => "wifi",
            Factor::Beacon => "beacon",
        };
        write!(f, "{}", s)
    }
}

/// How a single factor fared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorState {
    /// The claim did not carry this factor.
    #[default]
    Absent,
    Verified,
    Failed,
    /// The evaluator or its backing store could not answer.
    Unavailable,
}

/// Outcome of one factor.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FactorOutcome {
    pub state: FactorState,
    pub points: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl FactorOutcome {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn verified(points: u32) -> Self {
        Self {
            state: FactorState::Verified,
            points,
            ..Default::default()
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: FactorState::Failed,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            state: FactorState::Unavailable,
            reason: Some(reason.into()),
            ..Default::default()
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn with_distance(mut self, distance_m: Option<f64>) -> Self {
        self.distance_m = distance_m;
        self
    }

    pub fn is_verified(&self) -> bool {
        self.state == FactorState::Verified
    }
}

/// Per-factor outcomes plus the aggregate decision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VerificationResult {
    pub token: FactorOutcome,
    pub face: FactorOutcome,
    pub liveness: FactorOutcome,
    pub location: FactorOutcome,
    pub wifi: FactorOutcome,
    pub beacon: FactorOutcome,
    /// Sum of the points awarded by every factor.
    pub total: u32,
    pub threshold: u32,
    pub passed: bool,
    /// Why the claim did not pass, when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl VerificationResult {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    pub fn factor(&self, factor: Factor) -> &FactorOutcome {
        match factor {
            Factor::Token => &self.token,
            Factor::Face => &self.face,
            Factor::Liveness => &self.liveness,
            Factor::Location => &self.location,
            Factor::Wifi => &self.wifi,
            Factor::Beacon => &self.beacon,
        }
    }

    pub fn set(&mut self, factor: Factor, outcome: FactorOutcome) {
        let slot = match factor {
            Factor::Token => &mut self.token,
            Factor::Face => &mut self.face,
            Factor::Liveness => &mut self.liveness,
            Factor::Location => &mut self.location,
            Factor::Wifi => &mut self.wifi,
            Factor::Beacon => &mut self.beacon,
        };
        *slot = outcome;
        self.total = Factor::ALL.iter().map(|f| self.factor(*f).points).sum();
    }
}

/// One random presence check outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeOutcome {
    pub challenge_id: Uuid,
    pub issued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
    pub passed: bool,
    /// The challenge was delivered but never answered.
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
}

/// Reviewer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

/// Manual review metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualReview {
    pub reviewer: String,
    pub decision: ReviewDecision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub reviewed_at: DateTime<Utc>,
}

/// Persistent attendance record, unique per (user, session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub user_id: String,
    pub session_id: String,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
    pub verification: VerificationResult,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_from_room_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub risk_score: u32,
    #[serde(default)]
    pub anomaly_flags: BTreeSet<AnomalyTag>,
    #[serde(default)]
    pub challenges: Vec<ChallengeOutcome>,
    /// Routed to a reviewer (failed scoring or high risk).
    #[serde(default)]
    pub requires_review: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review: Option<ManualReview>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AttendanceRecord {
    /// Create an empty pending record for a (user, session) pair.
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            status: AttendanceStatus::PendingReview,
            marked_at: now,
            verification: VerificationResult::default(),
            location: None,
            distance_from_room_m: None,
            device_fingerprint: None,
            token: None,
            risk_score: 0,
            anomaly_flags: BTreeSet::new(),
            challenges: Vec::new(),
            requires_review: false,
            review_reason: None,
            review: None,
            entry_time: None,
            exit_time: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_present(&self) -> bool {
        self.status == AttendanceStatus::Present
    }

    /// A reviewer has already resolved this record.
    pub fn is_finalized(&self) -> bool {
        self.review.is_some()
    }

    /// Add a tag and its risk points. Points are only added the first time the tag appears.
    pub fn flag(&mut self, tag: AnomalyTag, points: u32) -> bool {
        let added = self.anomaly_flags.insert(tag);
        if added {
            self.add_risk(points);
        }
        added
    }

    pub fn add_risk(&mut self, points: u32) {
        self.risk_score = (self.risk_score + points).min(MAX_SCORE);
    }

    pub fn passed_challenges(&self) -> usize {
        self.challenges.iter().filter(|c| c.passed).count()
    }

    pub fn failed_challenges(&self) -> usize {
        self.challenges.iter().filter(|c| !c.passed).count()
    }

    /// Minutes between entry and exit, if both are known.
    pub fn duration_minutes(&self) -> Option<f64> {
        match (self.entry_time, self.exit_time) {
            (Some(entry), Some(exit)) => Some((exit - entry).num_milliseconds() as f64 / 60_000.0),
            _ => None,
        }
    }
}
