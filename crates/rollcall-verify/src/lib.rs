//! Rollcall claim verification
//!
//! Turns a [`VerificationClaim`](rollcall_core::VerificationClaim) into a scored
//! [`VerificationResult`](rollcall_core::VerificationResult):
//!
//! 1. **Geofence** - accuracy ceiling, haversine distance to the room, floor check
//! 2. **Factors** - pluggable face and liveness evaluators returning a confidence
//! 3. **Wireless** - room WiFi access points and BLE beacons
//! 4. **Aggregator** - window, duplicate and token checks, then weighted scoring
//!
//! Rejections (window closed, already marked, bad token) are never scored. Everything else
//! produces a result, with unavailable evaluators contributing zero points.

pub mod aggregator;
pub mod error;
pub mod factors;
pub mod geofence;
pub mod wireless;

pub use aggregator::{VerificationAggregator, Verdict};
pub use error::{ClaimRejection, EvaluatorError, TokenRejection};
pub use factors::{
    FaceEvaluator, FactorScore, LivenessEvaluator, NoEvaluator, StaticFaceEvaluator, StaticLivenessEvaluator,
};
pub use geofence::{CampusCheck, Geofence, GeofenceCheck, GeofenceReason, NearestRoom, RoomRegistry};
pub use wireless::{WirelessCheck, WirelessEvaluator};
