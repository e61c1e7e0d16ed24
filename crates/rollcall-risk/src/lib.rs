//! Rollcall risk engine
//!
//! Scores a user's attendance behavior from 0 to 100. The score is advisory: it never changes
//! whether a claim passed, it only routes records to manual review.
//!
//! ## Heuristics
//!
//! | Tag | Signal | Trigger |
//! |-----|--------|---------|
//! | `EDGE_MARKING` | mean distance from the room center | > 15 m |
//! | `SHORT_DURATION` | mean minutes between entry and exit | < 10 |
//! | `FAILED_RANDOM_CHECKS` | failed share of random checks | > 40% |
//! | `DEVICE_HOPPING` | distinct device fingerprints | > 3 |
//! | `CONSISTENT_TIMING` | spread of the minute of day claims are made | < 2 min |
//! | `BATCH_MARKING` | claimants within 5 m and 60 s of each other | 2 or more |
//! | `REMOTE_MARKING` | share of claims made off campus | > 20% |
//!
//! Batch marking looks at the current session only. Every other heuristic needs
//! `risk.min_samples` prior records.

pub mod engine;
pub mod heuristics;

pub use engine::{RiskAssessment, RiskEngine, RiskSignal};
