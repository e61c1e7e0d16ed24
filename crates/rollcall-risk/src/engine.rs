//! Risk assessment over a user's attendance history.

use rollcall_core::{AnomalyTag, AttendanceRecord, MAX_SCORE, RiskConfig};
use rollcall_verify::Geofence;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

use crate::heuristics;

/// One triggered heuristic.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskSignal {
    pub tag: AnomalyTag,
    pub points: u32,
    /// The value that crossed the threshold.
    pub observed: f64,
    pub threshold: f64,
}

/// Outcome of a risk evaluation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskAssessment {
    /// Sum of triggered points, capped at 100.
    pub score: u32,
    pub tags: BTreeSet<AnomalyTag>,
    pub signals: Vec<RiskSignal>,
    /// Users whose records form a batch with the current one.
    pub batch_peers: Vec<String>,
}

impl RiskAssessment {
    fn push(&mut self, tag: AnomalyTag, points: u32, observed: f64, threshold: f64) {
        self.tags.insert(tag);
        self.signals.push(RiskSignal {
            tag,
            points,
            observed,
            threshold,
        });
        self.score = self
            .signals
            .iter()
            .map(|s| s.points)
            .sum::<u32>()
            .min(MAX_SCORE);
    }

    /// Fold the signals into a record. A tag the record already carries adds no points.
    pub fn apply_to(&self, record: &mut AttendanceRecord) {
        for signal in &self.signals {
            record.flag(signal.tag, signal.points);
        }
    }
}

/// Evaluates the anomaly heuristics.
pub struct RiskEngine {
    config: RiskConfig,
    geofence: Arc<Geofence>,
}

impl RiskEngine {
    pub fn new(config: RiskConfig, geofence: Arc<Geofence>) -> Self {
        Self { config, geofence }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Assess `current` given the user's prior records and the other records of its session.
    ///
    /// `history` must not contain `current`. Pattern heuristics run over the history plus the
    /// current record, and only once the history holds `risk.min_samples` records.
    pub fn evaluate(
        &self,
        current: &AttendanceRecord,
        history: &[AttendanceRecord],
        peers: &[AttendanceRecord],
    ) -> RiskAssessment {
        let mut assessment = RiskAssessment::default();
        let config = &self.config;
        let points = &config.points;

        if history.len() >= config.min_samples {
            let samples: Vec<&AttendanceRecord> = history
                .iter()
                .filter(|r| r.id != current.id)
                .chain(std::iter::once(current))
                .collect();

            if let Some(avg) = heuristics::edge_marking(&samples, config) {
                assessment.push(AnomalyTag::EdgeMarking, points.edge_marking, avg, config.edge_mean_distance_m);
            }
            if let Some(avg) = heuristics::short_duration(&samples, config) {
                assessment.push(
                    AnomalyTag::ShortDuration,
                    points.short_duration,
                    avg,
                    config.short_duration_minutes,
                );
            }
            if let Some(ratio) = heuristics::failed_random_checks(&samples, config) {
                assessment.push(
                    AnomalyTag::FailedRandomChecks,
                    points.failed_random_checks,
                    ratio,
                    config.failed_check_ratio,
                );
            }
            if let Some(devices) = heuristics::device_hopping(&samples, config) {
                assessment.push(
                    AnomalyTag::DeviceHopping,
                    points.device_hopping,
                    devices,
                    config.device_limit as f64,
                );
            }
            if let Some(sd) = heuristics::consistent_timing(&samples, config) {
                assessment.push(
                    AnomalyTag::ConsistentTiming,
                    points.consistent_timing,
                    sd,
                    config.timing_stddev_minutes,
                );
            }
            if let Some(rate) = heuristics::remote_marking(&samples, &self.geofence, config) {
                assessment.push(AnomalyTag::RemoteMarking, points.remote_marking, rate, config.remote_fraction);
            }
        }

        let batch = heuristics::batch_peers(current, peers, config);
        let cluster = batch.len() + 1;
        if cluster >= config.batch_min_cluster {
            assessment.batch_peers = batch.iter().map(|r| r.user_id.clone()).collect();
            assessment.push(
                AnomalyTag::BatchMarking,
                points.batch_marking,
                cluster as f64,
                config.batch_min_cluster as f64,
            );
        }

        debug!(
            user_id = %current.user_id,
            session_id = %current.session_id,
            history = history.len(),
            score = assessment.score,
            "risk evaluated"
        );
        assessment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use rollcall_core::{ChallengeOutcome, GeoLocation, GeofenceConfig};
    use uuid::Uuid;

    const LAT: f64 = 28.6139;
    const LNG: f64 = 77.2090;

    fn engine() -> RiskEngine {
        RiskEngine::new(RiskConfig::default(), Arc::new(Geofence::new(GeofenceConfig::default())))
    }

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, day, hour, minute, 0).unwrap()
    }

    /// An unremarkable record: inside the room, one device, a full class, varied times.
    fn ordinary(day: u32) -> AttendanceRecord {
        let marked = at(day, 8 + day % 4, (day * 7) % 60);
        let mut record = AttendanceRecord::new("u1", format!("s{}", day), marked);
        record.location = Some(GeoLocation::new(LAT, LNG, 5.0));
        record.distance_from_room_m = Some(4.0);
        record.device_fingerprint = Some("phone".into());
        record.entry_time = Some(marked);
        record.exit_time = Some(marked + Duration::minutes(50));
        record
    }

    fn with_location(mut record: AttendanceRecord, lat: f64, lng: f64) -> AttendanceRecord {
        record.location = Some(GeoLocation::new(lat, lng, 5.0));
        record
    }

    #[test]
    fn test_small_history_scores_zero() {
        let history: Vec<AttendanceRecord> = (1..=4)
            .map(|day| {
                let mut r = ordinary(day);
                r.distance_from_room_m = Some(19.0);
                r.device_fingerprint = Some(format!("device-{}", day));
                r
            })
            .collect();
        let mut current = ordinary(5);
        current.distance_from_room_m = Some(19.0);

        let assessment = engine().evaluate(&current, &history, &[]);
        assert_eq!(assessment, RiskAssessment::default());
    }

    #[test]
    fn test_ordinary_history_scores_zero() {
        let history: Vec<AttendanceRecord> = (1..=10).map(ordinary).collect();
        let assessment = engine().evaluate(&ordinary(11), &history, &[]);
        assert_eq!(assessment.score, 0);
        assert!(assessment.tags.is_empty());
    }

    #[test]
    fn test_pattern_heuristics_accumulate() {
        let history: Vec<AttendanceRecord> = (1..=6)
            .map(|day| {
                let marked = at(day, 9, 0);
                let mut r = AttendanceRecord::new("u1", format!("s{}", day), marked);
                r.distance_from_room_m = Some(18.0);
                r.entry_time = Some(marked);
                r.exit_time = Some(marked + Duration::minutes(5));
                r.device_fingerprint = Some(format!("device-{}", day));
                r
            })
            .collect();
        let mut current = history[0].clone();
        current.id = Uuid::new_v4();

        let assessment = engine().evaluate(&current, &history, &[]);
        let expected: BTreeSet<AnomalyTag> = [
            AnomalyTag::EdgeMarking,
            AnomalyTag::ShortDuration,
            AnomalyTag::DeviceHopping,
            AnomalyTag::ConsistentTiming,
        ]
        .into_iter()
        .collect();
        assert_eq!(assessment.tags, expected);
        assert_eq!(assessment.score, 20 + 25 + 15 + 10);
    }

    #[test]
    fn test_failed_checks_and_remote_cap_at_max() {
        let history: Vec<AttendanceRecord> = (1..=5)
            .map(|day| {
                let marked = at(day, 9, 0);
                let mut r = AttendanceRecord::new("u1", format!("s{}", day), marked);
                r.distance_from_room_m = Some(19.0);
                r.entry_time = Some(marked);
                r.exit_time = Some(marked + Duration::minutes(1));
                r.device_fingerprint = Some(format!("device-{}", day));
                r.challenges.push(ChallengeOutcome {
                    challenge_id: Uuid::new_v4(),
                    issued_at: marked,
                    responded_at: None,
                    passed: false,
                    timed_out: true,
                    distance_m: None,
                });
                with_location(r, LAT + 0.05, LNG)
            })
            .collect();
        let current = with_location(ordinary(9), LAT + 0.05, LNG);

        let assessment = engine().evaluate(&current, &history, &[]);
        assert!(assessment.tags.contains(&AnomalyTag::FailedRandomChecks));
        assert!(assessment.tags.contains(&AnomalyTag::RemoteMarking));
        assert_eq!(assessment.score, 100);
    }

    #[test]
    fn test_batch_marking_ignores_history_size() {
        let current = with_location(AttendanceRecord::new("u1", "s1", at(2, 9, 0)), LAT, LNG);
        let close = with_location(
            AttendanceRecord::new("u2", "s1", at(2, 9, 0) + Duration::seconds(45)),
            LAT + (3.0 / rollcall_verify::geofence::EARTH_RADIUS_M).to_degrees(),
            LNG,
        );
        let far = with_location(AttendanceRecord::new("u3", "s1", at(2, 9, 0)), LAT + 0.001, LNG);
        let late = with_location(AttendanceRecord::new("u4", "s1", at(2, 9, 5)), LAT, LNG);

        let assessment = engine().evaluate(&current, &[], &[close, far, late]);
        assert_eq!(assessment.batch_peers, vec!["u2".to_string()]);
        assert_eq!(assessment.score, 25);
        assert!(assessment.tags.contains(&AnomalyTag::BatchMarking));
    }

    #[test]
    fn test_apply_does_not_double_count_existing_tag() {
        let mut record = AttendanceRecord::new("u1", "s1", at(2, 9, 0));
        record.flag(AnomalyTag::EdgeMarking, 20);

        let mut assessment = RiskAssessment::default();
        assessment.push(AnomalyTag::EdgeMarking, 20, 18.0, 15.0);
        assessment.push(AnomalyTag::BatchMarking, 25, 2.0, 2.0);
        assessment.apply_to(&mut record);

        assert_eq!(record.risk_score, 45);
    }
}
