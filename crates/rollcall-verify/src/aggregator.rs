//! Verification aggregation.
//!
//! The `VerificationAggregator` is the entry point for scoring a presence claim. One pass:
//!
//! 1. **Window** - the session must be active and `now` inside its attendance window
//! 2. **Duplicate** - a present or reviewed record refuses further claims
//! 3. **Token** - mandatory; parsed, looked up, checked against the session, then redeemed
//! 4. **Optional factors** - face, liveness, location, WiFi, beacon
//! 5. **Decision** - pass iff the total reaches the threshold and the token verified
//! 6. **Edge proximity** - distance beyond the inner radius adds a risk increment
//!
//! Persisting the outcome is left to the caller.

use chrono::{DateTime, Utc};
use rollcall_core::{
    AnomalyTag, AttendanceRecord, AttendanceStatus, Factor, FactorOutcome, FactorState, GeoLocation,
    PresenceToken, ScoringConfig, Session, VerificationClaim, VerificationResult, WirelessScan,
};
use rollcall_token::{TokenError, TokenManager, parse_scanned};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ClaimRejection, TokenRejection};
use crate::factors::{FaceEvaluator, LivenessEvaluator};
use crate::geofence::Geofence;
use crate::wireless::WirelessEvaluator;

/// Scored claim, ready to be written to the attendance record.
#[derive(Debug, Clone)]
pub struct Verdict {
    pub status: AttendanceStatus,
    pub result: VerificationResult,
    /// Distance to the room center, when location was evaluated.
    pub distance_m: Option<f64>,
    /// Tags raised by the claim itself.
    pub tags: BTreeSet<AnomalyTag>,
    /// Risk points raised by the claim itself.
    pub risk_increment: u32,
    /// The redeemed token.
    pub token: Option<PresenceToken>,
    /// Redemptions of the token, this one included.
    pub redemptions: usize,
    /// The claim was kept out of automatic admission regardless of its score.
    pub forced_review: bool,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        self.result.passed
    }

    /// Apply the verdict to a record, resetting whatever a previous attempt left behind.
    pub fn apply_to(&self, record: &mut AttendanceRecord, claim: &VerificationClaim, now: DateTime<Utc>) {
        record.status = self.status;
        record.verification = self.result.clone();
        record.marked_at = now;
        record.location = claim.location.clone();
        record.distance_from_room_m = self.distance_m;
        record.device_fingerprint = claim.device_fingerprint.clone();
        record.token = self.token.as_ref().map(|t| t.token.clone());
        record.risk_score = 0;
        record.anomaly_flags.clear();
        record.add_risk(self.risk_increment);
        record.anomaly_flags.extend(self.tags.iter().copied());
        record.requires_review = !self.passed();
        record.review_reason = self.result.reason.clone();
        record.entry_time = if self.passed() { Some(now) } else { None };
        record.updated_at = now;
    }
}

/// Scores presence claims.
pub struct VerificationAggregator {
    tokens: Arc<TokenManager>,
    geofence: Arc<Geofence>,
    wireless: WirelessEvaluator,
    face: Arc<dyn FaceEvaluator>,
    liveness: Arc<dyn LivenessEvaluator>,
    scoring: ScoringConfig,
}

impl VerificationAggregator {
    pub fn new(
        tokens: Arc<TokenManager>,
        geofence: Arc<Geofence>,
        face: Arc<dyn FaceEvaluator>,
        liveness: Arc<dyn LivenessEvaluator>,
        scoring: ScoringConfig,
    ) -> Self {
        Self {
            tokens,
            geofence,
            wireless: WirelessEvaluator::new(&scoring),
            face,
            liveness,
            scoring,
        }
    }

    pub fn scoring(&self) -> &ScoringConfig {
        &self.scoring
    }

    /// Score one claim by `user_id` against `session` at server time `now`.
    ///
    /// `existing` is the user's current record for the session, if any.
    pub async fn evaluate(
        &self,
        session: &Session,
        existing: Option<&AttendanceRecord>,
        user_id: &str,
        claim: &VerificationClaim,
        now: DateTime<Utc>,
    ) -> Result<Verdict, ClaimRejection> {
        // 1. Window
        if !session.accepts_claims_at(now) {
            return Err(ClaimRejection::WindowClosed);
        }

        // 2. Duplicate
        if let Some(record) = existing {
            if record.is_finalized() {
                return Err(ClaimRejection::RecordFinalized);
            }
            if record.is_present() {
                return Err(ClaimRejection::AlreadyMarked);
            }
        }

        let mut result = VerificationResult::new(self.scoring.pass_threshold);

        // 3. Token
        let (token, redemptions) = match self.check_token(session, user_id, &claim.token, now).await? {
            Some((record, redemptions)) => {
                result.set(Factor::Token, FactorOutcome::verified(self.weight(Factor::Token)));
                (Some(record), redemptions)
            }
            None => {
                result.set(
                    Factor::Token,
                    FactorOutcome::unavailable("token store unavailable"),
                );
                (None, 0)
            }
        };

        // 4. Optional factors
        result.set(Factor::Face, self.face_outcome(user_id, claim).await);
        result.set(Factor::Liveness, self.liveness_outcome(claim).await);
        let location = self.location_outcome(session, claim.location.as_ref());
        let distance_m = location.distance_m;
        result.set(Factor::Location, location);
        let (wifi, beacon) = self.wireless_outcomes(session, claim.wireless.as_ref());
        result.set(Factor::Wifi, wifi);
        result.set(Factor::Beacon, beacon);

        // 5. Decision
        let forced_review = result.token.state != FactorState::Verified;
        result.passed = !forced_review && result.total >= result.threshold;
        result.reason = if result.passed {
            None
        } else if forced_review {
            Some("presence token could not be verified".to_string())
        } else {
            Some(format!(
                "score {}/{} below threshold: short by {} points",
                result.total,
                result.threshold,
                result.threshold - result.total
            ))
        };
        let status = if result.passed {
            AttendanceStatus::Present
        } else {
            AttendanceStatus::PendingReview
        };

        // 6. Edge proximity
        let mut tags = BTreeSet::new();
        let mut risk_increment = 0;
        if distance_m.is_some_and(|d| d > self.geofence.config().edge_warning_radius_m) {
            tags.insert(AnomalyTag::EdgeMarking);
            risk_increment += self.scoring.edge_risk_points;
        }

        info!(
            session_id = %session.id,
            user_id = %user_id,
            score = result.total,
            threshold = result.threshold,
            status = %status,
            "claim scored"
        );

        Ok(Verdict {
            status,
            result,
            distance_m,
            tags,
            risk_increment,
            token,
            redemptions,
            forced_review,
        })
    }

    fn weight(&self, factor: Factor) -> u32 {
        self.scoring.weights.get(factor)
    }

    /// Validate and redeem the token. `Ok(None)` means the store could not answer.
    async fn check_token(
        &self,
        session: &Session,
        user_id: &str,
        raw: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<(PresenceToken, usize)>, ClaimRejection> {
        let scanned = parse_scanned(raw).map_err(|_| TokenRejection::InvalidFormat)?;

        let record = match self.tokens.validate(&scanned, &session.id, now).await {
            Ok(record) => record,
            Err(err) => return token_failure(err, &session.id),
        };

        let redemptions = match self.tokens.redeem(&record.token, user_id).await {
            Ok(count) => count,
            Err(TokenError::Expired) => return Err(TokenRejection::Expired.into()),
            Err(err) => {
                warn!(session_id = %session.id, error = %err, "token redemption not recorded");
                0
            }
        };
        Ok(Some((record, redemptions)))
    }

    async fn face_outcome(&self, user_id: &str, claim: &VerificationClaim) -> FactorOutcome {
        let Some(sample) = &claim.face else {
            return FactorOutcome::absent();
        };
        match self.face.evaluate(user_id, sample).await {
            Ok(score) if score.verified => {
                FactorOutcome::verified(self.weight(Factor::Face)).with_confidence(score.confidence)
            }
            Ok(score) => FactorOutcome::failed(format!(
                "face confidence {:.2} below {:.2}",
                score.confidence, self.scoring.face_threshold
            ))
            .with_confidence(score.confidence),
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "face evaluator unavailable");
                FactorOutcome::unavailable(err.to_string())
            }
        }
    }

    async fn liveness_outcome(&self, claim: &VerificationClaim) -> FactorOutcome {
        let Some(frames) = &claim.liveness else {
            return FactorOutcome::absent();
        };
        match self.liveness.evaluate(frames).await {
            Ok(score) if score.verified => {
                FactorOutcome::verified(self.weight(Factor::Liveness)).with_confidence(score.confidence)
            }
            Ok(score) => FactorOutcome::failed(format!(
                "liveness confidence {:.2} below {:.2}",
                score.confidence, self.scoring.liveness_threshold
            ))
            .with_confidence(score.confidence),
            Err(err) => {
                warn!(error = %err, "liveness evaluator unavailable");
                FactorOutcome::unavailable(err.to_string())
            }
        }
    }

    fn location_outcome(&self, session: &Session, location: Option<&GeoLocation>) -> FactorOutcome {
        let Some(location) = location else {
            return FactorOutcome::absent();
        };
        let check = self.geofence.verify(location, &session.room_id);
        debug!(room_id = %session.room_id, distance_m = ?check.distance_m, valid = check.valid, "geofence");
        if check.valid {
            FactorOutcome::verified(self.weight(Factor::Location)).with_distance(check.distance_m)
        } else {
            FactorOutcome::failed(check.describe()).with_distance(check.distance_m)
        }
    }

    fn wireless_outcomes(&self, session: &Session, scan: Option<&WirelessScan>) -> (FactorOutcome, FactorOutcome) {
        let Some(scan) = scan else {
            return (FactorOutcome::absent(), FactorOutcome::absent());
        };
        let Some(room) = self.geofence.rooms().get(&session.room_id) else {
            return (
                FactorOutcome::unavailable("room is not registered"),
                FactorOutcome::unavailable("room is not registered"),
            );
        };

        let wifi = if scan.access_points.is_empty() {
            FactorOutcome::absent()
        } else {
            match self.wireless.verify_wifi(&scan.access_points, &room) {
                None => FactorOutcome::unavailable("no access points registered for room"),
                Some(check) if check.verified => FactorOutcome::verified(self.weight(Factor::Wifi)),
                Some(check) => FactorOutcome::failed(check.reason.unwrap_or_default()),
            }
        };

        let beacon = if scan.beacons.is_empty() {
            FactorOutcome::absent()
        } else {
            match self.wireless.verify_beacon(&scan.beacons, &room) {
                None => FactorOutcome::unavailable("no beacons registered for room"),
                Some(check) if check.verified => {
                    FactorOutcome::verified(self.weight(Factor::Beacon)).with_distance(check.distance_m)
                }
                Some(check) => FactorOutcome::failed(check.reason.unwrap_or_default()),
            }
        };

        (wifi, beacon)
    }
}

/// Map a token manager failure: store trouble degrades, anything else rejects.
fn token_failure<T>(err: TokenError, session_id: &str) -> Result<Option<T>, ClaimRejection> {
    match err {
        TokenError::InvalidFormat(_) => Err(TokenRejection::InvalidFormat.into()),
        TokenError::Expired => Err(TokenRejection::Expired.into()),
        TokenError::SessionMismatch { .. } => Err(TokenRejection::SessionMismatch.into()),
        TokenError::Store(_) | TokenError::Serialization(_) => {
            warn!(session_id = %session_id, error = %err, "token factor unavailable");
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EvaluatorError;
    use crate::factors::{FactorScore, StaticFaceEvaluator, StaticLivenessEvaluator};
    use async_trait::async_trait;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use rollcall_core::{FaceSample, GeofenceConfig, RoomConfig, TokenConfig};
    use rollcall_token::{MemoryTokenStore, StoreError, TokenStore};

    const LAT: f64 = 28.6139;
    const LNG: f64 = 77.2090;

    struct OfflineFace;

    #[async_trait]
    impl FaceEvaluator for OfflineFace {
        async fn evaluate(&self, _: &str, _: &FaceSample) -> Result<FactorScore, EvaluatorError> {
            Err(EvaluatorError::Unavailable("model offline".into()))
        }
    }

    /// A token store whose backend is down.
    struct DownStore;

    #[async_trait]
    impl TokenStore for DownStore {
        async fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn set_ex(&self, _: &str, _: &str, _: std::time::Duration) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn swap_ex(&self, _: &str, _: &str, _: std::time::Duration) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn delete(&self, _: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn append(&self, _: &str, _: &str, _: std::time::Duration) -> Result<usize, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn list(&self, _: &str) -> Result<Vec<String>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn incr(&self, _: &str) -> Result<i64, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
        async fn ttl(&self, _: &str) -> Result<Option<std::time::Duration>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    struct Fixture {
        aggregator: VerificationAggregator,
        tokens: Arc<TokenManager>,
        session: Session,
        now: DateTime<Utc>,
    }

    fn fixture_with(store: Arc<dyn TokenStore>, face: Arc<dyn FaceEvaluator>) -> Fixture {
        let tokens = Arc::new(TokenManager::new(store, TokenConfig::default()));
        let mut geofence_config = GeofenceConfig::default();
        let mut room = RoomConfig::new(LAT, LNG).with_floor(1);
        room.wifi_bssids = vec!["aa:bb:cc:dd:ee:01".into()];
        room.beacon_ids = vec!["beacon-101".into()];
        geofence_config.rooms.insert("ROOM_101".into(), room);
        geofence_config.rooms.insert("LAB_201".into(), RoomConfig::new(LAT, LNG));
        let scoring = ScoringConfig::default();
        let aggregator = VerificationAggregator::new(
            tokens.clone(),
            Arc::new(Geofence::new(geofence_config)),
            face,
            Arc::new(StaticLivenessEvaluator::new(0.9, scoring.liveness_threshold)),
            scoring,
        );

        let now = Utc::now();
        let mut session = Session::scheduled("s1", "ROOM_101", now, now + Duration::hours(1));
        session.open_window(now, Duration::minutes(15));
        Fixture {
            aggregator,
            tokens,
            session,
            now,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(
            Arc::new(MemoryTokenStore::new()),
            Arc::new(StaticFaceEvaluator::new(0.92, 0.85)),
        )
    }

    fn face() -> FaceSample {
        FaceSample { image: vec![1, 2, 3] }
    }

    fn north(meters: f64) -> f64 {
        LAT + (meters / crate::geofence::EARTH_RADIUS_M).to_degrees()
    }

    fn scan(signal_dbm: i32, rssi: i32) -> WirelessScan {
        WirelessScan {
            access_points: vec![rollcall_core::AccessPoint {
                bssid: "AA:BB:CC:DD:EE:01".into(),
                ssid: Some("campus".into()),
                signal_dbm,
            }],
            beacons: vec![rollcall_core::BeaconSighting {
                id: "beacon-101".into(),
                name: None,
                rssi,
            }],
        }
    }

    /// An open session `id` held in `room_id`, with a fresh token payload for it.
    async fn session_in(fx: &Fixture, id: &str, room_id: &str) -> (Session, String) {
        let mut session = Session::scheduled(id, room_id, fx.now, fx.now + Duration::hours(1));
        session.open_window(fx.now, Duration::minutes(15));
        let issued = fx.tokens.issue(id, room_id).await.unwrap();
        (session, issued.payload.to_json().unwrap())
    }

    async fn payload(fx: &Fixture) -> String {
        let issued = fx.tokens.issue("s1", "ROOM_101").await.unwrap();
        issued.payload.to_json().unwrap()
    }

    #[tokio::test]
    async fn test_token_face_location_is_present() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await)
            .face(face())
            .location(GeoLocation::new(LAT, LNG, 5.0));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.total, 75);
        assert_eq!(verdict.status, AttendanceStatus::Present);
        assert!(verdict.result.reason.is_none());
        assert!(verdict.tags.is_empty());
        assert_eq!(verdict.redemptions, 1);
    }

    #[tokio::test]
    async fn test_token_only_is_pending_with_shortfall() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await);

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.total, 25);
        assert_eq!(verdict.status, AttendanceStatus::PendingReview);
        assert_eq!(
            verdict.result.reason.as_deref(),
            Some("score 25/75 below threshold: short by 50 points")
        );
    }

    #[tokio::test]
    async fn test_claim_after_window_is_rejected() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await);
        let late = fx.now + Duration::minutes(15) + Duration::seconds(1);

        let err = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, late)
            .await
            .unwrap_err();
        assert_eq!(err, ClaimRejection::WindowClosed);
    }

    #[tokio::test]
    async fn test_present_record_rejects_resubmission() {
        let fx = fixture();
        let mut existing = AttendanceRecord::new("u1", "s1", fx.now);
        existing.status = AttendanceStatus::Present;
        let claim = VerificationClaim::new(payload(&fx).await);

        let err = fx
            .aggregator
            .evaluate(&fx.session, Some(&existing), "u1", &claim, fx.now)
            .await
            .unwrap_err();
        assert_eq!(err, ClaimRejection::AlreadyMarked);
    }

    #[tokio::test]
    async fn test_token_rejections() {
        let fx = fixture();

        let garbage = VerificationClaim::new("{not json");
        assert_eq!(
            fx.aggregator
                .evaluate(&fx.session, None, "u1", &garbage, fx.now)
                .await
                .unwrap_err(),
            ClaimRejection::Token(TokenRejection::InvalidFormat)
        );

        let issued = fx.tokens.issue("s2", "ROOM_101").await.unwrap();
        let foreign = VerificationClaim::new(issued.payload.to_json().unwrap());
        assert_eq!(
            fx.aggregator
                .evaluate(&fx.session, None, "u1", &foreign, fx.now)
                .await
                .unwrap_err(),
            ClaimRejection::Token(TokenRejection::SessionMismatch)
        );

        let raw = payload(&fx).await;
        fx.tokens.invalidate_session("s1").await.unwrap();
        let stale = VerificationClaim::new(raw);
        assert_eq!(
            fx.aggregator
                .evaluate(&fx.session, None, "u1", &stale, fx.now)
                .await
                .unwrap_err(),
            ClaimRejection::Token(TokenRejection::Expired)
        );
    }

    #[tokio::test]
    async fn test_edge_marking_does_not_change_decision() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await)
            .face(face())
            .location(GeoLocation::new(north(18.0), LNG, 5.0));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.status, AttendanceStatus::Present);
        assert_eq!(verdict.distance_m, Some(18.0));
        assert!(verdict.tags.contains(&AnomalyTag::EdgeMarking));
        assert_eq!(verdict.risk_increment, 20);
    }

    #[tokio::test]
    async fn test_evaluator_failure_is_unavailable_not_fatal() {
        let fx = fixture_with(Arc::new(MemoryTokenStore::new()), Arc::new(OfflineFace));
        let claim = VerificationClaim::new(payload(&fx).await)
            .face(face())
            .location(GeoLocation::new(LAT, LNG, 5.0));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.face.state, FactorState::Unavailable);
        assert_eq!(verdict.result.total, 45);
        assert_eq!(verdict.status, AttendanceStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_token_store_outage_forces_review() {
        let fx = fixture_with(Arc::new(DownStore), Arc::new(StaticFaceEvaluator::new(0.99, 0.85)));
        // 32 zero bytes, well-formed but unknown
        let claim = VerificationClaim::new("A".repeat(43))
            .face(face())
            .liveness(vec![rollcall_core::LivenessFrame { image: vec![1] }])
            .location(GeoLocation::new(LAT, LNG, 5.0));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.token.state, FactorState::Unavailable);
        assert_eq!(verdict.result.total, 65);
        assert!(verdict.forced_review);
        assert_eq!(verdict.status, AttendanceStatus::PendingReview);
    }

    #[tokio::test]
    async fn test_every_factor_scores_full_marks() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await)
            .face(face())
            .liveness(vec![rollcall_core::LivenessFrame { image: vec![1] }])
            .location(GeoLocation::new(LAT, LNG, 5.0))
            .wireless(scan(-50, -59));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.wifi, FactorOutcome::verified(5));
        assert_eq!(verdict.result.beacon.state, FactorState::Verified);
        assert_eq!(verdict.result.beacon.points, 5);
        assert_eq!(verdict.result.beacon.distance_m, Some(1.01));
        assert_eq!(verdict.result.total, 100);
        assert_eq!(verdict.status, AttendanceStatus::Present);
    }

    #[tokio::test]
    async fn test_weak_wireless_signals_fail() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await).wireless(scan(-80, -90));

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.wifi.state, FactorState::Failed);
        assert_eq!(verdict.result.wifi.points, 0);
        assert!(verdict.result.wifi.reason.as_deref().unwrap().contains("too weak"));
        assert_eq!(verdict.result.beacon.state, FactorState::Failed);
        assert_eq!(verdict.result.total, 25);
    }

    #[tokio::test]
    async fn test_unknown_access_points_fail_wifi() {
        let fx = fixture();
        let mut wireless = scan(-50, -59);
        wireless.access_points[0].bssid = "ff:ff:ff:ff:ff:ff".into();
        wireless.beacons.clear();
        let claim = VerificationClaim::new(payload(&fx).await).wireless(wireless);

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.wifi.state, FactorState::Failed);
        assert_eq!(verdict.result.wifi.reason.as_deref(), Some("room WiFi not detected"));
        assert_eq!(verdict.result.beacon, FactorOutcome::absent());
    }

    #[tokio::test]
    async fn test_empty_scan_leaves_wireless_absent() {
        let fx = fixture();
        let claim = VerificationClaim::new(payload(&fx).await).wireless(WirelessScan::default());

        let verdict = fx
            .aggregator
            .evaluate(&fx.session, None, "u1", &claim, fx.now)
            .await
            .unwrap();

        assert_eq!(verdict.result.wifi, FactorOutcome::absent());
        assert_eq!(verdict.result.beacon, FactorOutcome::absent());
        assert_eq!(verdict.result.total, 25);
    }

    #[tokio::test]
    async fn test_room_without_wireless_is_unavailable() {
        let fx = fixture();
        let (session, raw) = session_in(&fx, "s2", "LAB_201").await;
        let claim = VerificationClaim::new(raw).wireless(scan(-50, -59));

        let verdict = fx.aggregator.evaluate(&session, None, "u1", &claim, fx.now).await.unwrap();

        assert_eq!(verdict.result.wifi.state, FactorState::Unavailable);
        assert_eq!(
            verdict.result.wifi.reason.as_deref(),
            Some("no access points registered for room")
        );
        assert_eq!(verdict.result.beacon.state, FactorState::Unavailable);
        assert_eq!(verdict.result.total, 25);
    }

    #[tokio::test]
    async fn test_unregistered_room_makes_wireless_unavailable() {
        let fx = fixture();
        let (session, raw) = session_in(&fx, "s3", "ROOM_999").await;
        let claim = VerificationClaim::new(raw).wireless(scan(-50, -59));

        let verdict = fx.aggregator.evaluate(&session, None, "u1", &claim, fx.now).await.unwrap();

        assert_eq!(verdict.result.wifi.state, FactorState::Unavailable);
        assert_eq!(verdict.result.wifi.reason.as_deref(), Some("room is not registered"));
        assert_eq!(verdict.result.beacon.state, FactorState::Unavailable);
        assert_eq!(verdict.result.token.state, FactorState::Verified);
        assert_eq!(verdict.result.total, 25);
    }
}
