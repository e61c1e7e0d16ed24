use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use pretty_assertions::assert_eq;
use rollcall_core::{
    AnomalyTag, AttendanceRecord, AttendanceStatus, FaceSample, GeoLocation, ReviewDecision, RollcallConfig,
    RoomConfig, Session, VerificationClaim,
};
use rollcall_runtime::{
    AttendanceEngine, AttendanceStore, EngineError, HistoryError, RecordQuery, RecordUpdate, ReplaceGuard,
    RiskView, UpdateOutcome, WriteOutcome,
};
use rollcall_token::IssuedToken;
use rollcall_verify::geofence::EARTH_RADIUS_M;
use rollcall_verify::{
    ClaimRejection, EvaluatorError, FaceEvaluator, FactorScore, StaticFaceEvaluator, TokenRejection,
};
use std::sync::Arc;
use tokio::sync::Notify;

const LAT: f64 = 28.6139;
const LNG: f64 = 77.2090;
const ROOM: &str = "ROOM_101";

fn config() -> RollcallConfig {
    let mut config = RollcallConfig::default();
    config.geofence.rooms.insert(ROOM.into(), RoomConfig::new(LAT, LNG));
    config
}

fn engine() -> AttendanceEngine {
    AttendanceEngine::builder(config())
        .face_evaluator(Arc::new(StaticFaceEvaluator::new(0.95, 0.85)))
        .build()
}

async fn started(engine: &AttendanceEngine, session_id: &str) -> IssuedToken {
    let now = Utc::now();
    engine
        .register_session(Session::scheduled(session_id, ROOM, now, now + Duration::hours(1)))
        .await
        .unwrap();
    engine.start_session(session_id).await.unwrap()
}

/// Location `north_m` metres north of the room centre.
fn north_of_room(north_m: f64) -> GeoLocation {
    GeoLocation::new(LAT + (north_m / EARTH_RADIUS_M).to_degrees(), LNG, 5.0)
}

/// Token, face and location: 25 + 30 + 20.
fn full_claim(token: &IssuedToken, north_m: f64) -> VerificationClaim {
    VerificationClaim::new(token.token.token.clone())
        .location(north_of_room(north_m))
        .face(FaceSample { image: vec![1, 2, 3] })
        .device("phone")
}

#[tokio::test]
async fn test_full_claim_is_admitted_and_scheduled() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let outcome = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Present);
    assert_eq!(outcome.score, 75);
    assert_eq!(outcome.reason, None);
    assert_eq!(outcome.risk_score, 0);
    assert!(outcome.persisted);
    assert!(engine.scheduler().is_scheduled("s1", "u1"));

    let usage = engine.token_usage(&token.token.token).await.unwrap();
    assert_eq!(usage.user_ids, vec!["u1".to_string()]);
}

#[tokio::test]
async fn test_token_only_claim_waits_for_review() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let outcome = engine
        .submit_claim("s1", "u1", VerificationClaim::new(token.token.token.clone()))
        .await
        .unwrap();
    assert_eq!(outcome.status, AttendanceStatus::PendingReview);
    assert_eq!(outcome.score, 25);
    assert_eq!(
        outcome.reason.as_deref(),
        Some("score 25/75 below threshold: short by 50 points")
    );
    assert!(outcome.requires_review);
    assert!(!engine.scheduler().is_scheduled("s1", "u1"));

    let pending = engine.pending_reviews(Some("s1")).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].user_id, "u1");
}

#[tokio::test]
async fn test_claim_rejections() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let err = engine
        .submit_claim("missing", "u1", full_claim(&token, 2.0))
        .await
        .unwrap_err();
    assert_eq!(err, ClaimRejection::SessionNotFound);

    let late = Utc::now() + Duration::minutes(20);
    let err = engine
        .submit_claim_at("s1", "u1", full_claim(&token, 2.0), late)
        .await
        .unwrap_err();
    assert_eq!(err, ClaimRejection::WindowClosed);

    let err = engine
        .submit_claim("s1", "u1", VerificationClaim::new("not a token"))
        .await
        .unwrap_err();
    assert_eq!(err, ClaimRejection::Token(TokenRejection::InvalidFormat));

    engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    let err = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap_err();
    assert_eq!(err, ClaimRejection::AlreadyMarked);
}

#[tokio::test]
async fn test_rotated_token_is_rejected() {
    let engine = engine();
    let first = started(&engine, "s1").await;
    let second = engine.rotate_token("s1").await.unwrap();
    assert_eq!(second.token.generation, first.token.generation + 1);

    let err = engine.submit_claim("s1", "u1", full_claim(&first, 2.0)).await.unwrap_err();
    assert_eq!(err, ClaimRejection::Token(TokenRejection::Expired));

    let outcome = engine.submit_claim("s1", "u1", full_claim(&second, 2.0)).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Present);
}

#[tokio::test]
async fn test_token_from_another_session_is_rejected() {
    let engine = engine();
    started(&engine, "s1").await;
    let other = started(&engine, "s2").await;

    let claim = VerificationClaim::new(other.payload.to_json().unwrap()).location(north_of_room(2.0));
    let err = engine.submit_claim("s1", "u1", claim).await.unwrap_err();
    assert_eq!(err, ClaimRejection::Token(TokenRejection::SessionMismatch));
}

#[tokio::test]
async fn test_shared_token_is_redeemed_twice() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let first = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    let second = engine.submit_claim("s1", "u2", full_claim(&token, 12.0)).await.unwrap();
    assert_eq!(first.status, AttendanceStatus::Present);
    assert_eq!(second.status, AttendanceStatus::Present);

    let usage = engine.token_usage(&token.token.token).await.unwrap();
    assert_eq!(usage.count, 2);
    assert_eq!(usage.distinct_users(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_are_all_recorded() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let users: Vec<String> = (0..8).map(|i| format!("u{}", i)).collect();
    let claims = users
        .iter()
        .enumerate()
        .map(|(i, user)| engine.submit_claim("s1", user, full_claim(&token, i as f64 * 1.5)));
    let outcomes = futures::future::join_all(claims).await;
    assert!(outcomes.iter().all(|o| o.as_ref().is_ok_and(|o| o.status == AttendanceStatus::Present)));

    let usage = engine.token_usage(&token.token.token).await.unwrap();
    assert_eq!(usage.count, 8);
    assert_eq!(usage.distinct_users(), 8);
}

/// Quick match for ordinary samples. A blank sample stalls for 200ms and then fails.
struct StallingFace {
    stalled: Arc<Notify>,
}

#[async_trait]
impl FaceEvaluator for StallingFace {
    async fn evaluate(&self, _: &str, sample: &FaceSample) -> Result<FactorScore, EvaluatorError> {
        if !sample.image.is_empty() {
            return Ok(FactorScore::against(0.95, 0.85));
        }
        self.stalled.notify_one();
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        Ok(FactorScore::against(0.2, 0.85))
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_failing_claim_does_not_overwrite_present_record() {
    let stalled = Arc::new(Notify::new());
    let engine = Arc::new(
        AttendanceEngine::builder(config())
            .face_evaluator(Arc::new(StallingFace {
                stalled: stalled.clone(),
            }))
            .build(),
    );
    let token = started(&engine, "s1").await;

    let slow_claim = VerificationClaim::new(token.token.token.clone()).face(FaceSample { image: vec![] });
    let slow = tokio::spawn({
        let engine = engine.clone();
        async move { engine.submit_claim("s1", "u1", slow_claim).await }
    });
    stalled.notified().await;

    let fast = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    assert_eq!(fast.status, AttendanceStatus::Present);

    let slow = slow.await.unwrap();
    assert_eq!(slow.unwrap_err(), ClaimRejection::AlreadyMarked);

    assert!(engine.pending_reviews(Some("s1")).await.unwrap().is_empty());
    let risk = engine.get_risk("u1", Some("s1")).await.unwrap();
    assert_eq!(risk, RiskView::default());
    assert!(engine.scheduler().is_scheduled("s1", "u1"));
}

#[tokio::test]
async fn test_batch_marking_flags_both_records() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let first = engine.submit_claim("s1", "u1", full_claim(&token, 0.0)).await.unwrap();
    assert!(first.anomaly_tags.is_empty());

    let second = engine.submit_claim("s1", "u2", full_claim(&token, 3.0)).await.unwrap();
    assert!(second.anomaly_tags.contains(&AnomalyTag::BatchMarking));
    assert_eq!(second.risk_score, 25);

    let peer = engine.get_risk("u1", Some("s1")).await.unwrap();
    assert!(peer.anomaly_tags.contains(&AnomalyTag::BatchMarking));
    assert_eq!(peer.risk_score, 25);

    let report = engine.anomaly_report(Some(20)).await.unwrap();
    assert_eq!(report.records.len(), 2);
    assert_eq!(report.by_tag.get(&AnomalyTag::BatchMarking), Some(&2));

    let report = engine.anomaly_report(None).await.unwrap();
    assert_eq!(report.min_risk, 40);
    assert!(report.records.is_empty());
}

#[tokio::test]
async fn test_edge_claim_raises_risk() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let outcome = engine.submit_claim("s1", "u1", full_claim(&token, 18.0)).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Present);
    assert!(outcome.anomaly_tags.contains(&AnomalyTag::EdgeMarking));
    assert_eq!(outcome.risk_score, 20);

    let expected = RiskView {
        risk_score: 20,
        anomaly_tags: [AnomalyTag::EdgeMarking].into(),
    };
    assert_eq!(engine.get_risk("u1", Some("s1")).await.unwrap(), expected);
    assert_eq!(engine.get_risk("u1", None).await.unwrap(), expected);
}

#[tokio::test]
async fn test_review_resolves_pending_record_once() {
    let engine = engine();
    let token = started(&engine, "s1").await;
    for user in ["u1", "u2"] {
        engine
            .submit_claim("s1", user, VerificationClaim::new(token.token.token.clone()))
            .await
            .unwrap();
    }

    let approved = engine
        .review("s1", "u1", "prof", ReviewDecision::Approve, Some("seen in class".into()))
        .await
        .unwrap();
    assert_eq!(approved.status, AttendanceStatus::Present);
    assert!(!approved.requires_review);
    assert_eq!(approved.review.as_ref().map(|r| r.reviewer.as_str()), Some("prof"));

    let rejected = engine
        .review("s1", "u2", "prof", ReviewDecision::Reject, None)
        .await
        .unwrap();
    assert_eq!(rejected.status, AttendanceStatus::Absent);

    let again = engine.review("s1", "u1", "dean", ReviewDecision::Reject, None).await;
    assert!(matches!(again, Err(EngineError::AlreadyReviewed)));

    let missing = engine.review("s1", "u9", "prof", ReviewDecision::Approve, None).await;
    assert!(matches!(missing, Err(EngineError::RecordNotFound { .. })));

    assert!(engine.pending_reviews(None).await.unwrap().is_empty());

    let err = engine.submit_claim("s1", "u2", full_claim(&token, 2.0)).await.unwrap_err();
    assert_eq!(err, ClaimRejection::RecordFinalized);
}

#[tokio::test]
async fn test_pending_user_may_retry_with_more_factors() {
    let engine = engine();
    let token = started(&engine, "s1").await;

    let first = engine
        .submit_claim("s1", "u1", VerificationClaim::new(token.token.token.clone()))
        .await
        .unwrap();
    let second = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    assert_eq!(second.status, AttendanceStatus::Present);
    assert_eq!(second.record_id, first.record_id);
    assert!(!second.requires_review);
}

#[tokio::test]
async fn test_end_session_closes_everything() {
    let engine = engine();
    let token = started(&engine, "s1").await;
    engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();

    engine.end_session("s1").await.unwrap();
    assert!(engine.current_token("s1").await.unwrap().is_none());
    assert!(!engine.scheduler().is_scheduled("s1", "u1"));

    let risk = engine.get_risk("u1", None).await.unwrap();
    assert_eq!(risk.risk_score, 0);

    let err = engine.submit_claim("s1", "u2", full_claim(&token, 2.0)).await.unwrap_err();
    assert_eq!(err, ClaimRejection::WindowClosed);
}

#[tokio::test]
async fn test_record_exit_and_deletion() {
    let engine = engine();
    let token = started(&engine, "s1").await;
    engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();

    let record = engine.record_exit("s1", "u1").await.unwrap();
    assert!(record.exit_time.is_some());
    assert!(!engine.scheduler().is_scheduled("s1", "u1"));

    assert_eq!(engine.delete_user("u1").await.unwrap(), 1);
    assert!(matches!(
        engine.record_exit("s1", "u1").await,
        Err(EngineError::RecordNotFound { .. })
    ));

    engine.submit_claim("s1", "u2", full_claim(&token, 2.0)).await.unwrap();
    assert_eq!(engine.delete_session("s1").await.unwrap(), 1);
    assert!(matches!(
        engine.start_session("s1").await,
        Err(EngineError::SessionNotFound(_))
    ));
}

#[tokio::test]
async fn test_get_risk_without_history_is_zero() {
    let engine = engine();
    let risk = engine.get_risk("nobody", None).await.unwrap();
    assert_eq!(risk.risk_score, 0);
    assert!(risk.anomaly_tags.is_empty());
}

/// History backend that is down.
struct DownHistory;

#[async_trait]
impl AttendanceStore for DownHistory {
    async fn get(&self, _: &str, _: &str) -> Result<Option<AttendanceRecord>, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn upsert(&self, _: AttendanceRecord) -> Result<(), HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn upsert_if(&self, _: AttendanceRecord, _: ReplaceGuard) -> Result<WriteOutcome, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn update(&self, _: &str, _: &str, _: RecordUpdate) -> Result<UpdateOutcome, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn query(&self, _: &RecordQuery) -> Result<Vec<AttendanceRecord>, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn history(&self, _: &str, _: DateTime<Utc>) -> Result<Vec<AttendanceRecord>, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn delete_session(&self, _: &str) -> Result<usize, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
    async fn delete_user(&self, _: &str) -> Result<usize, HistoryError> {
        Err(HistoryError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn test_history_outage_still_scores_claim() {
    let engine = AttendanceEngine::builder(config())
        .face_evaluator(Arc::new(StaticFaceEvaluator::new(0.95, 0.85)))
        .attendance_store(Arc::new(DownHistory))
        .build();
    let token = started(&engine, "s1").await;

    let outcome = engine.submit_claim("s1", "u1", full_claim(&token, 2.0)).await.unwrap();
    assert_eq!(outcome.status, AttendanceStatus::Present);
    assert_eq!(outcome.score, 75);
    assert!(!outcome.persisted);
    assert!(!engine.scheduler().is_scheduled("s1", "u1"));

    assert!(matches!(
        engine.pending_reviews(None).await,
        Err(EngineError::History(HistoryError::Unavailable(_)))
    ));
}
