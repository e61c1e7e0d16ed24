//! The attendance engine facade.
//!
//! Wires the token manager, the aggregator, the risk engine and the challenge scheduler to the
//! history stores, and exposes the operations an outer transport layer calls.

use chrono::{DateTime, Duration, Utc};
use rollcall_core::{
    AnomalyTag, AttendanceRecord, AttendanceStatus, FaceSample, GeoLocation, ManualReview, PresenceToken,
    ReviewDecision, RollcallConfig, Session, SessionStatus, VerificationClaim, VerificationResult,
};
use rollcall_risk::RiskEngine;
use rollcall_token::{IssuedToken, MemoryTokenStore, TokenManager, TokenStore, TokenUsage};
use rollcall_verify::{
    ClaimRejection, FaceEvaluator, Geofence, LivenessEvaluator, NoEvaluator, VerificationAggregator,
};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::scheduler::{ChallengeNotifier, ChallengeResponse, ChallengeScheduler, LogNotifier};
use crate::store::{
    AttendanceStore, MemoryAttendanceStore, MemorySessionStore, RecordQuery, ReplaceGuard, SessionStore,
    UpdateOutcome, WriteOutcome,
};

/// Result of an admitted or pending claim.
#[derive(Debug, Clone, Serialize)]
pub struct ClaimOutcome {
    pub record_id: Uuid,
    pub status: AttendanceStatus,
    pub score: u32,
    pub result: VerificationResult,
    /// Shortfall or review reason, when not admitted outright.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub risk_score: u32,
    pub anomaly_tags: BTreeSet<AnomalyTag>,
    pub requires_review: bool,
    /// Whether the record reached the history store.
    pub persisted: bool,
}

/// Risk summary for a user.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RiskView {
    pub risk_score: u32,
    pub anomaly_tags: BTreeSet<AnomalyTag>,
}

/// Records at or above a risk floor.
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    pub min_risk: u32,
    /// Highest risk first.
    pub records: Vec<AttendanceRecord>,
    pub by_tag: BTreeMap<AnomalyTag, usize>,
}

/// Builder for [`AttendanceEngine`]. Every collaborator defaults to its in-memory form.
pub struct EngineBuilder {
    config: RollcallConfig,
    token_store: Option<Arc<dyn TokenStore>>,
    records: Option<Arc<dyn AttendanceStore>>,
    sessions: Option<Arc<dyn SessionStore>>,
    face: Option<Arc<dyn FaceEvaluator>>,
    liveness: Option<Arc<dyn LivenessEvaluator>>,
    notifier: Option<Arc<dyn ChallengeNotifier>>,
}

impl EngineBuilder {
    pub fn token_store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.token_store = Some(store);
        self
    }

    pub fn attendance_store(mut self, store: Arc<dyn AttendanceStore>) -> Self {
        self.records = Some(store);
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    pub fn face_evaluator(mut self, evaluator: Arc<dyn FaceEvaluator>) -> Self {
        self.face = Some(evaluator);
        self
    }

    pub fn liveness_evaluator(mut self, evaluator: Arc<dyn LivenessEvaluator>) -> Self {
        self.liveness = Some(evaluator);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn ChallengeNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> AttendanceEngine {
        let config = self.config;
        let token_store = self.token_store.unwrap_or_else(|| Arc::new(MemoryTokenStore::new()));
        let records = self.records.unwrap_or_else(|| Arc::new(MemoryAttendanceStore::new()));
        let sessions = self.sessions.unwrap_or_else(|| Arc::new(MemorySessionStore::new()));
        let face = self.face.unwrap_or_else(|| Arc::new(NoEvaluator));
        let liveness = self.liveness.unwrap_or_else(|| Arc::new(NoEvaluator));
        let notifier = self.notifier.unwrap_or_else(|| Arc::new(LogNotifier));

        let tokens = Arc::new(TokenManager::new(token_store, config.tokens.clone()));
        let geofence = Arc::new(Geofence::new(config.geofence.clone()));
        let aggregator = VerificationAggregator::new(
            tokens.clone(),
            geofence.clone(),
            face.clone(),
            liveness,
            config.scoring.clone(),
        );
        let risk = RiskEngine::new(config.risk.clone(), geofence.clone());
        let scheduler = ChallengeScheduler::new(
            config.challenges.clone(),
            config.risk.points.failed_random_checks,
            records.clone(),
            sessions.clone(),
            geofence.clone(),
            face,
            notifier,
        );

        AttendanceEngine {
            config,
            tokens,
            geofence,
            aggregator,
            risk,
            records,
            sessions,
            scheduler,
        }
    }
}

/// Attendance verification and risk engine.
pub struct AttendanceEngine {
    config: RollcallConfig,
    tokens: Arc<TokenManager>,
    geofence: Arc<Geofence>,
    aggregator: VerificationAggregator,
    risk: RiskEngine,
    records: Arc<dyn AttendanceStore>,
    sessions: Arc<dyn SessionStore>,
    scheduler: ChallengeScheduler,
}

impl AttendanceEngine {
    pub fn builder(config: RollcallConfig) -> EngineBuilder {
        EngineBuilder {
            config,
            token_store: None,
            records: None,
            sessions: None,
            face: None,
            liveness: None,
            notifier: None,
        }
    }

    pub fn config(&self) -> &RollcallConfig {
        &self.config
    }

    pub fn geofence(&self) -> &Geofence {
        &self.geofence
    }

    pub fn scheduler(&self) -> &ChallengeScheduler {
        &self.scheduler
    }

    // =========================================================================
    // SESSIONS
    // =========================================================================

    /// Make a session known to the engine.
    pub async fn register_session(&self, session: Session) -> Result<(), EngineError> {
        self.sessions.upsert(session).await?;
        Ok(())
    }

    async fn session(&self, session_id: &str) -> Result<Session, EngineError> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::SessionNotFound(session_id.to_string()))
    }

    /// Activate a session, open its attendance window and issue its first token.
    pub async fn start_session(&self, session_id: &str) -> Result<IssuedToken, EngineError> {
        let mut session = self.session(session_id).await?;
        let now = Utc::now();
        session.open_window(now, Duration::minutes(self.config.sessions.attendance_window_minutes));
        self.sessions.upsert(session.clone()).await?;

        let issued = self.tokens.issue(&session.id, &session.room_id).await?;
        info!(
            session_id = %session.id,
            room_id = %session.room_id,
            window_end = ?session.window_end,
            "session started"
        );
        Ok(issued)
    }

    /// Complete a session: close the window, invalidate its token, stop random checks and stamp
    /// exit times on present records that lack one.
    pub async fn end_session(&self, session_id: &str) -> Result<Session, EngineError> {
        let mut session = self.session(session_id).await?;
        let now = Utc::now();
        session.status = SessionStatus::Completed;
        if session.window_end.is_some_and(|end| end > now) {
            session.window_end = Some(now);
        }
        self.sessions.upsert(session.clone()).await?;

        self.scheduler.cancel_session(session_id);
        self.tokens.invalidate_session(session_id).await?;

        let present: Vec<AttendanceRecord> = self
            .records
            .for_session(session_id)
            .await?
            .into_iter()
            .filter(|r| r.is_present() && r.exit_time.is_none())
            .collect();
        for record in &present {
            self.records
                .update(
                    &record.user_id,
                    session_id,
                    Box::new(move |r| {
                        if r.exit_time.is_some() {
                            return false;
                        }
                        r.exit_time = Some(now);
                        r.updated_at = now;
                        true
                    }),
                )
                .await?;
        }

        info!(session_id = %session_id, stamped = present.len(), "session ended");
        Ok(session)
    }

    /// Record that a user left the room.
    pub async fn record_exit(&self, session_id: &str, user_id: &str) -> Result<AttendanceRecord, EngineError> {
        let now = Utc::now();
        let outcome = self
            .records
            .update(
                user_id,
                session_id,
                Box::new(move |r| {
                    r.exit_time = Some(now);
                    r.updated_at = now;
                    true
                }),
            )
            .await?;
        self.scheduler.cancel(session_id, user_id);
        outcome.record().ok_or_else(|| record_not_found(user_id, session_id))
    }

    /// Delete a session with its records and token.
    pub async fn delete_session(&self, session_id: &str) -> Result<usize, EngineError> {
        self.scheduler.cancel_session(session_id);
        self.tokens.invalidate_session(session_id).await?;
        let removed = self.records.delete_session(session_id).await?;
        self.sessions.delete(session_id).await?;
        info!(session_id = %session_id, records = removed, "session deleted");
        Ok(removed)
    }

    /// Delete every record of a user.
    pub async fn delete_user(&self, user_id: &str) -> Result<usize, EngineError> {
        self.scheduler.cancel_user(user_id);
        let removed = self.records.delete_user(user_id).await?;
        info!(user_id = %user_id, records = removed, "user records deleted");
        Ok(removed)
    }

    // =========================================================================
    // TOKENS
    // =========================================================================

    pub async fn issue_token(&self, session_id: &str) -> Result<IssuedToken, EngineError> {
        let session = self.session(session_id).await?;
        Ok(self.tokens.issue(&session.id, &session.room_id).await?)
    }

    pub async fn rotate_token(&self, session_id: &str) -> Result<IssuedToken, EngineError> {
        let session = self.session(session_id).await?;
        Ok(self.tokens.rotate(&session.id, &session.room_id).await?)
    }

    pub async fn invalidate_token(&self, token: &str) -> Result<(), EngineError> {
        Ok(self.tokens.invalidate(token).await?)
    }

    pub async fn current_token(&self, session_id: &str) -> Result<Option<PresenceToken>, EngineError> {
        Ok(self.tokens.current(session_id).await?)
    }

    pub async fn token_usage(&self, token: &str) -> Result<TokenUsage, EngineError> {
        Ok(self.tokens.usage(token).await?)
    }

    // =========================================================================
    // CLAIMS
    // =========================================================================

    /// Score a presence claim and persist the resulting record.
    pub async fn submit_claim(
        &self,
        session_id: &str,
        user_id: &str,
        claim: VerificationClaim,
    ) -> Result<ClaimOutcome, ClaimRejection> {
        self.submit_claim_at(session_id, user_id, claim, Utc::now()).await
    }

    /// Score a claim as if received at `now`.
    pub async fn submit_claim_at(
        &self,
        session_id: &str,
        user_id: &str,
        claim: VerificationClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, ClaimRejection> {
        let session = match self.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => return Err(ClaimRejection::SessionNotFound),
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "session lookup failed");
                return Err(ClaimRejection::SessionNotFound);
            }
        };

        let existing = self.records.get(user_id, session_id).await.unwrap_or_else(|err| {
            warn!(session_id = %session_id, user_id = %user_id, error = %err, "existing record unreadable, treating as new");
            None
        });

        let verdict = self
            .aggregator
            .evaluate(&session, existing.as_ref(), user_id, &claim, now)
            .await?;

        let mut record = existing.unwrap_or_else(|| AttendanceRecord::new(user_id, session_id, now));
        verdict.apply_to(&mut record, &claim, now);
        if verdict.redemptions > 1 {
            debug!(session_id = %session_id, redemptions = verdict.redemptions, "presence token shared");
        }

        let assessment = self.assess(&record, now).await;
        assessment.apply_to(&mut record);
        if record.is_present() && record.risk_score >= self.config.risk.review_threshold {
            record.requires_review = true;
            record.review_reason = Some(format!(
                "risk score {} at or above {}",
                record.risk_score, self.config.risk.review_threshold
            ));
        }

        // A concurrent claim may have admitted the user since `existing` was read.
        let guard: ReplaceGuard = Box::new(|stored: &AttendanceRecord| !stored.is_present() && !stored.is_finalized());
        let persisted = match self.records.upsert_if(record.clone(), guard).await {
            Ok(WriteOutcome::Written) => true,
            Ok(WriteOutcome::Refused(stored)) => {
                debug!(session_id = %session_id, user_id = %user_id, status = %stored.status, "claim lost to a concurrent claim");
                return Err(if stored.is_finalized() {
                    ClaimRejection::RecordFinalized
                } else {
                    ClaimRejection::AlreadyMarked
                });
            }
            Err(err) => {
                warn!(session_id = %session_id, user_id = %user_id, error = %err, "attendance record not persisted");
                false
            }
        };

        for peer in &assessment.batch_peers {
            self.flag_batch_peer(session_id, peer).await;
        }

        if persisted && record.is_present() {
            self.scheduler.schedule(&session, user_id, now);
        }

        info!(
            session_id = %session_id,
            user_id = %user_id,
            status = %record.status,
            score = record.verification.total,
            risk = record.risk_score,
            "claim recorded"
        );

        Ok(ClaimOutcome {
            record_id: record.id,
            status: record.status,
            score: record.verification.total,
            reason: record.review_reason.clone(),
            result: record.verification,
            risk_score: record.risk_score,
            anomaly_tags: record.anomaly_flags,
            requires_review: record.requires_review,
            persisted,
        })
    }

    /// Run the risk engine for a record. Store failures reduce it to claim-level signals.
    async fn assess(&self, record: &AttendanceRecord, now: DateTime<Utc>) -> rollcall_risk::RiskAssessment {
        let since = now - Duration::days(self.config.risk.window_days);
        let history = self.records.history(&record.user_id, since).await.unwrap_or_else(|err| {
            warn!(user_id = %record.user_id, error = %err, "history unavailable, pattern heuristics skipped");
            Vec::new()
        });
        let history: Vec<AttendanceRecord> = history
            .into_iter()
            .filter(|r| r.session_id != record.session_id)
            .collect();

        let peers = self.records.for_session(&record.session_id).await.unwrap_or_else(|err| {
            warn!(session_id = %record.session_id, error = %err, "session records unavailable, batch check skipped");
            Vec::new()
        });

        self.risk.evaluate(record, &history, &peers)
    }

    async fn flag_batch_peer(&self, session_id: &str, user_id: &str) {
        let points = self.config.risk.points.batch_marking;
        let review_threshold = self.config.risk.review_threshold;
        let update = Box::new(move |r: &mut AttendanceRecord| {
            if !r.flag(AnomalyTag::BatchMarking, points) {
                return false;
            }
            if r.is_present() && r.risk_score >= review_threshold && !r.is_finalized() {
                r.requires_review = true;
                r.review_reason.get_or_insert_with(|| "batch marking".to_string());
            }
            r.updated_at = Utc::now();
            true
        });
        if let Err(err) = self.records.update(user_id, session_id, update).await {
            warn!(session_id = %session_id, user_id = %user_id, error = %err, "batch peer not flagged");
        }
    }

    /// Answer an open random presence check.
    pub async fn respond_to_challenge(
        &self,
        session_id: &str,
        user_id: &str,
        challenge_id: Uuid,
        location: GeoLocation,
        face: Option<FaceSample>,
    ) -> Result<bool, EngineError> {
        let passed = self
            .scheduler
            .respond(session_id, user_id, challenge_id, ChallengeResponse { location, face })
            .await?;
        Ok(passed)
    }

    // =========================================================================
    // RISK AND REVIEW
    // =========================================================================

    /// Risk for one session's record, or over the user's recent history when no session is given.
    pub async fn get_risk(&self, user_id: &str, session_id: Option<&str>) -> Result<RiskView, EngineError> {
        if let Some(session_id) = session_id {
            let record = self
                .records
                .get(user_id, session_id)
                .await?
                .ok_or_else(|| record_not_found(user_id, session_id))?;
            return Ok(RiskView {
                risk_score: record.risk_score,
                anomaly_tags: record.anomaly_flags,
            });
        }

        let since = Utc::now() - Duration::days(self.config.risk.window_days);
        let mut history = self.records.history(user_id, since).await?;
        history.sort_by_key(|r| r.marked_at);
        let Some(latest) = history.pop() else {
            return Ok(RiskView::default());
        };
        // Start from what the record already carries so both views agree.
        let mut latest = latest;
        let peers = self.records.for_session(&latest.session_id).await?;
        self.risk.evaluate(&latest, &history, &peers).apply_to(&mut latest);
        Ok(RiskView {
            risk_score: latest.risk_score,
            anomaly_tags: latest.anomaly_flags,
        })
    }

    /// Resolve a record by hand. Approval marks it present, rejection absent.
    pub async fn review(
        &self,
        session_id: &str,
        user_id: &str,
        reviewer: &str,
        decision: ReviewDecision,
        notes: Option<String>,
    ) -> Result<AttendanceRecord, EngineError> {
        let now = Utc::now();
        let review = ManualReview {
            reviewer: reviewer.to_string(),
            decision,
            notes,
            reviewed_at: now,
        };
        let outcome = self
            .records
            .update(
                user_id,
                session_id,
                Box::new(move |r| {
                    if r.is_finalized() {
                        return false;
                    }
                    r.status = match decision {
                        ReviewDecision::Approve => AttendanceStatus::Present,
                        ReviewDecision::Reject => AttendanceStatus::Absent,
                    };
                    r.review = Some(review);
                    r.requires_review = false;
                    r.updated_at = now;
                    true
                }),
            )
            .await?;

        let record = match outcome {
            UpdateOutcome::Missing => return Err(record_not_found(user_id, session_id)),
            UpdateOutcome::Unchanged(_) => return Err(EngineError::AlreadyReviewed),
            UpdateOutcome::Updated(record) => record,
        };

        if decision == ReviewDecision::Reject {
            self.scheduler.cancel(session_id, user_id);
        }
        info!(
            session_id = %session_id,
            user_id = %user_id,
            reviewer = %reviewer,
            status = %record.status,
            "attendance reviewed"
        );
        Ok(record)
    }

    /// Records waiting for a reviewer, optionally for one session.
    pub async fn pending_reviews(&self, session_id: Option<&str>) -> Result<Vec<AttendanceRecord>, EngineError> {
        let query = RecordQuery {
            session_id: session_id.map(str::to_string),
            awaiting_review: true,
            ..Default::default()
        };
        Ok(self.records.query(&query).await?)
    }

    /// Records at or above `min_risk` (default `risk.report_min_risk`), highest risk first.
    pub async fn anomaly_report(&self, min_risk: Option<u32>) -> Result<AnomalyReport, EngineError> {
        let min_risk = min_risk.unwrap_or(self.config.risk.report_min_risk);
        let query = RecordQuery {
            min_risk: Some(min_risk),
            ..Default::default()
        };
        let mut records = self.records.query(&query).await?;
        records.sort_by(|a, b| b.risk_score.cmp(&a.risk_score).then(a.created_at.cmp(&b.created_at)));

        let mut by_tag = BTreeMap::new();
        for tag in records.iter().flat_map(|r| r.anomaly_flags.iter()) {
            *by_tag.entry(*tag).or_insert(0) += 1;
        }
        Ok(AnomalyReport {
            min_risk,
            records,
            by_tag,
        })
    }
}

fn record_not_found(user_id: &str, session_id: &str) -> EngineError {
    EngineError::RecordNotFound {
        user_id: user_id.to_string(),
        session_id: session_id.to_string(),
    }
}
