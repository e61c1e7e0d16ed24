//! Random presence checks.
//!
//! Once a claim is admitted, the scheduler spreads `challenges.count` checks evenly over what is
//! left of the class. Each check asks the user for a fresh location (and optionally a face
//! sample) within `challenges.timeout_secs`.
//!
//! # Task model
//!
//! One tokio task per (session, user). The task owns the timeline; responses arrive through
//! [`ChallengeScheduler::respond`]. An open challenge is claimed by whichever side removes it from
//! the pending map first: the responder records the answer, the task records a timeout. Each task
//! watches a cancellation signal that fires on session end, reviewer overturn or deletion.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::{AnomalyTag, AttendanceRecord, ChallengeConfig, ChallengeOutcome, FaceSample, GeoLocation, Session};
use rollcall_verify::{FaceEvaluator, Geofence};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::ChallengeError;
use crate::store::{AttendanceStore, SessionStore, UpdateOutcome};

/// A delivered random presence check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Challenge {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// A user's answer to a challenge.
#[derive(Debug, Clone)]
pub struct ChallengeResponse {
    pub location: GeoLocation,
    pub face: Option<FaceSample>,
}

/// Pushes challenges to user devices.
#[async_trait]
pub trait ChallengeNotifier: Send + Sync {
    async fn deliver(&self, challenge: &Challenge) -> Result<(), ChallengeError>;
}

/// Notifier that only logs. Useful when devices poll for open challenges.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl ChallengeNotifier for LogNotifier {
    async fn deliver(&self, challenge: &Challenge) -> Result<(), ChallengeError> {
        info!(
            challenge_id = %challenge.id,
            session_id = %challenge.session_id,
            user_id = %challenge.user_id,
            expires_at = %challenge.expires_at,
            "random presence check issued"
        );
        Ok(())
    }
}

type TaskKey = (String, String);

struct PendingChallenge {
    challenge: Challenge,
    answered: oneshot::Sender<()>,
}

#[derive(Default)]
struct SchedulerState {
    tasks: HashMap<TaskKey, (u64, watch::Sender<bool>)>,
    pending: HashMap<Uuid, PendingChallenge>,
}

struct Inner {
    config: ChallengeConfig,
    failed_check_points: u32,
    records: Arc<dyn AttendanceStore>,
    sessions: Arc<dyn SessionStore>,
    geofence: Arc<Geofence>,
    face: Arc<dyn FaceEvaluator>,
    notifier: Arc<dyn ChallengeNotifier>,
    state: Mutex<SchedulerState>,
    next_task: AtomicU64,
}

/// Schedules, delivers and scores random presence checks.
#[derive(Clone)]
pub struct ChallengeScheduler {
    inner: Arc<Inner>,
}

impl ChallengeScheduler {
    pub fn new(
        config: ChallengeConfig,
        failed_check_points: u32,
        records: Arc<dyn AttendanceStore>,
        sessions: Arc<dyn SessionStore>,
        geofence: Arc<Geofence>,
        face: Arc<dyn FaceEvaluator>,
        notifier: Arc<dyn ChallengeNotifier>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                failed_check_points,
                records,
                sessions,
                geofence,
                face,
                notifier,
                state: Mutex::new(SchedulerState::default()),
                next_task: AtomicU64::new(1),
            }),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SchedulerState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start checks for an admitted user. Returns `false` when disabled, already scheduled or
    /// admitted after the class ended.
    pub fn schedule(&self, session: &Session, user_id: &str, admitted_at: DateTime<Utc>) -> bool {
        let config = &self.inner.config;
        if !config.enabled || config.count == 0 {
            return false;
        }

        let remaining = session.remaining_after(admitted_at).to_std().unwrap_or_default();
        if remaining.is_zero() {
            debug!(session_id = %session.id, user_id = %user_id, "class over, no presence checks");
            return false;
        }

        let key = (session.id.clone(), user_id.to_string());
        let task_id = self.inner.next_task.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        {
            let mut state = self.state();
            if state.tasks.contains_key(&key) {
                return false;
            }
            state.tasks.insert(key.clone(), (task_id, cancel_tx));
        }

        let interval = remaining / (config.count + 1);
        debug!(
            session_id = %session.id,
            user_id = %user_id,
            interval_secs = interval.as_secs(),
            "random presence checks scheduled"
        );

        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.run(key.clone(), interval, cancel_rx).await;
            scheduler.finish(&key, task_id);
        });
        true
    }

    /// Whether checks are still running for a user.
    pub fn is_scheduled(&self, session_id: &str, user_id: &str) -> bool {
        self.state()
            .tasks
            .contains_key(&(session_id.to_string(), user_id.to_string()))
    }

    /// Open challenges for a user.
    pub fn open_challenges(&self, session_id: &str, user_id: &str) -> Vec<Challenge> {
        self.state()
            .pending
            .values()
            .filter(|p| p.challenge.session_id == session_id && p.challenge.user_id == user_id)
            .map(|p| p.challenge.clone())
            .collect()
    }

    /// Stop checks for one user. Open challenges are dropped unanswered.
    pub fn cancel(&self, session_id: &str, user_id: &str) {
        self.cancel_where(|(session, user)| session == session_id && user == user_id);
    }

    /// Stop checks for everyone in a session.
    pub fn cancel_session(&self, session_id: &str) {
        self.cancel_where(|(session, _)| session == session_id);
    }

    /// Stop checks for a user across all sessions.
    pub fn cancel_user(&self, user_id: &str) {
        self.cancel_where(|(_, user)| user == user_id);
    }

    fn cancel_where(&self, matches: impl Fn(&TaskKey) -> bool) {
        let mut state = self.state();
        let keys: Vec<TaskKey> = state.tasks.keys().filter(|k| matches(k)).cloned().collect();
        for key in &keys {
            if let Some((_, cancel)) = state.tasks.remove(key) {
                let _ = cancel.send(true);
            }
        }
        state
            .pending
            .retain(|_, p| !matches(&(p.challenge.session_id.clone(), p.challenge.user_id.clone())));
        if !keys.is_empty() {
            debug!(cancelled = keys.len(), "random presence checks cancelled");
        }
    }

    fn finish(&self, key: &TaskKey, task_id: u64) {
        let mut state = self.state();
        if state.tasks.get(key).is_some_and(|(id, _)| *id == task_id) {
            state.tasks.remove(key);
        }
    }

    async fn run(&self, key: TaskKey, interval: Duration, mut cancel: watch::Receiver<bool>) {
        let (session_id, user_id) = (&key.0, &key.1);
        let timeout = Duration::from_secs(self.inner.config.timeout_secs);
        let start = Instant::now();

        for round in 1..=self.inner.config.count {
            tokio::select! {
                _ = tokio::time::sleep_until(start + interval * round) => {}
                _ = cancelled(&mut cancel) => return,
            }

            if !self.still_eligible(session_id, user_id).await {
                debug!(session_id = %session_id, user_id = %user_id, "random presence checks stopped");
                return;
            }

            let now = Utc::now();
            let challenge = Challenge {
                id: Uuid::new_v4(),
                session_id: session_id.clone(),
                user_id: user_id.clone(),
                issued_at: now,
                expires_at: now + chrono::Duration::seconds(self.inner.config.timeout_secs as i64),
            };
            let (answered_tx, answered_rx) = oneshot::channel();
            self.state().pending.insert(
                challenge.id,
                PendingChallenge {
                    challenge: challenge.clone(),
                    answered: answered_tx,
                },
            );

            if let Err(err) = self.inner.notifier.deliver(&challenge).await {
                warn!(session_id = %session_id, user_id = %user_id, error = %err, "random presence check skipped");
                self.state().pending.remove(&challenge.id);
                continue;
            }

            tokio::select! {
                _ = answered_rx => {}
                _ = tokio::time::sleep(timeout) => {
                    let expired = self.state().pending.remove(&challenge.id);
                    if expired.is_some() {
                        let outcome = ChallengeOutcome {
                            challenge_id: challenge.id,
                            issued_at: challenge.issued_at,
                            responded_at: None,
                            passed: false,
                            timed_out: true,
                            distance_m: None,
                        };
                        self.record(session_id, user_id, outcome).await;
                    }
                }
                _ = cancelled(&mut cancel) => return,
            }
        }
    }

    async fn still_eligible(&self, session_id: &str, user_id: &str) -> bool {
        let session_active = matches!(self.inner.sessions.get(session_id).await, Ok(Some(s)) if s.is_active());
        let present = matches!(
            self.inner.records.get(user_id, session_id).await,
            Ok(Some(r)) if r.is_present()
        );
        session_active && present
    }

    /// Score a response to an open challenge. Returns whether the check passed.
    pub async fn respond(
        &self,
        session_id: &str,
        user_id: &str,
        challenge_id: Uuid,
        response: ChallengeResponse,
    ) -> Result<bool, ChallengeError> {
        let pending = {
            let mut state = self.state();
            let owned = state
                .pending
                .get(&challenge_id)
                .is_some_and(|p| p.challenge.session_id == session_id && p.challenge.user_id == user_id);
            if owned { state.pending.remove(&challenge_id) } else { None }
        }
        .ok_or(ChallengeError::NotOpen(challenge_id))?;

        // Dropping `pending` releases the task, which then stops on its own eligibility check.
        if !self.still_eligible(session_id, user_id).await {
            debug!(session_id = %session_id, user_id = %user_id, "late answer to a presence check ignored");
            return Err(ChallengeError::NotOpen(challenge_id));
        }

        let session = match self.inner.sessions.get(session_id).await {
            Ok(Some(session)) => session,
            _ => return Err(ChallengeError::SessionNotFound(session_id.to_string())),
        };

        let check = self.inner.geofence.verify(&response.location, &session.room_id);
        let face_ok = match &response.face {
            Some(sample) => match self.inner.face.evaluate(user_id, sample).await {
                Ok(score) => score.verified,
                Err(err) => {
                    warn!(user_id = %user_id, error = %err, "face unavailable for presence check, using location only");
                    !self.inner.config.require_face
                }
            },
            None => !self.inner.config.require_face,
        };
        let passed = check.valid && face_ok;

        let outcome = ChallengeOutcome {
            challenge_id,
            issued_at: pending.challenge.issued_at,
            responded_at: Some(Utc::now()),
            passed,
            timed_out: false,
            distance_m: check.distance_m,
        };
        self.record(session_id, user_id, outcome).await;
        let _ = pending.answered.send(());

        info!(session_id = %session_id, user_id = %user_id, passed, "random presence check answered");
        Ok(passed)
    }

    /// Append an outcome and flag the record once failures exceed the threshold.
    async fn record(&self, session_id: &str, user_id: &str, outcome: ChallengeOutcome) {
        let threshold = self.inner.config.failure_threshold() as usize;
        let points = self.inner.failed_check_points;
        let update = Box::new(move |record: &mut AttendanceRecord| {
            record.challenges.push(outcome);
            if record.failed_challenges() > threshold && record.flag(AnomalyTag::FailedRandomChecks, points) {
                record.requires_review = true;
                record
                    .review_reason
                    .get_or_insert_with(|| "failed random presence checks".to_string());
            }
            record.updated_at = Utc::now();
            true
        });

        match self.inner.records.update(user_id, session_id, update).await {
            Ok(UpdateOutcome::Missing) => {
                debug!(session_id = %session_id, user_id = %user_id, "record gone, presence check dropped")
            }
            Ok(_) => {}
            Err(err) => warn!(session_id = %session_id, user_id = %user_id, error = %err, "presence check not recorded"),
        }
    }
}

/// Resolves once cancellation is signalled or the scheduler side is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    let _ = cancel.wait_for(|c| *c).await;
}
