//! Attendance history and session stores.
//!
//! The engine does not own persistence. It talks to these traits, and deployments back them
//! with their database of choice. The in-memory implementations serve tests, simulations and
//! single-process deployments.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rollcall_core::{AttendanceRecord, Session};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::HistoryError;

/// Mutation applied to a record under the store's lock. Returns whether it changed anything.
pub type RecordUpdate = Box<dyn FnOnce(&mut AttendanceRecord) -> bool + Send>;

/// Result of [`AttendanceStore::update`].
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Missing,
    Unchanged(AttendanceRecord),
    Updated(AttendanceRecord),
}

impl UpdateOutcome {
    pub fn record(self) -> Option<AttendanceRecord> {
        match self {
            UpdateOutcome::Missing => None,
            UpdateOutcome::Unchanged(record) | UpdateOutcome::Updated(record) => Some(record),
        }
    }
}

/// Decides, under the store's lock, whether the stored record may be replaced.
pub type ReplaceGuard = Box<dyn FnOnce(&AttendanceRecord) -> bool + Send>;

/// Result of [`AttendanceStore::upsert_if`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    Written,
    /// The guard refused; carries the record that stayed in place.
    Refused(AttendanceRecord),
}

/// Filter for [`AttendanceStore::query`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordQuery {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub min_risk: Option<u32>,
    /// Routed to review and not yet reviewed.
    pub awaiting_review: bool,
    pub since: Option<DateTime<Utc>>,
}

impl RecordQuery {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        self.session_id.as_ref().is_none_or(|s| &record.session_id == s)
            && self.user_id.as_ref().is_none_or(|u| &record.user_id == u)
            && self.min_risk.is_none_or(|min| record.risk_score >= min)
            && (!self.awaiting_review || (record.requires_review && !record.is_finalized()))
            && self.since.is_none_or(|since| record.created_at >= since)
    }
}

/// Attendance records keyed by (user, session).
#[async_trait]
pub trait AttendanceStore: Send + Sync {
    async fn get(&self, user_id: &str, session_id: &str) -> Result<Option<AttendanceRecord>, HistoryError>;

    /// Insert or overwrite the record for its (user, session) pair.
    async fn upsert(&self, record: AttendanceRecord) -> Result<(), HistoryError>;

    /// Insert the record, or replace the stored one only when `guard` accepts it. Atomic.
    async fn upsert_if(&self, record: AttendanceRecord, guard: ReplaceGuard) -> Result<WriteOutcome, HistoryError>;

    /// Atomically read-modify-write one record.
    async fn update(&self, user_id: &str, session_id: &str, f: RecordUpdate) -> Result<UpdateOutcome, HistoryError>;

    /// Records matching `query`, oldest first.
    async fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, HistoryError>;

    /// The user's records created at or after `since`, oldest first.
    async fn history(&self, user_id: &str, since: DateTime<Utc>) -> Result<Vec<AttendanceRecord>, HistoryError> {
        self.query(&RecordQuery {
            user_id: Some(user_id.to_string()),
            since: Some(since),
            ..Default::default()
        })
        .await
    }

    async fn for_session(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, HistoryError> {
        self.query(&RecordQuery::session(session_id)).await
    }

    /// Remove every record of a session. Returns how many were removed.
    async fn delete_session(&self, session_id: &str) -> Result<usize, HistoryError>;

    /// Remove every record of a user. Returns how many were removed.
    async fn delete_user(&self, user_id: &str) -> Result<usize, HistoryError>;
}

/// Sessions keyed by id.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, HistoryError>;

    async fn upsert(&self, session: Session) -> Result<(), HistoryError>;

    async fn delete(&self, session_id: &str) -> Result<bool, HistoryError>;
}

type RecordKey = (String, String);

fn key(user_id: &str, session_id: &str) -> RecordKey {
    (user_id.to_string(), session_id.to_string())
}

/// In-memory [`AttendanceStore`].
#[derive(Debug, Default)]
pub struct MemoryAttendanceStore {
    records: RwLock<HashMap<RecordKey, AttendanceRecord>>,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn get(&self, user_id: &str, session_id: &str) -> Result<Option<AttendanceRecord>, HistoryError> {
        let records = self.records.read().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(records.get(&key(user_id, session_id)).cloned())
    }

    async fn upsert(&self, record: AttendanceRecord) -> Result<(), HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        records.insert(key(&record.user_id, &record.session_id), record);
        Ok(())
    }

    async fn upsert_if(&self, record: AttendanceRecord, guard: ReplaceGuard) -> Result<WriteOutcome, HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        let key = key(&record.user_id, &record.session_id);
        if let Some(stored) = records.get(&key) {
            if !guard(stored) {
                return Ok(WriteOutcome::Refused(stored.clone()));
            }
        }
        records.insert(key, record);
        Ok(WriteOutcome::Written)
    }

    async fn update(&self, user_id: &str, session_id: &str, f: RecordUpdate) -> Result<UpdateOutcome, HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        let Some(record) = records.get_mut(&key(user_id, session_id)) else {
            return Ok(UpdateOutcome::Missing);
        };
        if f(record) {
            Ok(UpdateOutcome::Updated(record.clone()))
        } else {
            Ok(UpdateOutcome::Unchanged(record.clone()))
        }
    }

    async fn query(&self, query: &RecordQuery) -> Result<Vec<AttendanceRecord>, HistoryError> {
        let records = self.records.read().map_err(|_| HistoryError::LockPoisoned)?;
        let mut found: Vec<AttendanceRecord> = records.values().filter(|r| query.matches(r)).cloned().collect();
        found.sort_by_key(|r| r.created_at);
        Ok(found)
    }

    async fn delete_session(&self, session_id: &str) -> Result<usize, HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        let before = records.len();
        records.retain(|(_, session), _| session != session_id);
        Ok(before - records.len())
    }

    async fn delete_user(&self, user_id: &str) -> Result<usize, HistoryError> {
        let mut records = self.records.write().map_err(|_| HistoryError::LockPoisoned)?;
        let before = records.len();
        records.retain(|(user, _), _| user != user_id);
        Ok(before - records.len())
    }
}

/// In-memory [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get(&self, session_id: &str) -> Result<Option<Session>, HistoryError> {
        let sessions = self.sessions.read().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(sessions.get(session_id).cloned())
    }

    async fn upsert(&self, session: Session) -> Result<(), HistoryError> {
        let mut sessions = self.sessions.write().map_err(|_| HistoryError::LockPoisoned)?;
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn delete(&self, session_id: &str) -> Result<bool, HistoryError> {
        let mut sessions = self.sessions.write().map_err(|_| HistoryError::LockPoisoned)?;
        Ok(sessions.remove(session_id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rollcall_core::AttendanceStatus;

    #[tokio::test]
    async fn test_update_reports_missing_and_unchanged() {
        let store = MemoryAttendanceStore::new();
        let outcome = store.update("u1", "s1", Box::new(|_| true)).await.unwrap();
        assert_eq!(outcome, UpdateOutcome::Missing);

        store.upsert(AttendanceRecord::new("u1", "s1", Utc::now())).await.unwrap();
        let outcome = store.update("u1", "s1", Box::new(|_| false)).await.unwrap();
        assert!(matches!(outcome, UpdateOutcome::Unchanged(_)));

        let outcome = store
            .update(
                "u1",
                "s1",
                Box::new(|r| {
                    r.status = AttendanceStatus::Absent;
                    true
                }),
            )
            .await
            .unwrap();
        assert_eq!(outcome.record().unwrap().status, AttendanceStatus::Absent);
    }

    #[tokio::test]
    async fn test_upsert_if_keeps_refused_record() {
        let store = MemoryAttendanceStore::new();
        let now = Utc::now();
        let guard = || -> ReplaceGuard { Box::new(|stored: &AttendanceRecord| !stored.is_present()) };

        let first = AttendanceRecord::new("u1", "s1", now);
        assert_eq!(store.upsert_if(first, guard()).await.unwrap(), WriteOutcome::Written);

        let mut present = AttendanceRecord::new("u1", "s1", now);
        present.status = AttendanceStatus::Present;
        assert_eq!(store.upsert_if(present.clone(), guard()).await.unwrap(), WriteOutcome::Written);

        let late = AttendanceRecord::new("u1", "s1", now);
        let outcome = store.upsert_if(late, guard()).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Refused(present.clone()));
        assert_eq!(store.get("u1", "s1").await.unwrap(), Some(present));
    }

    #[tokio::test]
    async fn test_history_window_and_cascade() {
        let store = MemoryAttendanceStore::new();
        let now = Utc::now();
        store.upsert(AttendanceRecord::new("u1", "old", now - Duration::days(40))).await.unwrap();
        store.upsert(AttendanceRecord::new("u1", "s1", now - Duration::days(2))).await.unwrap();
        store.upsert(AttendanceRecord::new("u1", "s2", now)).await.unwrap();
        store.upsert(AttendanceRecord::new("u2", "s1", now)).await.unwrap();

        let history = store.history("u1", now - Duration::days(30)).await.unwrap();
        let sessions: Vec<&str> = history.iter().map(|r| r.session_id.as_str()).collect();
        assert_eq!(sessions, vec!["s1", "s2"]);

        assert_eq!(store.delete_session("s1").await.unwrap(), 2);
        assert_eq!(store.delete_user("u1").await.unwrap(), 2);
        assert!(store.for_session("s2").await.unwrap().is_empty());
    }
}
