//! Class sessions and their attendance window.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    Active,
    Completed,
    Cancelled,
}

/// The slice of the session entity the engine cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub room_id: String,
    pub status: SessionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_start: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_end: Option<DateTime<Utc>>,
    /// Scheduled class start.
    pub starts_at: DateTime<Utc>,
    /// Expected class end; random checks are spread up to this instant.
    pub ends_at: DateTime<Utc>,
}

impl Session {
    /// A scheduled session with no attendance window yet.
    pub fn scheduled(
        id: impl Into<String>,
        room_id: impl Into<String>,
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            room_id: room_id.into(),
            status: SessionStatus::Scheduled,
            window_start: None,
            window_end: None,
            starts_at,
            ends_at,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }

    /// Activate the session and open its attendance window at `now`.
    pub fn open_window(&mut self, now: DateTime<Utc>, length: Duration) {
        self.status = SessionStatus::Active;
        self.window_start = Some(now);
        self.window_end = Some(now + length);
    }

    /// Whether a claim arriving at `now` may be scored. Both window bounds are inclusive.
    pub fn accepts_claims_at(&self, now: DateTime<Utc>) -> bool {
        match (self.window_start, self.window_end) {
            (Some(start), Some(end)) => self.is_active() && now >= start && now <= end,
            _ => false,
        }
    }

    /// Time left until the expected end of the class, never negative.
    pub fn remaining_after(&self, instant: DateTime<Utc>) -> Duration {
        (self.ends_at - instant).max(Duration::zero())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_bounds_are_inclusive() {
        let now = Utc::now();
        let mut session = Session::scheduled("s1", "ROOM_101", now, now + Duration::hours(1));
        assert!(!session.accepts_claims_at(now));

        session.open_window(now, Duration::minutes(15));
        assert!(session.accepts_claims_at(now));
        assert!(session.accepts_claims_at(now + Duration::minutes(15)));
        assert!(!session.accepts_claims_at(now + Duration::minutes(15) + Duration::seconds(1)));
        assert!(!session.accepts_claims_at(now - Duration::seconds(1)));
    }

    #[test]
    fn test_inactive_session_rejects_inside_window() {
        let now = Utc::now();
        let mut session = Session::scheduled("s1", "ROOM_101", now, now + Duration::hours(1));
        session.open_window(now, Duration::minutes(15));
        session.status = SessionStatus::Completed;
        assert!(!session.accepts_claims_at(now + Duration::minutes(1)));
    }

    #[test]
    fn test_remaining_after_end_is_zero() {
        let now = Utc::now();
        let session = Session::scheduled("s1", "ROOM_101", now, now + Duration::minutes(30));
        assert_eq!(session.remaining_after(now), Duration::minutes(30));
        assert_eq!(session.remaining_after(now + Duration::hours(2)), Duration::zero());
    }
}
