//! Presence tokens and the payload rendered for scanning.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user redeeming a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    pub user_id: String,
    pub at: DateTime<Utc>,
}

/// A short-lived presence token bound to one session and room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceToken {
    pub token: String,
    pub session_id: String,
    pub room_id: String,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    /// Per-session rotation counter.
    #[serde(default)]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub redemptions: Vec<Redemption>,
}

impl PresenceToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.valid_until
    }

    pub fn payload(&self) -> TokenPayload {
        TokenPayload {
            session_id: self.session_id.clone(),
            token: self.token.clone(),
            room_id: self.room_id.clone(),
            issued_at: self.issued_at,
            valid_until: self.valid_until,
        }
    }
}

/// What the presentation layer encodes into the scannable code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub session_id: String,
    pub token: String,
    pub room_id: String,
    pub issued_at: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl TokenPayload {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}
