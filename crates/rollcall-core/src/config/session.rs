//! Session lifecycle configuration.

use serde::{Deserialize, Serialize};

/// Configuration applied when a session is started.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long the attendance window stays open after the session starts.
    #[serde(default = "default_attendance_window_minutes")]
    pub attendance_window_minutes: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            attendance_window_minutes: default_attendance_window_minutes(),
        }
    }
}

fn default_attendance_window_minutes() -> i64 {
    15
}
