//! Random presence check configuration.

use serde::{Deserialize, Serialize};

/// Configuration for follow-up presence challenges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// Whether admitted users receive follow-up challenges at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Challenges per admitted record.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Seconds a user has to answer a delivered challenge.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Require a fresh face sample in every response.
    #[serde(default)]
    pub require_face: bool,

    /// Failures tolerated before the record is tagged. Defaults to half of `count`,
    /// so a failed majority triggers the tag.
    #[serde(default)]
    pub fail_threshold: Option<u32>,
}

impl ChallengeConfig {
    /// Number of failures that may be exceeded before `FAILED_RANDOM_CHECKS` is raised.
    pub fn failure_threshold(&self) -> u32 {
        self.fail_threshold.unwrap_or(self.count / 2)
    }
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            count: default_count(),
            timeout_secs: default_timeout_secs(),
            require_face: false,
            fail_threshold: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_count() -> u32 {
    3
}

fn default_timeout_secs() -> u64 {
    120
}
