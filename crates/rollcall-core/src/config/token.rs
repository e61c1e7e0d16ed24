//! Presence token configuration.

use serde::{Deserialize, Serialize};

/// Configuration for presence token issuance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Validity window of a freshly issued token, in seconds.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Prefix for every key written to the token store.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    300
}

fn default_key_prefix() -> String {
    "presence".to_string()
}
