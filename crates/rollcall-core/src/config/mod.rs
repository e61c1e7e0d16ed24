//! Configuration types for the Rollcall engine.
//!
//! Configuration is loaded from a single YAML file (`rollcall.yaml`). Every field has a default,
//! so an empty document is a valid configuration with no rooms registered.
//!
//! # Sections
//!
//! - **tokens**: presence token lifetime and store key prefix
//! - **geofence**: GPS accuracy ceiling, room registry, campus boundary
//! - **scoring**: factor weights, pass threshold, evaluator thresholds
//! - **risk**: history window, heuristic thresholds and points
//! - **challenges**: random presence check count and timeout
//! - **sessions**: attendance window length

pub mod challenge;
pub mod geofence;
pub mod risk;
pub mod scoring;
pub mod session;
pub mod token;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub use challenge::ChallengeConfig;
pub use geofence::{CampusConfig, GeofenceConfig, RoomConfig};
pub use risk::{RiskConfig, RiskPoints};
pub use scoring::{FactorWeights, ScoringConfig};
pub use session::SessionConfig;
pub use token::TokenConfig;

use crate::MAX_SCORE;

/// Complete Rollcall configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollcallConfig {
    /// Deployment name, informational.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub tokens: TokenConfig,

    #[serde(default)]
    pub geofence: GeofenceConfig,

    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub challenges: ChallengeConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RollcallConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML content.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(ConfigError::from)
    }

    /// Load and validate in one step.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make scoring or geofencing incoherent.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tokens.ttl_secs == 0 {
            return Err(ConfigError::Config("tokens.ttl_secs must be greater than zero".into()));
        }

        let total = self.scoring.weights.total();
        if total != MAX_SCORE {
            return Err(ConfigError::Config(format!(
                "scoring.weights must sum to {}, got {}",
                MAX_SCORE, total
            )));
        }

        if self.scoring.pass_threshold > MAX_SCORE {
            return Err(ConfigError::Config(format!(
                "scoring.pass_threshold must be at most {}",
                MAX_SCORE
            )));
        }

        if self.geofence.edge_warning_radius_m >= self.geofence.default_radius_m {
            return Err(ConfigError::Config(
                "geofence.edge_warning_radius_m must be inside geofence.default_radius_m".into(),
            ));
        }

        for (id, room) in &self.geofence.rooms {
            if !(-90.0..=90.0).contains(&room.lat) || !(-180.0..=180.0).contains(&room.lng) {
                return Err(ConfigError::Config(format!("room {} has invalid coordinates", id)));
            }
            if let Some(radius) = room.radius_m {
                if radius <= 0.0 {
                    return Err(ConfigError::Config(format!("room {} radius must be positive", id)));
                }
            }
        }

        if self.risk.review_threshold > MAX_SCORE {
            return Err(ConfigError::Config(format!(
                "risk.review_threshold must be at most {}",
                MAX_SCORE
            )));
        }

        if self.sessions.attendance_window_minutes <= 0 {
            return Err(ConfigError::Config(
                "sessions.attendance_window_minutes must be positive".into(),
            ));
        }

        Ok(())
    }
}
