//! Verification scoring configuration.

use serde::{Deserialize, Serialize};

use crate::record::Factor;

/// Points each verified factor contributes. Must sum to 100.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorWeights {
    #[serde(default = "default_token_weight")]
    pub token: u32,
    #[serde(default = "default_face_weight")]
    pub face: u32,
    #[serde(default = "default_liveness_weight")]
    pub liveness: u32,
    #[serde(default = "default_location_weight")]
    pub location: u32,
    #[serde(default = "default_wireless_weight")]
    pub wifi: u32,
    #[serde(default = "default_wireless_weight")]
    pub beacon: u32,
}

impl FactorWeights {
    pub fn get(&self, factor: Factor) -> u32 {
        match factor {
            Factor::Token => self.token,
            Factor::Face => self.face,
            Factor::Liveness => self.liveness,
            Factor::Location => self.location,
            Factor::Wifi => self.wifi,
            Factor::Beacon => self.beacon,
        }
    }

    pub fn total(&self) -> u32 {
        Factor::ALL.iter().map(|f| self.get(*f)).sum()
    }
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            token: default_token_weight(),
            face: default_face_weight(),
            liveness: default_liveness_weight(),
            location: default_location_weight(),
            wifi: default_wireless_weight(),
            beacon: default_wireless_weight(),
        }
    }
}

/// Configuration for the verification aggregator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: FactorWeights,

    /// Minimum total score for automatic admission.
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u32,

    /// Minimum face-match confidence.
    #[serde(default = "default_face_threshold")]
    pub face_threshold: f64,

    /// Minimum liveness confidence.
    #[serde(default = "default_liveness_threshold")]
    pub liveness_threshold: f64,

    /// Weakest acceptable signal from a room access point, in dBm.
    #[serde(default = "default_wifi_min_signal_dbm")]
    pub wifi_min_signal_dbm: i32,

    /// Weakest acceptable RSSI from a room beacon.
    #[serde(default = "default_beacon_min_rssi")]
    pub beacon_min_rssi: i32,

    /// Calibrated beacon power at one meter, for distance estimation.
    #[serde(default = "default_beacon_tx_power")]
    pub beacon_tx_power: i32,

    /// Risk points added when a claim is marked from the geofence edge.
    #[serde(default = "default_edge_risk_points")]
    pub edge_risk_points: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: FactorWeights::default(),
            pass_threshold: default_pass_threshold(),
            face_threshold: default_face_threshold(),
            liveness_threshold: default_liveness_threshold(),
            wifi_min_signal_dbm: default_wifi_min_signal_dbm(),
            beacon_min_rssi: default_beacon_min_rssi(),
            beacon_tx_power: default_beacon_tx_power(),
            edge_risk_points: default_edge_risk_points(),
        }
    }
}

fn default_token_weight() -> u32 {
    25
}

fn default_face_weight() -> u32 {
    30
}

fn default_liveness_weight() -> u32 {
    15
}

fn default_location_weight() -> u32 {
    20
}

fn default_wireless_weight() -> u32 {
    5
}

fn default_pass_threshold() -> u32 {
    75
}

fn default_face_threshold() -> f64 {
    0.85
}

fn default_liveness_threshold() -> f64 {
    0.75
}

fn default_wifi_min_signal_dbm() -> i32 {
    -65
}

fn default_beacon_min_rssi() -> i32 {
    -70
}

fn default_beacon_tx_power() -> i32 {
    -59
}

fn default_edge_risk_points() -> u32 {
    20
}
