//! Risk and anomaly heuristic configuration.

use serde::{Deserialize, Serialize};

/// Points each heuristic contributes when it triggers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskPoints {
    #[serde(default = "default_edge_points")]
    pub edge_marking: u32,
    #[serde(default = "default_short_duration_points")]
    pub short_duration: u32,
    #[serde(default = "default_failed_checks_points")]
    pub failed_random_checks: u32,
    #[serde(default = "default_device_points")]
    pub device_hopping: u32,
    #[serde(default = "default_timing_points")]
    pub consistent_timing: u32,
    #[serde(default = "default_batch_points")]
    pub batch_marking: u32,
    #[serde(default = "default_remote_points")]
    pub remote_marking: u32,
}

impl Default for RiskPoints {
    fn default() -> Self {
        Self {
            edge_marking: default_edge_points(),
            short_duration: default_short_duration_points(),
            failed_random_checks: default_failed_checks_points(),
            device_hopping: default_device_points(),
            consistent_timing: default_timing_points(),
            batch_marking: default_batch_points(),
            remote_marking: default_remote_points(),
        }
    }
}

/// Configuration for the risk engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Days of history considered.
    #[serde(default = "default_window_days")]
    pub window_days: i64,

    /// History records required before pattern heuristics run.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,

    /// Present records at or above this risk are routed to manual review.
    #[serde(default = "default_review_threshold")]
    pub review_threshold: u32,

    /// Default floor for anomaly reports.
    #[serde(default = "default_report_min_risk")]
    pub report_min_risk: u32,

    /// Samples a mean-based heuristic needs (edge distance, duration).
    #[serde(default = "default_mean_min_samples")]
    pub mean_min_samples: usize,

    #[serde(default = "default_edge_mean_distance_m")]
    pub edge_mean_distance_m: f64,

    #[serde(default = "default_short_duration_minutes")]
    pub short_duration_minutes: f64,

    #[serde(default = "default_failed_check_ratio")]
    pub failed_check_ratio: f64,

    #[serde(default = "default_failed_check_min_samples")]
    pub failed_check_min_samples: usize,

    /// Distinct device fingerprints tolerated.
    #[serde(default = "default_device_limit")]
    pub device_limit: usize,

    #[serde(default = "default_timing_stddev_minutes")]
    pub timing_stddev_minutes: f64,

    #[serde(default = "default_batch_radius_m")]
    pub batch_radius_m: f64,

    #[serde(default = "default_batch_window_secs")]
    pub batch_window_secs: i64,

    /// Co-located claimants, the current claim included, that make a batch.
    #[serde(default = "default_batch_min_cluster")]
    pub batch_min_cluster: usize,

    #[serde(default = "default_remote_fraction")]
    pub remote_fraction: f64,

    #[serde(default)]
    pub points: RiskPoints,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
            min_samples: default_min_samples(),
            review_threshold: default_review_threshold(),
            report_min_risk: default_report_min_risk(),
            mean_min_samples: default_mean_min_samples(),
            edge_mean_distance_m: default_edge_mean_distance_m(),
            short_duration_minutes: default_short_duration_minutes(),
            failed_check_ratio: default_failed_check_ratio(),
            failed_check_min_samples: default_failed_check_min_samples(),
            device_limit: default_device_limit(),
            timing_stddev_minutes: default_timing_stddev_minutes(),
            batch_radius_m: default_batch_radius_m(),
            batch_window_secs: default_batch_window_secs(),
            batch_min_cluster: default_batch_min_cluster(),
            remote_fraction: default_remote_fraction(),
            points: RiskPoints::default(),
        }
    }
}

fn default_window_days() -> i64 {
    30
}

fn default_min_samples() -> usize {
    5
}

fn default_review_threshold() -> u32 {
    60
}

fn default_report_min_risk() -> u32 {
    40
}

fn default_mean_min_samples() -> usize {
    3
}

fn default_edge_mean_distance_m() -> f64 {
    15.0
}

fn default_short_duration_minutes() -> f64 {
    10.0
}

fn default_failed_check_ratio() -> f64 {
    0.4
}

fn default_failed_check_min_samples() -> usize {
    5
}

fn default_device_limit() -> usize {
    3
}

fn default_timing_stddev_minutes() -> f64 {
    2.0
}

fn default_batch_radius_m() -> f64 {
    5.0
}

fn default_batch_window_secs() -> i64 {
    60
}

fn default_batch_min_cluster() -> usize {
    2
}

fn default_remote_fraction() -> f64 {
    0.2
}

fn default_edge_points() -> u32 {
    20
}

fn default_short_duration_points() -> u32 {
    25
}

fn default_failed_checks_points() -> u32 {
    30
}

fn default_device_points() -> u32 {
    15
}

fn default_timing_points() -> u32 {
    10
}

fn default_batch_points() -> u32 {
    25
}

fn default_remote_points() -> u32 {
    20
}
