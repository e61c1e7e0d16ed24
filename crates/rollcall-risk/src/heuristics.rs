//! Individual anomaly heuristics.
//!
//! Each detector returns the observed value when it triggers and `None` otherwise, including when
//! it has too few samples to say anything.

use chrono::Timelike;
use rollcall_core::{AttendanceRecord, RiskConfig};
use rollcall_verify::Geofence;
use rollcall_verify::geofence::haversine_m;
use std::collections::HashSet;

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Mean distance from the room center, when it sits near the boundary.
pub fn edge_marking(samples: &[&AttendanceRecord], config: &RiskConfig) -> Option<f64> {
    let distances: Vec<f64> = samples.iter().filter_map(|r| r.distance_from_room_m).collect();
    if distances.len() < config.mean_min_samples {
        return None;
    }
    mean(&distances).filter(|avg| *avg > config.edge_mean_distance_m)
}

/// Mean minutes spent in class, when suspiciously short.
pub fn short_duration(samples: &[&AttendanceRecord], config: &RiskConfig) -> Option<f64> {
    let durations: Vec<f64> = samples.iter().filter_map(|r| r.duration_minutes()).collect();
    if durations.len() < config.mean_min_samples {
        return None;
    }
    mean(&durations).filter(|avg| *avg < config.short_duration_minutes)
}

/// Share of random checks failed, when too high.
pub fn failed_random_checks(samples: &[&AttendanceRecord], config: &RiskConfig) -> Option<f64> {
    let total: usize = samples.iter().map(|r| r.challenges.len()).sum();
    if total < config.failed_check_min_samples {
        return None;
    }
    let failed: usize = samples.iter().map(|r| r.failed_challenges()).sum();
    let ratio = failed as f64 / total as f64;
    (ratio > config.failed_check_ratio).then_some(ratio)
}

/// Number of distinct devices, when above the limit.
pub fn device_hopping(samples: &[&AttendanceRecord], config: &RiskConfig) -> Option<f64> {
    let devices: HashSet<&str> = samples
        .iter()
        .filter_map(|r| r.device_fingerprint.as_deref())
        .collect();
    (devices.len() > config.device_limit).then_some(devices.len() as f64)
}

/// Spread of the minute of day claims are made, when machine-like.
pub fn consistent_timing(samples: &[&AttendanceRecord], config: &RiskConfig) -> Option<f64> {
    let minutes: Vec<f64> = samples
        .iter()
        .map(|r| (r.marked_at.hour() * 60 + r.marked_at.minute()) as f64)
        .collect();
    if minutes.len() < config.min_samples {
        return None;
    }
    std_dev(&minutes).filter(|sd| *sd < config.timing_stddev_minutes)
}

/// Share of claims made off campus, when too high. Records without a location count as on campus.
pub fn remote_marking(samples: &[&AttendanceRecord], geofence: &Geofence, config: &RiskConfig) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    let off_campus = samples
        .iter()
        .filter(|r| {
            r.location
                .as_ref()
                .is_some_and(|loc| !geofence.is_on_campus(loc).on_campus)
        })
        .count();
    let rate = off_campus as f64 / samples.len() as f64;
    (rate > config.remote_fraction).then_some(rate)
}

/// Other users of the same session who claimed from the same spot at the same time.
pub fn batch_peers<'a>(
    current: &AttendanceRecord,
    peers: &'a [AttendanceRecord],
    config: &RiskConfig,
) -> Vec<&'a AttendanceRecord> {
    let Some(here) = &current.location else {
        return Vec::new();
    };
    peers
        .iter()
        .filter(|peer| peer.user_id != current.user_id && peer.session_id == current.session_id)
        .filter(|peer| (peer.marked_at - current.marked_at).num_seconds().abs() <= config.batch_window_secs)
        .filter(|peer| {
            peer.location
                .as_ref()
                .is_some_and(|there| haversine_m(here.lat, here.lng, there.lat, there.lng) <= config.batch_radius_m)
        })
        .collect()
}
