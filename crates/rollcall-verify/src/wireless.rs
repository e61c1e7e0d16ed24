//! WiFi and BLE beacon presence.

use rollcall_core::{AccessPoint, BeaconSighting, RoomConfig, ScoringConfig};
use serde::Serialize;

/// Outcome of a wireless check. `None` means the room has nothing registered to check against.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WirelessCheck {
    pub verified: bool,
    /// BSSID or beacon id that matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// Estimated distance to the beacon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl WirelessCheck {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            verified: false,
            matched: None,
            signal: None,
            distance_m: None,
            reason: Some(reason.into()),
        }
    }
}

/// Checks scans against the room's registered access points and beacons.
#[derive(Debug, Clone)]
pub struct WirelessEvaluator {
    wifi_min_signal_dbm: i32,
    beacon_min_rssi: i32,
    beacon_tx_power: i32,
}

impl WirelessEvaluator {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            wifi_min_signal_dbm: config.wifi_min_signal_dbm,
            beacon_min_rssi: config.beacon_min_rssi,
            beacon_tx_power: config.beacon_tx_power,
        }
    }

    /// Verified when a room access point is heard at or above the minimum signal.
    pub fn verify_wifi(&self, scan: &[AccessPoint], room: &RoomConfig) -> Option<WirelessCheck> {
        if room.wifi_bssids.is_empty() {
            return None;
        }

        let strongest = scan
            .iter()
            .filter(|ap| room.wifi_bssids.iter().any(|b| b.eq_ignore_ascii_case(&ap.bssid)))
            .max_by_key(|ap| ap.signal_dbm);

        let check = match strongest {
            None => WirelessCheck::failed("room WiFi not detected"),
            Some(ap) if ap.signal_dbm < self.wifi_min_signal_dbm => WirelessCheck {
                matched: Some(ap.bssid.clone()),
                signal: Some(ap.signal_dbm),
                ..WirelessCheck::failed(format!(
                    "WiFi signal too weak: {} dBm, {} dBm required",
                    ap.signal_dbm, self.wifi_min_signal_dbm
                ))
            },
            Some(ap) => WirelessCheck {
                verified: true,
                matched: Some(ap.bssid.clone()),
                signal: Some(ap.signal_dbm),
                distance_m: None,
                reason: None,
            },
        };
        Some(check)
    }

    /// Verified when a room beacon is heard at or above the minimum RSSI.
    pub fn verify_beacon(&self, sightings: &[BeaconSighting], room: &RoomConfig) -> Option<WirelessCheck> {
        if room.beacon_ids.is_empty() {
            return None;
        }

        let strongest = sightings
            .iter()
            .filter(|b| room.beacon_ids.iter().any(|id| id.eq_ignore_ascii_case(&b.id)))
            .max_by_key(|b| b.rssi);

        let check = match strongest {
            None => WirelessCheck::failed("room beacons not detected"),
            Some(b) if b.rssi < self.beacon_min_rssi => WirelessCheck {
                matched: Some(b.id.clone()),
                signal: Some(b.rssi),
                ..WirelessCheck::failed(format!(
                    "beacon signal too weak: {} dBm, {} dBm required",
                    b.rssi, self.beacon_min_rssi
                ))
            },
            Some(b) => WirelessCheck {
                verified: true,
                matched: Some(b.id.clone()),
                signal: Some(b.rssi),
                distance_m: estimate_distance(b.rssi, self.beacon_tx_power),
                reason: None,
            },
        };
        Some(check)
    }
}

/// Log-distance estimate of the meters to a beacon, rounded to centimeters.
///
/// `tx_power` is the calibrated RSSI at one meter. A zero reading carries no information.
pub fn estimate_distance(rssi: i32, tx_power: i32) -> Option<f64> {
    if rssi == 0 || tx_power == 0 {
        return None;
    }
    let ratio = rssi as f64 / tx_power as f64;
    let meters = if ratio < 1.0 {
        ratio.powi(10)
    } else {
        0.89976 * ratio.powf(7.7095) + 0.111
    };
    Some((meters * 100.0).round() / 100.0)
}
