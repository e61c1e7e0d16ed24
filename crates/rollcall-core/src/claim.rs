//! Claim inputs submitted by a student device.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A reported GPS fix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoLocation {
    /// Latitude in decimal degrees.
    pub lat: f64,
    /// Longitude in decimal degrees.
    pub lng: f64,
    /// Horizontal accuracy radius in meters, as reported by the device.
    pub accuracy: f64,
    /// Altitude above sea level in meters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    /// Building floor, when the device knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor: Option<i32>,
}

impl GeoLocation {
    pub fn new(lat: f64, lng: f64, accuracy: f64) -> Self {
        Self {
            lat,
            lng,
            accuracy,
            altitude: None,
            floor: None,
        }
    }

    pub fn with_floor(mut self, floor: i32) -> Self {
        self.floor = Some(floor);
        self
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }
}

/// A captured face image handed to the face evaluator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FaceSample {
    pub image: Vec<u8>,
}

/// One frame of the liveness capture sequence.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LivenessFrame {
    pub image: Vec<u8>,
}

/// A WiFi access point seen by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub bssid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssid: Option<String>,
    /// Signal level in dBm.
    pub signal_dbm: i32,
}

/// A BLE beacon seen by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconSighting {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub rssi: i32,
}

/// Wireless environment scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WirelessScan {
    #[serde(default)]
    pub access_points: Vec<AccessPoint>,
    #[serde(default)]
    pub beacons: Vec<BeaconSighting>,
}

/// A presence claim. Consumed once by the aggregator and never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationClaim {
    /// The scanned token payload, exactly as the client read it.
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<GeoLocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<FaceSample>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub liveness: Option<Vec<LivenessFrame>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wireless: Option<WirelessScan>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    /// Client-side timestamp. Informational only; the server clock decides the window.
    pub submitted_at: DateTime<Utc>,
}

impl VerificationClaim {
    /// Start a claim from a scanned token payload.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            location: None,
            face: None,
            liveness: None,
            wireless: None,
            device_fingerprint: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn location(mut self, location: GeoLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn face(mut self, sample: FaceSample) -> Self {
        self.face = Some(sample);
        self
    }

    pub fn liveness(mut self, frames: Vec<LivenessFrame>) -> Self {
        self.liveness = Some(frames);
        self
    }

    pub fn wireless(mut self, scan: WirelessScan) -> Self {
        self.wireless = Some(scan);
        self
    }

    pub fn device(mut self, fingerprint: impl Into<String>) -> Self {
        self.device_fingerprint = Some(fingerprint.into());
        self
    }
}
