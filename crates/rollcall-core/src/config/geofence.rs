//! Geofence configuration: rooms and the campus boundary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Configuration for GPS geofencing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeofenceConfig {
    /// Fixes with a worse (larger) accuracy radius are rejected outright.
    #[serde(default = "default_accuracy_ceiling_m")]
    pub accuracy_ceiling_m: f64,

    /// Radius used for rooms that do not set their own.
    #[serde(default = "default_radius_m")]
    pub default_radius_m: f64,

    /// Distances beyond this inner radius raise `EDGE_MARKING`.
    #[serde(default = "default_edge_warning_radius_m")]
    pub edge_warning_radius_m: f64,

    /// Storey height used to estimate a floor from altitude.
    #[serde(default = "default_floor_height_m")]
    pub floor_height_m: f64,

    /// Campus boundary used by the remote-marking heuristic.
    #[serde(default)]
    pub campus: CampusConfig,

    /// Registered rooms keyed by room id.
    #[serde(default)]
    pub rooms: BTreeMap<String, RoomConfig>,
}

impl GeofenceConfig {
    /// Effective radius for a room.
    pub fn radius_for(&self, room: &RoomConfig) -> f64 {
        room.radius_m.unwrap_or(self.default_radius_m)
    }
}

impl Default for GeofenceConfig {
    fn default() -> Self {
        Self {
            accuracy_ceiling_m: default_accuracy_ceiling_m(),
            default_radius_m: default_radius_m(),
            edge_warning_radius_m: default_edge_warning_radius_m(),
            floor_height_m: default_floor_height_m(),
            campus: CampusConfig::default(),
            rooms: BTreeMap::new(),
        }
    }
}

/// A registered room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomConfig {
    pub lat: f64,
    pub lng: f64,

    /// Overrides `geofence.default_radius_m`.
    #[serde(default)]
    pub radius_m: Option<f64>,

    #[serde(default)]
    pub floor: Option<i32>,

    #[serde(default)]
    pub building: Option<String>,

    /// Altitude of the building's ground floor, for floor estimation.
    #[serde(default)]
    pub ground_altitude_m: Option<f64>,

    /// BSSIDs of the access points installed in the room.
    #[serde(default)]
    pub wifi_bssids: Vec<String>,

    /// Identifiers of the BLE beacons installed in the room.
    #[serde(default)]
    pub beacon_ids: Vec<String>,
}

impl RoomConfig {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self {
            lat,
            lng,
            radius_m: None,
            floor: None,
            building: None,
            ground_altitude_m: None,
            wifi_bssids: Vec::new(),
            beacon_ids: Vec::new(),
        }
    }

    pub fn with_radius(mut self, radius_m: f64) -> Self {
        self.radius_m = Some(radius_m);
        self
    }

    pub fn with_floor(mut self, floor: i32) -> Self {
        self.floor = Some(floor);
        self
    }
}

/// Campus boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampusConfig {
    #[serde(default = "default_campus_lat")]
    pub lat: f64,

    #[serde(default = "default_campus_lng")]
    pub lng: f64,

    #[serde(default = "default_campus_radius_m")]
    pub radius_m: f64,
}

impl Default for CampusConfig {
    fn default() -> Self {
        Self {
            lat: default_campus_lat(),
            lng: default_campus_lng(),
            radius_m: default_campus_radius_m(),
        }
    }
}

fn default_accuracy_ceiling_m() -> f64 {
    20.0
}

fn default_radius_m() -> f64 {
    20.0
}

fn default_edge_warning_radius_m() -> f64 {
    15.0
}

fn default_floor_height_m() -> f64 {
    3.0
}

fn default_campus_lat() -> f64 {
    28.6139
}

fn default_campus_lng() -> f64 {
    77.2090
}

fn default_campus_radius_m() -> f64 {
    1000.0
}
