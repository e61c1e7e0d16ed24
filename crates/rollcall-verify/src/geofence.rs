//! GPS geofencing against registered rooms.
//!
//! Rooms are circles around their registered coordinates. A fix is inside a room when its
//! reported accuracy is good enough, its great-circle distance to the room center is within the
//! room radius, and it is on the room's floor when both floors are known.

use rollcall_core::{GeoLocation, GeofenceConfig, RoomConfig};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Mean earth radius used for haversine distances.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lng2 - lng1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Distance between two fixes, rounded to whole meters.
pub fn distance_m(a: &GeoLocation, lat: f64, lng: f64) -> f64 {
    haversine_m(a.lat, a.lng, lat, lng).round()
}

/// Floor implied by an altitude reading. Never below the ground floor.
pub fn estimate_floor(altitude_m: f64, ground_altitude_m: f64, floor_height_m: f64) -> i32 {
    (((altitude_m - ground_altitude_m) / floor_height_m).floor() as i32).max(0)
}

/// Why a fix was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceReason {
    UnknownRoom,
    AccuracyTooLow,
    OutsideBoundary,
    WrongFloor,
}

impl fmt::Display for GeofenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GeofenceReason::UnknownRoom => "unknown room",
            GeofenceReason::AccuracyTooLow => "GPS accuracy too low",
            GeofenceReason::OutsideBoundary => "outside room boundary",
            GeofenceReason::WrongFloor => "wrong floor",
        };
        write!(f, "{}", s)
    }
}

/// Outcome of a geofence check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceCheck {
    pub valid: bool,
    /// Distance to the room center in whole meters, when it was computed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<GeofenceReason>,
    /// Human-readable detail for the reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl GeofenceCheck {
    fn inside(distance_m: f64) -> Self {
        Self {
            valid: true,
            distance_m: Some(distance_m),
            reason: None,
            detail: None,
        }
    }

    fn refused(reason: GeofenceReason, distance_m: Option<f64>, detail: String) -> Self {
        Self {
            valid: false,
            distance_m,
            reason: Some(reason),
            detail: Some(detail),
        }
    }

    /// One-line description of the refusal.
    pub fn describe(&self) -> String {
        match (&self.reason, &self.detail) {
            (Some(reason), Some(detail)) => format!("{}: {}", reason, detail),
            (Some(reason), None) => reason.to_string(),
            _ => "inside room boundary".to_string(),
        }
    }
}

/// Outcome of the campus boundary check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampusCheck {
    pub on_campus: bool,
    pub distance_from_center_m: f64,
}

/// The closest registered room to a fix.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NearestRoom {
    pub room_id: String,
    pub distance_m: f64,
    pub radius_m: f64,
}

/// Registered rooms, editable at runtime.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    rooms: RwLock<BTreeMap<String, RoomConfig>>,
}

impl RoomRegistry {
    pub fn new(rooms: BTreeMap<String, RoomConfig>) -> Self {
        Self {
            rooms: RwLock::new(rooms),
        }
    }

    /// Register a room, replacing any room with the same id.
    pub fn add(&self, room_id: impl Into<String>, room: RoomConfig) {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(room_id.into(), room);
    }

    /// Replace an existing room. Returns `false` when the room is not registered.
    pub fn update(&self, room_id: &str, room: RoomConfig) -> bool {
        let mut rooms = self.rooms.write().unwrap_or_else(PoisonError::into_inner);
        match rooms.get_mut(room_id) {
            Some(slot) => {
                *slot = room;
                true
            }
            None => false,
        }
    }

    pub fn remove(&self, room_id: &str) -> Option<RoomConfig> {
        self.rooms
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(room_id)
    }

    pub fn get(&self, room_id: &str) -> Option<RoomConfig> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(room_id)
            .cloned()
    }

    /// All rooms ordered by id.
    pub fn list(&self) -> Vec<(String, RoomConfig)> {
        self.rooms
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, room)| (id.clone(), room.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rooms.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Geofence evaluator over a room registry.
#[derive(Debug)]
pub struct Geofence {
    config: GeofenceConfig,
    rooms: RoomRegistry,
}

impl Geofence {
    /// Build an evaluator, seeding the registry with the configured rooms.
    pub fn new(config: GeofenceConfig) -> Self {
        let rooms = RoomRegistry::new(config.rooms.clone());
        Self { config, rooms }
    }

    pub fn config(&self) -> &GeofenceConfig {
        &self.config
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Effective radius of a room.
    pub fn radius_for(&self, room: &RoomConfig) -> f64 {
        self.config.radius_for(room)
    }

    /// Check a fix against a registered room.
    pub fn verify(&self, location: &GeoLocation, room_id: &str) -> GeofenceCheck {
        match self.rooms.get(room_id) {
            Some(room) => self.verify_room(location, &room),
            None => GeofenceCheck::refused(GeofenceReason::UnknownRoom, None, format!("room {} is not registered", room_id)),
        }
    }

    /// Check a fix against a room definition.
    pub fn verify_room(&self, location: &GeoLocation, room: &RoomConfig) -> GeofenceCheck {
        let ceiling = self.config.accuracy_ceiling_m;
        if location.accuracy > ceiling {
            return GeofenceCheck::refused(
                GeofenceReason::AccuracyTooLow,
                None,
                format!("accuracy {}m exceeds {}m", location.accuracy, ceiling),
            );
        }

        let distance = distance_m(location, room.lat, room.lng);
        let radius = self.radius_for(room);
        if distance > radius {
            return GeofenceCheck::refused(
                GeofenceReason::OutsideBoundary,
                Some(distance),
                format!("{}m from room center, {}m allowed", distance, radius),
            );
        }

        if let (Some(found), Some(expected)) = (self.reported_floor(location, room), room.floor) {
            if found != expected {
                return GeofenceCheck::refused(
                    GeofenceReason::WrongFloor,
                    Some(distance),
                    format!("expected floor {}, got {}", expected, found),
                );
            }
        }

        GeofenceCheck::inside(distance)
    }

    /// The floor a fix claims, falling back to an altitude estimate.
    fn reported_floor(&self, location: &GeoLocation, room: &RoomConfig) -> Option<i32> {
        location.floor.or_else(|| match (location.altitude, room.ground_altitude_m) {
            (Some(altitude), Some(ground)) => Some(estimate_floor(altitude, ground, self.config.floor_height_m)),
            _ => None,
        })
    }

    /// Whether a fix lies within the campus boundary.
    pub fn is_on_campus(&self, location: &GeoLocation) -> CampusCheck {
        let campus = &self.config.campus;
        let distance = distance_m(location, campus.lat, campus.lng);
        CampusCheck {
            on_campus: distance <= campus.radius_m,
            distance_from_center_m: distance,
        }
    }

    /// The registered room closest to a fix, ignoring radius and accuracy.
    pub fn nearest_room(&self, location: &GeoLocation) -> Option<NearestRoom> {
        self.rooms
            .list()
            .into_iter()
            .map(|(room_id, room)| NearestRoom {
                distance_m: distance_m(location, room.lat, room.lng),
                radius_m: self.radius_for(&room),
                room_id,
            })
            .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
    }
}
