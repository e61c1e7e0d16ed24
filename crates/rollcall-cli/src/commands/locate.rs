//! `rollcall locate`: evaluate one fix against the configured geofences.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use rollcall_core::{GeoLocation, RollcallConfig};
use rollcall_verify::{CampusCheck, Geofence, GeofenceCheck, NearestRoom};

#[derive(Debug, Serialize)]
pub struct LocateReport {
    pub location: GeoLocation,
    pub campus: CampusCheck,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<RoomReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest: Option<NearestRoom>,
}

#[derive(Debug, Serialize)]
pub struct RoomReport {
    pub room_id: String,
    #[serde(flatten)]
    pub check: GeofenceCheck,
    pub summary: String,
}

pub fn locate(config: &RollcallConfig, location: GeoLocation, room: Option<&str>) -> LocateReport {
    let geofence = Geofence::new(config.geofence.clone());
    let campus = geofence.is_on_campus(&location);
    let room = room.map(|room_id| {
        let check = geofence.verify(&location, room_id);
        RoomReport {
            room_id: room_id.to_string(),
            summary: check.describe(),
            check,
        }
    });
    let nearest = geofence.nearest_room(&location);
    LocateReport {
        location,
        campus,
        room,
        nearest,
    }
}

pub fn run(config_path: &Path, lat: f64, lng: f64, accuracy: f64, room: Option<&str>) -> Result<()> {
    let config = RollcallConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let report = locate(&config, GeoLocation::new(lat, lng, accuracy), room);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
