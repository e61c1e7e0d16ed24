//! `rollcall simulate`: run one class session end to end against in-memory stores.
//!
//! The scenario starts a session, lets the class claim presence with varied factor sets, rotates
//! the token once to show a stale scan being refused, then ends the session and prints what the
//! engine recorded.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{Value as JsonValue, json};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use rollcall_core::{FaceSample, GeoLocation, LivenessFrame, RollcallConfig, RoomConfig, Session, VerificationClaim};
use rollcall_runtime::AttendanceEngine;
use rollcall_verify::geofence::EARTH_RADIUS_M;
use rollcall_verify::{StaticFaceEvaluator, StaticLivenessEvaluator};

const SESSION_ID: &str = "simulated-session";

/// Fix `north_m` metres north and `east_m` metres east of a room.
fn offset(room: &RoomConfig, north_m: f64, east_m: f64) -> GeoLocation {
    let lat = room.lat + (north_m / EARTH_RADIUS_M).to_degrees();
    let lng = room.lng + (east_m / (EARTH_RADIUS_M * room.lat.to_radians().cos())).to_degrees();
    GeoLocation::new(lat, lng, 6.0)
}

pub async fn simulate(config: RollcallConfig, room_id: Option<&str>, students: usize) -> Result<JsonValue> {
    let (room_id, room) = match room_id {
        Some(id) => config
            .geofence
            .rooms
            .get_key_value(id)
            .with_context(|| format!("room {} is not configured", id))?,
        None => config
            .geofence
            .rooms
            .iter()
            .next()
            .context("configuration has no rooms to simulate in")?,
    };
    let (room_id, room) = (room_id.clone(), room.clone());
    info!(room_id = %room_id, students, "simulating session");

    let engine = AttendanceEngine::builder(config.clone())
        .face_evaluator(Arc::new(StaticFaceEvaluator::new(0.93, config.scoring.face_threshold)))
        .liveness_evaluator(Arc::new(StaticLivenessEvaluator::new(0.88, config.scoring.liveness_threshold)))
        .build();

    let now = Utc::now();
    engine
        .register_session(Session::scheduled(SESSION_ID, &room_id, now, now + Duration::minutes(50)))
        .await?;
    let issued = engine.start_session(SESSION_ID).await?;
    let token = issued.token.token.clone();

    let mut rng = rand::rng();
    let mut claims = Vec::with_capacity(students + 1);
    for i in 0..students {
        let user_id = format!("student-{:02}", i + 1);
        let claim = VerificationClaim::new(token.clone()).device(format!("device-{}", i + 1));
        // Student one only scans the code; the last stands at the room edge.
        let claim = match i {
            0 => claim,
            _ if i + 1 == students => claim
                .location(offset(&room, 17.0, 0.0))
                .face(FaceSample { image: vec![1] }),
            _ => claim
                .location(offset(&room, rng.random_range(-8.0..8.0), rng.random_range(-8.0..8.0)))
                .face(FaceSample { image: vec![1] })
                .liveness(vec![LivenessFrame { image: vec![1] }; 3]),
        };

        let result = match engine.submit_claim(SESSION_ID, &user_id, claim).await {
            Ok(outcome) => json!({ "user_id": user_id, "outcome": outcome }),
            Err(rejection) => json!({ "user_id": user_id, "rejected": rejection, "reason": rejection.to_string() }),
        };
        claims.push(result);
    }

    let rotated = engine.rotate_token(SESSION_ID).await?;
    let stale = VerificationClaim::new(token.clone()).location(offset(&room, 0.0, 0.0));
    let late_user = "student-late";
    let result = match engine.submit_claim(SESSION_ID, late_user, stale).await {
        Ok(outcome) => json!({ "user_id": late_user, "outcome": outcome }),
        Err(rejection) => json!({ "user_id": late_user, "rejected": rejection, "reason": rejection.to_string() }),
    };
    claims.push(result);

    let usage = engine.token_usage(&token).await?;
    let pending = engine.pending_reviews(Some(SESSION_ID)).await?;
    let report = engine.anomaly_report(Some(1)).await?;
    let session = engine.end_session(SESSION_ID).await?;

    Ok(json!({
        "session": session,
        "token_generation": rotated.token.generation,
        "claims": claims,
        "first_token_usage": usage,
        "pending_reviews": pending.iter().map(|r| &r.user_id).collect::<Vec<_>>(),
        "anomalies": report,
    }))
}

pub async fn run(config_path: &Path, room_id: Option<&str>, students: usize) -> Result<()> {
    info!(config = %config_path.display(), "Loading configuration");
    let config = RollcallConfig::load(config_path)
        .with_context(|| format!("failed to load {}", config_path.display()))?;
    let summary = simulate(config, room_id, students).await?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
