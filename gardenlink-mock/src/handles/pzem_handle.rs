use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Extension, Json, Router, middleware};
use gardenlink_api::models::{CreatePzemRequest, PzemDevice, PzemReading, Role, UpdatePzemRequest};
use serde_json::{Value, json};
use time::OffsetDateTime;

use crate::error::MockError;
use crate::middlewares::auth;
use crate::state::{MockState, Session};

/// Points returned for a chart
pub const CHART_POINTS: usize = 20;
/// Readings returned by the log endpoint
pub const LOG_POINTS: usize = 100;

pub fn pzem_router(state: MockState) -> Router {
    Router::new()
        .route("/api/device/pzem", get(get_meters).post(create_meter))
        .route("/api/device/pzem/:id", put(update_meter).delete(delete_meter))
        .route("/api/device/pzem/:id/chart", get(get_chart))
        .route("/api/device/pzem/:id/logs", get(get_logs))
        .route("/api/device/pzem/:id/latest", get(get_latest))
        .route("/api/device/pzem/:id/reset-command", post(reset_meter))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

fn require_admin(session: &Session) -> Result<(), MockError> {
    if session.role != Role::Admin {
        return Err(MockError::InsufficientPermission);
    }
    Ok(())
}

pub async fn get_meters(State(state): State<MockState>) -> Json<Vec<PzemDevice>> {
    let store = state.store.read().await;
    Json(store.meters.values().cloned().collect())
}

pub async fn create_meter(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Json(body): Json<CreatePzemRequest>,
) -> Result<Json<PzemDevice>, MockError> {
    require_admin(&session)?;
    if body.name.trim().is_empty() {
        return Err(MockError::InvalidRequest("Name is required".into()));
    }

    let mut store = state.store.write().await;
    let device = PzemDevice {
        id: store.next_meter_id(),
        name: body.name,
        description: body.description,
    };
    store.meters.insert(device.id.clone(), device.clone());
    state.log(&mut store, format!("Power meter {} added", device.name));

    Ok(Json(device))
}

pub async fn update_meter(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(body): Json<UpdatePzemRequest>,
) -> Result<Json<PzemDevice>, MockError> {
    require_admin(&session)?;

    let mut store = state.store.write().await;
    let device = store.meters.get_mut(&id).ok_or(MockError::NotFound("Power meter"))?;
    if let Some(name) = body.name {
        device.name = name;
    }
    if let Some(description) = body.description {
        device.description = Some(description);
    }
    let device = device.clone();
    state.log(&mut store, format!("Power meter {} updated", device.name));

    Ok(Json(device))
}

pub async fn delete_meter(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, MockError> {
    require_admin(&session)?;

    let mut store = state.store.write().await;
    let device = store.meters.remove(&id).ok_or(MockError::NotFound("Power meter"))?;
    store.readings.remove(&id);
    state.log(&mut store, format!("Power meter {} removed", device.name));

    Ok(Json(json!({ "message": "Power meter removed" })))
}

/// Most recent readings, oldest first.
pub async fn get_chart(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PzemReading>>, MockError> {
    let store = state.store.read().await;
    if !store.meters.contains_key(&id) {
        return Err(MockError::NotFound("Power meter"));
    }

    let readings = store.readings.get(&id).map(|readings| {
        let skip = readings.len().saturating_sub(CHART_POINTS);
        readings.iter().skip(skip).cloned().collect()
    });
    Ok(Json(readings.unwrap_or_default()))
}

/// Recorded readings, newest first.
pub async fn get_logs(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<PzemReading>>, MockError> {
    let store = state.store.read().await;
    if !store.meters.contains_key(&id) {
        return Err(MockError::NotFound("Power meter"));
    }

    let readings = store
        .readings
        .get(&id)
        .map(|readings| readings.iter().rev().take(LOG_POINTS).cloned().collect());
    Ok(Json(readings.unwrap_or_default()))
}

pub async fn get_latest(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<Option<PzemReading>>, MockError> {
    let store = state.store.read().await;
    if !store.meters.contains_key(&id) {
        return Err(MockError::NotFound("Power meter"));
    }

    Ok(Json(store.readings.get(&id).and_then(|readings| readings.back().cloned())))
}

/// Zeroes the energy counter and pushes the reset reading.
pub async fn reset_meter(
    State(state): State<MockState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, MockError> {
    let mut store = state.store.write().await;
    let name = store
        .meters
        .get(&id)
        .map(|device| device.name.clone())
        .ok_or(MockError::NotFound("Power meter"))?;

    let reading = match store.readings.get(&id).and_then(|readings| readings.back()) {
        Some(latest) => PzemReading {
            energy: 0.0,
            created_at: OffsetDateTime::now_utc(),
            ..latest.clone()
        },
        None => PzemReading {
            pzem_id: id.clone(),
            voltage: 0.0,
            current: 0.0,
            power: 0.0,
            energy: 0.0,
            frequency: 0.0,
            power_factor: 0.0,
            created_at: OffsetDateTime::now_utc(),
        },
    };
    store.record_reading(reading.clone());
    state.publish_reading(&reading);
    state.log(&mut store, format!("Energy counter of {name} reset"));

    Ok(Json(json!({ "message": "Reset command sent" })))
}
