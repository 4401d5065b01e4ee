use axum::extract::{Path, State};
use axum::routing::put;
use axum::{Extension, Json, Router, middleware};
use gardenlink_api::models::{OutputMode, UpdateOutputRequest};
use serde_json::{Value, json};
use time::{OffsetDateTime, Time};
use time::macros::format_description;

use crate::error::MockError;
use crate::middlewares::auth;
use crate::state::{MockState, Session};

pub fn output_router(state: MockState) -> Router {
    Router::new()
        .route("/api/device/output/:id", put(update_output))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth))
        .with_state(state)
}

/// Applies the change and pushes the new output list; the response carries no state.
pub async fn update_output(
    Extension(session): Extension<Session>,
    State(state): State<MockState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateOutputRequest>,
) -> Result<Json<Value>, MockError> {
    check_times(&body)?;

    let mut store = state.store.write().await;
    let output = store.outputs.get_mut(&id).ok_or(MockError::NotFound("Output"))?;

    if let Some(mode) = body.mode {
        if mode == OutputMode::AutoDatetime
            && (body.turn_on_time.is_none() || body.turn_off_time.is_none())
        {
            return Err(MockError::InvalidRequest(
                "turnOnTime and turnOffTime are required in AUTO_DATETIME mode".into(),
            ));
        }
        output.mode = mode;
        output.turn_on_time = body.turn_on_time.clone();
        output.turn_off_time = body.turn_off_time.clone();
    }
    if let Some(on) = body.state {
        output.switch(on, OffsetDateTime::now_utc());
    }

    let message = format!(
        "Output {} set to {} ({}) by user {}",
        output.name,
        match output.state {
            Some(true) => "ON",
            Some(false) => "OFF",
            None => "UNKNOWN",
        },
        output.mode,
        session.user_id
    );
    tracing::debug!(%id, "{}", message);

    state.publish_outputs(&store);
    state.log(&mut store, message);

    Ok(Json(json!({ "message": "Output updated" })))
}

fn check_times(body: &UpdateOutputRequest) -> Result<(), MockError> {
    let format = format_description!("[hour]:[minute]");

    for value in [&body.turn_on_time, &body.turn_off_time].into_iter().flatten() {
        if Time::parse(value, &format).is_err() {
            return Err(MockError::InvalidRequest(format!("{value:?} is not a HH:mm time")));
        }
    }
    Ok(())
}
