//! Cron schedule CRUD and the scheduler's own timezone setting (§6.2).

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::response;
use crate::api::routes::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateScheduleRequest {
    pub identifier: String,
    pub cron_expression: String,
    #[serde(default)]
    pub timezone: Option<String>,
}

/// `POST /brains/schedules {identifier, cronExpression, timezone?}` → 201.
pub async fn create_schedule(
    State(state): State<AppState>,
    Json(req): Json<CreateScheduleRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let registration = state.scheduler.register(req.identifier, req.cron_expression, req.timezone)?;
    Ok(response::created(registration))
}

/// `GET /brains/schedules` → every registration.
pub async fn list_schedules(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(state.scheduler.list())
}

/// `GET /brains/schedules/:id`.
pub async fn get_schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(response::ok(state.scheduler.get(&id)?))
}

/// `DELETE /brains/schedules/:id`.
pub async fn delete_schedule(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    state.scheduler.delete(&id)?;
    Ok(response::no_content())
}

/// `GET /brains/schedules/runs` → the `triggered|failed` history.
pub async fn schedule_history(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(state.scheduler.history())
}

/// `GET /brains/schedules/timezone` → the scheduler's default timezone.
pub async fn get_timezone(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(json!({ "timezone": state.scheduler.default_timezone() }))
}

#[derive(Debug, Deserialize)]
pub struct SetTimezoneRequest {
    pub timezone: String,
}

/// `PUT /brains/schedules/timezone`.
pub async fn set_timezone(
    State(state): State<AppState>,
    Json(req): Json<SetTimezoneRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.scheduler.set_default_timezone(&req.timezone)?;
    Ok(response::ok(json!({ "timezone": req.timezone })))
}
