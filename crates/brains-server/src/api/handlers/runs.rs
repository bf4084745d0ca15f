//! Run lifecycle endpoints: start, watch, signal, resume, history.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiResult;
use crate::api::response;
use crate::api::routes::AppState;
use crate::api::sse::watch_stream;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub brain_title: String,
    #[serde(default)]
    pub options: Value,
}

/// `POST /brains/runs {brainTitle, options?}` → 201 `{brainRunId}`.
pub async fn start_run(
    State(state): State<AppState>,
    Json(req): Json<StartRunRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let record = state.supervisor.start_run(&req.brain_title, req.options, None).await?;
    Ok(response::created(json!({ "brainRunId": record.run_id })))
}

/// `GET /brains/runs/:id/watch` → `text/event-stream`.
pub async fn watch_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    let history = state.supervisor.read_all(&id).await?;
    let live = state.supervisor.watch(&id)?;
    Ok(watch_stream(history, live))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<usize>,
}

/// `GET /brains/:title/history?limit=` → list of runs.
pub async fn history(
    State(state): State<AppState>,
    Path(title): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let runs = state.supervisor.list_runs(Some(&title), query.limit).await?;
    Ok(response::ok(runs))
}

/// `POST /brains/runs/:id/signals {type, ...}` → 202 `{success, signal}`.
pub async fn send_signal(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(kind): Json<brains_types::SignalKind>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let signal = state.supervisor.enqueue_signal(&id, kind).await?;
    Ok(response::accepted(json!({ "success": true, "signal": signal })))
}

/// `POST /brains/runs/:id/resume` → 202 `{success, action:'resumed'}`.
pub async fn resume_run(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<impl axum::response::IntoResponse> {
    state.supervisor.resume_run(&id).await?;
    Ok(response::accepted(json!({ "success": true, "action": "resumed" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_run_request_defaults_options_to_null() {
        let req: StartRunRequest = serde_json::from_value(json!({"brainTitle": "Counter"})).unwrap();
        assert_eq!(req.brain_title, "Counter");
        assert!(req.options.is_null());
    }
}
