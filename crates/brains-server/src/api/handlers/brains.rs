//! `GET /brains`: the catalog of brains this process can start runs for.

use axum::extract::State;

use crate::api::response;
use crate::api::routes::AppState;

pub async fn list_brains(State(state): State<AppState>) -> impl axum::response::IntoResponse {
    response::ok(state.supervisor.list_brains())
}
