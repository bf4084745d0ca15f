//! Response helpers shared by every handler. Unlike a typical CRUD surface,
//! §6.2 pins each endpoint's exact response shape (`{brainRunId}`,
//! `{success, action}`, …) rather than a single uniform envelope, so these
//! helpers only standardise the status code, not the body.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, Json(data))
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, Json(data))
}

pub fn accepted<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(data))
}

pub fn no_content() -> impl IntoResponse {
    StatusCode::NO_CONTENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn created_sets_the_201_status() {
        let response = created(json!({"brainRunId": "abc"})).into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[test]
    fn accepted_sets_the_202_status() {
        let response = accepted(json!({"success": true})).into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }
}
