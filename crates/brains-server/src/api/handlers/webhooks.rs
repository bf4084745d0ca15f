//! `POST /webhooks/:slug`: the inbound side of the webhook router (§4.7).

use axum::extract::{Path, Query, State};
use axum::Json;
use brains_runtime::{HandlerOutcome, HandlerResponse, WebhookAction};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::error::ApiResult;
use crate::api::response;
use crate::api::routes::AppState;

#[derive(Debug, Deserialize)]
pub struct DeliveryQuery {
    pub identifier: Option<String>,
}

/// The raw delivery envelope: either a bare payload (identifier from the query
/// string or embedded `identifier` field) or a handler-shaped
/// `{type: 'webhook'|'verification', ...}` response (§4.7 steps 2-3).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Delivery {
    Handled(HandlerResponse),
    Raw(Value),
}

/// `POST /webhooks/:slug` → 200/202 `{received, action}`, 404 if unknown slug.
pub async fn deliver(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(query): Query<DeliveryQuery>,
    Json(body): Json<Delivery>,
) -> ApiResult<impl axum::response::IntoResponse> {
    match body {
        Delivery::Handled(handler_response) => {
            let outcome = state.webhooks.handle_response(&slug, handler_response).await?;
            Ok(response::ok(match outcome {
                HandlerOutcome::Received => json!({ "received": true, "action": "no-match" }),
                HandlerOutcome::Challenge(challenge) => json!({ "challenge": challenge }),
            }))
        }
        Delivery::Raw(payload) => {
            let identifier = query
                .identifier
                .or_else(|| payload.get("identifier").and_then(Value::as_str).map(str::to_string))
                .ok_or_else(|| crate::api::error::ApiError::BadRequest("missing identifier".into()))?;
            let action = state.webhooks.deliver(&slug, &identifier, payload).await?;
            Ok(response::ok(match action {
                WebhookAction::Resumed { .. } => json!({ "received": true, "action": "resumed" }),
                WebhookAction::NoMatch => json!({ "received": true, "action": "no-match" }),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_delivery_pulls_identifier_from_payload() {
        let delivery: Delivery = serde_json::from_value(json!({"identifier": "t-1", "approved": true})).unwrap();
        match delivery {
            Delivery::Raw(value) => assert_eq!(value["identifier"], json!("t-1")),
            Delivery::Handled(_) => panic!("expected a raw delivery"),
        }
    }

    #[test]
    fn handler_response_is_recognised_by_its_type_tag() {
        let delivery: Delivery = serde_json::from_value(json!({"type": "verification", "challenge": "xyz"})).unwrap();
        assert!(matches!(delivery, Delivery::Handled(HandlerResponse::Verification { .. })));
    }
}
