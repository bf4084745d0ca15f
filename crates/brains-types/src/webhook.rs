//! Webhook registrations: the `(slug, identifier)` pairs a waiting run is keyed by.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single outstanding wait. A run in `WAITING` holds one or more of these;
/// delivery requires an exact `(slug, identifier)` match.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookRegistration {
    pub slug: String,
    pub identifier: String,

    /// Schema the expected payload is validated against, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,

    /// Optional deadline; past it the supervisor synthesizes a timed-out response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<chrono::DateTime<chrono::Utc>>,
}

impl WebhookRegistration {
    pub fn new(slug: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            identifier: identifier.into(),
            schema: None,
            deadline: None,
        }
    }

    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_deadline(mut self, deadline: chrono::DateTime<chrono::Utc>) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn matches(&self, slug: &str, identifier: &str) -> bool {
        self.slug == slug && self.identifier == identifier
    }
}

/// Sentinel carried by a synthetic `WEBHOOK_RESPONSE` generated on deadline expiry,
/// distinguishing it from a genuine inbound delivery.
pub const TIMEOUT_SENTINEL: &str = "__brains_webhook_timeout__";
