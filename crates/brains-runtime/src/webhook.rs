//! Inbound webhook routing — §4.7 "Webhook router". Matches a `(slug,
//! identifier)` payload against waiting runs via [`Supervisor::find_waiting_run`]
//! and either delivers it, answers the idempotent no-match receipt, or
//! answers a provider URL-verification handshake.

use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::supervisor::Supervisor;

/// What the router did with one inbound delivery, mirroring the
/// `{received, action}` shape `POST /webhooks/:slug` answers with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    /// Delivered to a waiting run, which resumed.
    Resumed { run_id: String },
    /// No waiting run matched; accepted idempotently, nothing to do.
    NoMatch,
}

/// A handler's own response shape for a slug with no single matching run
/// pre-identified by the router (§4.7 steps 2-3): either hand back an
/// identifier to retry matching against, or answer a verification challenge.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HandlerResponse {
    Webhook { identifier: String, response: Value },
    Verification { challenge: String },
}

/// Reply to a `POST /webhooks/:slug` delivery once a [`HandlerResponse`] has
/// been produced for a slug the router could not resolve by `identifier` alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Received,
    Challenge(String),
}

/// Routes deliveries to the [`Supervisor`] that owns the waiting runs. Stateless
/// beyond that reference: all matching state lives in the supervisor's run index.
pub struct WebhookRouter {
    supervisor: std::sync::Arc<Supervisor>,
}

impl WebhookRouter {
    pub fn new(supervisor: std::sync::Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Step 1: an inbound `(slug, identifier, payload)` with an identifier
    /// already known (query parameter or pulled from the payload by the caller).
    pub async fn deliver(&self, slug: &str, identifier: &str, payload: Value) -> Result<WebhookAction> {
        match self.supervisor.find_waiting_run(slug, identifier) {
            Some(run_id) => {
                self.supervisor.deliver_webhook_response(&run_id, payload).await?;
                Ok(WebhookAction::Resumed { run_id })
            }
            None => Ok(WebhookAction::NoMatch),
        }
    }

    /// Steps 2-3: a handler-produced response for a slug the caller could not
    /// resolve to an identifier up front. `webhook` responses are matched the
    /// same way `deliver` matches; `verification` responses never touch a run.
    pub async fn handle_response(&self, slug: &str, response: HandlerResponse) -> Result<HandlerOutcome> {
        match response {
            HandlerResponse::Webhook { identifier, response } => {
                self.deliver(slug, &identifier, response).await?;
                Ok(HandlerOutcome::Received)
            }
            HandlerResponse::Verification { challenge } => Ok(HandlerOutcome::Challenge(challenge)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::BrainRegistry;
    use brains_checkpoint::InMemoryEventLog;
    use brains_core::{BrainBuilder, StepOutcome};
    use brains_types::webhook::WebhookRegistration;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn escalating_brain(title: &str) -> Arc<brains_core::Brain> {
        Arc::new(
            BrainBuilder::new(title)
                .agent("wait", |_input| {
                    Box::pin(async move {
                        let mut config = brains_core::AgentConfig::new("escalate");
                        config.tools = vec![brains_core::Tool::new("escalate", "ask a human", json!({}))
                            .with_execute(|_args| {
                                Box::pin(async move {
                                    Ok(brains_core::ToolOutcome::wait_for(vec![WebhookRegistration::new(
                                        "support-response",
                                        "ticket-123",
                                    )]))
                                })
                            })];
                        Ok(config)
                    })
                })
                .build()
                .unwrap(),
        )
    }

    async fn settle(log: &InMemoryEventLog, run_id: &str) {
        for _ in 0..200 {
            if let Ok(Some(record)) = brains_checkpoint::EventLog::get_run(log, run_id).await {
                if record.status == brains_types::RunStatus::Waiting {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("run never reached WAITING");
    }

    #[tokio::test]
    async fn delivery_with_no_match_is_accepted_idempotently() {
        brains_core::graph::clear_title_registry();
        let log = Arc::new(InMemoryEventLog::new());
        let registry = Arc::new(BrainRegistry::new());
        let supervisor = Supervisor::new(log, registry, None);
        let router = WebhookRouter::new(supervisor);

        let outcome = router.deliver("support-response", "no-such-ticket", json!({})).await.unwrap();
        assert_eq!(outcome, WebhookAction::NoMatch);
    }

    #[tokio::test]
    async fn matching_delivery_resumes_the_waiting_run() {
        brains_core::graph::clear_title_registry();
        let log = Arc::new(InMemoryEventLog::new());
        let mut registry = BrainRegistry::new();
        registry.register(escalating_brain("escalator"), "waits on a webhook");
        let supervisor = Supervisor::new(log.clone(), Arc::new(registry), None);
        let record = supervisor.start_run("escalator", json!({}), None).await.unwrap();
        settle(&log, &record.run_id).await;

        let router = WebhookRouter::new(supervisor.clone());
        let outcome = timeout(
            Duration::from_secs(1),
            router.deliver("support-response", "ticket-123", json!({"approved": true})),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(outcome, WebhookAction::Resumed { run_id: record.run_id.clone() });
    }

    #[tokio::test]
    async fn verification_challenge_is_echoed_back() {
        brains_core::graph::clear_title_registry();
        let log = Arc::new(InMemoryEventLog::new());
        let supervisor = Supervisor::new(log, Arc::new(BrainRegistry::new()), None);
        let router = WebhookRouter::new(supervisor);

        let outcome = router
            .handle_response("provider-slug", HandlerResponse::Verification { challenge: "abc123".into() })
            .await
            .unwrap();
        assert_eq!(outcome, HandlerOutcome::Challenge("abc123".to_string()));
    }
}
