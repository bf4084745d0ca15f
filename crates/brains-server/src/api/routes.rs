//! Router assembly: wires every handler onto the shared [`AppState`].

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use brains_runtime::{Scheduler, Supervisor, WebhookRouter};

use crate::api::{handlers, middleware};

/// Shared application state every handler extracts from. Cheap to clone:
/// everything inside is already an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
    pub scheduler: Arc<Scheduler>,
    pub webhooks: Arc<WebhookRouter>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/brains", get(handlers::brains::list_brains))
        .route("/brains/runs", post(handlers::runs::start_run))
        .route("/brains/runs/:id/watch", get(handlers::runs::watch_run))
        .route("/brains/runs/:id/signals", post(handlers::runs::send_signal))
        .route("/brains/runs/:id/resume", post(handlers::runs::resume_run))
        .route("/brains/:title/history", get(handlers::runs::history))
        .route(
            "/brains/schedules",
            post(handlers::schedules::create_schedule).get(handlers::schedules::list_schedules),
        )
        .route(
            "/brains/schedules/:id",
            get(handlers::schedules::get_schedule).delete(handlers::schedules::delete_schedule),
        )
        .route("/brains/schedules/runs", get(handlers::schedules::schedule_history))
        .route(
            "/brains/schedules/timezone",
            get(handlers::schedules::get_timezone).put(handlers::schedules::set_timezone),
        )
        .route("/webhooks/:slug", post(handlers::webhooks::deliver))
        .layer(middleware::cors_layer())
        .layer(middleware::logging_layer())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_checkpoint::InMemoryEventLog;
    use brains_runtime::BrainRegistry;

    fn test_state() -> AppState {
        let log = Arc::new(InMemoryEventLog::new());
        let registry = Arc::new(BrainRegistry::new());
        let supervisor = Supervisor::new(log, registry, None);
        let scheduler = Scheduler::new(supervisor.clone());
        let webhooks = Arc::new(WebhookRouter::new(supervisor.clone()));
        AppState { supervisor, scheduler, webhooks }
    }

    #[test]
    fn router_builds_without_panicking() {
        let _router = create_router(test_state());
    }
}
