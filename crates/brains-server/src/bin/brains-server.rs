//! Standalone binary hosting the brains HTTP surface. A real deployment
//! registers its brains and event log backend in its own `main`; this binary
//! exists to exercise the router end to end with an in-memory log and no
//! brains registered, and as a template for that registration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brains_checkpoint::InMemoryEventLog;
use brains_runtime::{BrainRegistry, Scheduler, Supervisor, WebhookRouter};
use brains_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let log = Arc::new(InMemoryEventLog::new());
    let registry = Arc::new(BrainRegistry::new());
    let supervisor = Supervisor::new(log, registry, None);

    let scheduler = Scheduler::new(supervisor.clone());
    scheduler.spawn_polling(Duration::from_secs(1));
    let webhooks = Arc::new(WebhookRouter::new(supervisor.clone()));

    let state = AppState { supervisor, scheduler, webhooks };
    let router = create_router(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "8080".to_string()).parse::<u16>().expect("PORT must be a valid u16");
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let addr: SocketAddr = format!("{host}:{port}").parse()?;

    tracing::info!("brains-server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
