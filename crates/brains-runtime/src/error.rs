use thiserror::Error;

/// Errors raised by the supervisor, signal queue, scheduler, and webhook
/// router. Distinct from [`brains_core::CoreError`], which only ever
/// describes a single run's execution — this crate's errors are about
/// routing and orchestrating runs, not about what happens inside one.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("no brain titled '{0}' is registered")]
    UnknownBrain(String),

    #[error("no run with id '{0}'")]
    UnknownRun(String),

    #[error("run '{0}' has already reached a terminal status")]
    RunTerminal(String),

    #[error("no schedule with id '{0}'")]
    UnknownSchedule(String),

    #[error("no webhook handler registered for slug '{0}'")]
    UnknownWebhookSlug(String),

    #[error(transparent)]
    SignalRejected(#[from] brains_types::SignalRejected),

    #[error(transparent)]
    Checkpoint(#[from] brains_checkpoint::CheckpointError),

    #[error(transparent)]
    Core(#[from] brains_core::CoreError),

    #[error("invalid cron expression '{0}': {1}")]
    InvalidCron(String, String),

    #[error("unknown timezone '{0}'")]
    InvalidTimezone(String),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
