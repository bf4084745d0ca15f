//! HTTP surface for the brains workflow runtime (§6.2): run control,
//! scheduling, and the webhook router, laid over a shared [`routes::AppState`].

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod sse;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::{create_router, AppState};
