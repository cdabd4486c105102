pub mod api;
mod middleware;

pub use api::{ApiState, build_api_router};
pub use middleware::RequestContext;

use axum::{Router, middleware as axum_middleware};

use middleware::{log_responses, set_request_context};

/// The full HTTP surface with request ids and error logging applied.
pub fn build_router(state: ApiState) -> Router {
    build_api_router(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
