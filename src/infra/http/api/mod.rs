pub mod error;
pub mod extract;
pub mod handlers;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router,
    routing::{get, post, put},
};

pub fn build_api_router(state: ApiState) -> Router {
    Router::new()
        .route(
            "/flags",
            get(handlers::list_flags).post(handlers::create_flag),
        )
        .route(
            "/flags/{name}",
            get(handlers::get_flag)
                .put(handlers::update_flag)
                .delete(handlers::delete_flag),
        )
        .route("/flags/{name}/evaluate", post(handlers::evaluate_flag))
        .route(
            "/flags/{name}/users/{target_id}",
            put(handlers::set_user_override).delete(handlers::remove_user_override),
        )
        .route(
            "/flags/{name}/groups/{target_id}",
            put(handlers::set_group_override).delete(handlers::remove_group_override),
        )
        .route(
            "/flags/{name}/regions/{target_id}",
            put(handlers::set_region_override).delete(handlers::remove_region_override),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
}
