//! HTTP surface over the like counter.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use state::{HealthCheck, HttpState};

use axum::{Router, middleware as axum_middleware, routing::get};

use self::middleware::{log_responses, set_request_context};

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route(
            "/albums/{id}/likes",
            get(handlers::get_album_likes)
                .post(handlers::like_album)
                .delete(handlers::unlike_album),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
