use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::*;
use crate::context::context_middleware;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/init", get(init))
        .route("/cleanup", get(cleanup))
        .route("/test1", get(test1))
        .route("/test2", get(test2))
        .route("/test3", get(test3))
        .route("/test4", get(test4))
        .layer(middleware::from_fn(context_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
