//! Route configuration.

use crate::handlers;
use crate::state::AppState;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.server.body_limit;

    let entry_routes = Router::new()
        .route(
            "/settings/entries",
            post(handlers::create_entry).get(handlers::list_entries),
        )
        .route(
            "/settings/entries/{id}",
            get(handlers::get_entry)
                .put(handlers::update_entry)
                .delete(handlers::delete_entry),
        )
        .route("/settings/tenant", post(handlers::init_tenant))
        .layer(DefaultBodyLimit::max(body_limit));

    // The upload body is framed incrementally and never buffered, so the
    // point-write body limit does not apply to it.
    let upload_routes = Router::new()
        .route("/settings/upload", put(handlers::upload_entries))
        .layer(DefaultBodyLimit::disable());

    Router::new()
        .merge(entry_routes)
        .merge(upload_routes)
        .route("/health", get(handlers::health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
