//! API Routes
//!
//! Configures the Axum router with all sync service endpoints.

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    health_handler, invalidate_handler, login_handler, notification_handler, page_handler,
    realtime_status_handler, stats_handler, table_get_handler, table_insert_handler,
    voucher_handler, AppState,
};
use crate::guard::route_guard;

/// Creates the main router with all endpoints configured.
///
/// # Middleware
/// - Route guard: runs ahead of every handler, redirecting by role
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/voucher", post(voucher_handler))
        .route("/tables/:table", get(table_get_handler).post(table_insert_handler))
        .route("/cache/invalidate", post(invalidate_handler))
        .route("/cache/stats", get(stats_handler))
        .route("/realtime/status", get(realtime_status_handler))
        .route("/notifications", post(notification_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .route("/login", get(login_handler))
        .route("/admin", get(page_handler))
        .route("/admin/*page", get(page_handler))
        .route("/staff", get(page_handler))
        .route("/staff/*page", get(page_handler))
        .layer(middleware::from_fn_with_state(
            state.guard.clone(),
            route_guard,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
