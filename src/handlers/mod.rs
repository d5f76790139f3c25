pub mod admin;
pub mod public;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// All API routes, without CORS or tracing layers (added in `main`).
pub fn router(state: AppState, validate_rpm: u32) -> Router<AppState> {
    Router::new()
        // Public endpoints (no auth)
        .merge(public::router(validate_rpm))
        // Webhook endpoints (shared-secret auth)
        .merge(webhooks::router())
        // Admin API (admin bearer auth)
        .merge(admin::router(state))
}
