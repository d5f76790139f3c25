mod validate;

pub use validate::*;

use axum::{
    Json, Router,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Public routes. `validate_rpm` = 0 disables per-IP rate limiting on the
/// validation endpoint.
pub fn router(validate_rpm: u32) -> Router<AppState> {
    let mut validate = Router::new().route("/premium/keys/validate", post(validate_premium_key));
    if validate_rpm > 0 {
        validate = validate.layer(rate_limit::standard_layer(validate_rpm));
    }

    Router::new().route("/health", get(health)).merge(validate)
}
