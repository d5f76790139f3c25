pub mod common;
mod ingest;

pub use ingest::*;

use axum::{Router, routing::post};

use crate::db::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhooks/{provider}", post(handle_webhook))
}
