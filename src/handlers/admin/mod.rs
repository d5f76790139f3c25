mod keys;

pub use keys::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::admin_auth;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/keys", get(list_keys))
        .route("/admin/keys/create", post(create_key))
        .route("/admin/keys/revoke", post(revoke_key))
        .route("/admin/keys/revoke_all", post(revoke_all_keys))
        .layer(middleware::from_fn_with_state(state, admin_auth))
}
