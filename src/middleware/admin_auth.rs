use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::db::AppState;
use crate::error::AppError;
use crate::util::{extract_bearer_token, secrets_match};

/// Check the admin bearer token against the configured admin secret.
///
/// A missing secret is a server misconfiguration, never an open door.
fn authenticate_admin(state: &AppState, headers: &HeaderMap) -> Result<(), AppError> {
    let expected = state
        .admin_secret
        .as_deref()
        .ok_or_else(|| AppError::Misconfigured("Admin secret not configured".into()))?;
    let token = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    if !secrets_match(token, expected) {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

pub async fn admin_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    authenticate_admin(&state, request.headers())?;
    Ok(next.run(request).await)
}
