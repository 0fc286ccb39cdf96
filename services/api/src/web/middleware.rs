//! services/api/src/web/middleware.rs
//!
//! Identifies the caller for protected routes.

use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use studypod_core::security::sanitize_username;
use tracing::warn;

pub const USERNAME_HEADER: &str = "x-username";

/// The sanitised name of the user making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser(pub String);

/// Reads `x-username`, sanitises it and inserts a `CurrentUser` into the request
/// extensions. A missing header, or a name outside `[a-z0-9-_]`, yields 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let raw = req
        .headers()
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let username = sanitize_username(raw).map_err(|e| {
        warn!(error = %e, "Rejected request with unusable username");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(CurrentUser(username));
    Ok(next.run(req).await)
}
