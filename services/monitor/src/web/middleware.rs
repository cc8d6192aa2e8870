//! services/monitor/src/web/middleware.rs
//!
//! Identifies the calling user for protected routes.

use axum::{
    extract::Request,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use paper_watch_core::domain::UserId;
use tracing::debug;

/// Carries the chat id of the user the request acts for.
pub const USER_ID_HEADER: &str = "x-user-id";

pub fn user_id_from_headers(headers: &HeaderMap) -> Option<UserId> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<UserId>().ok())
}

/// Middleware that extracts the user id from the `x-user-id` header.
///
/// If valid, inserts the user id into request extensions for handlers to use.
/// If invalid or missing, returns 401 Unauthorized.
pub async fn require_user(mut req: Request, next: Next) -> Result<Response, StatusCode> {
    let user_id = user_id_from_headers(req.headers()).ok_or_else(|| {
        debug!(path = %req.uri().path(), "Rejected request without a valid x-user-id header");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
