use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use fairshare_core::UserId;

use crate::context::CallerContext;

/// Header carrying the authenticated caller's user id (a UUID).
///
/// Set by the upstream authentication gateway; requests without it are
/// rejected before reaching any handler.
pub const CALLER_HEADER: &str = "x-user-id";

pub async fn identity_middleware(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = extract_caller(req.headers())?;

    req.extensions_mut().insert(CallerContext::new(user_id));

    Ok(next.run(req).await)
}

fn extract_caller(headers: &HeaderMap) -> Result<UserId, StatusCode> {
    let header = headers
        .get(CALLER_HEADER)
        .ok_or(StatusCode::UNAUTHORIZED)?;

    let header = header.to_str().map_err(|_| StatusCode::UNAUTHORIZED)?;

    header
        .trim()
        .parse::<UserId>()
        .map_err(|_| StatusCode::UNAUTHORIZED)
}
