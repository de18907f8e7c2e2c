use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::response::json_error;
use crate::state::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

fn extract_admin_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(ADMIN_TOKEN_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Compares without short-circuiting on the first differing byte.
fn tokens_match(expected: &str, given: &str) -> bool {
    let (a, b) = (expected.as_bytes(), given.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub async fn require_admin(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(expected) = state.config().admin_token.as_deref() else {
        return json_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "ADMIN_DISABLED",
            "Admin API is not configured",
        )
        .into_response();
    };

    let Some(token) = extract_admin_token(req.headers()) else {
        return json_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Missing admin token")
            .into_response();
    };

    if !tokens_match(expected, token) {
        tracing::warn!("rejected admin request with invalid token");
        return json_error(StatusCode::FORBIDDEN, "FORBIDDEN", "Invalid admin token")
            .into_response();
    }

    next.run(req).await
}
