use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::db::operations::users::{self, is_valid_user_id, UserRow};
use crate::response::{json_error, AppError};
use crate::state::AppState;

pub const USER_ID_HEADER: &str = "x-user-id";

/// The learner the request acts for, resolved from `X-User-Id`.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub UserRow);

pub fn extract_user_id(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(USER_ID_HEADER)?.to_str().ok()?.trim();
    is_valid_user_id(raw).then(|| raw.to_string())
}

/// Unknown ids are provisioned on the free plan on first sight.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(user_id) = extract_user_id(req.headers()) else {
        return json_error(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Missing or invalid X-User-Id header",
        )
        .into_response();
    };

    match users::ensure_user(state.pool(), &user_id, crate::time::now_ms()).await {
        Ok(user) => {
            req.extensions_mut().insert(CurrentUser(user));
            next.run(req).await
        }
        Err(err) => AppError::from(err).into_response(),
    }
}
