use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};

use crate::extract::ApiPath;
use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::{lessons, reviews};
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list))
        .route("/:id", get(detail))
        .route("/:id/enroll", post(enroll))
}

async fn list(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(lessons::list_lessons(state.pool(), &user, now_ms()).await?))
}

async fn detail(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(lessons::get_lesson(state.pool(), &user, &id, now_ms()).await?))
}

async fn enroll(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(reviews::enroll(state.pool(), &user, &id, now_ms()).await?))
}
