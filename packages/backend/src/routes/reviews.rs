use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::reviews::{self, ReviewSubmission, DEFAULT_DUE_LIMIT};
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/due", get(due))
        .route("/:card_id", post(submit))
        .route("/:card_id/preview", get(preview))
}

#[derive(Debug, Deserialize)]
struct DueQuery {
    limit: Option<i64>,
}

async fn due(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<DueQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_DUE_LIMIT);
    Ok(ok(reviews::due_items(state.pool(), &user.id, now_ms(), limit).await?))
}

async fn submit(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(card_id): ApiPath<String>,
    ApiJson(payload): ApiJson<ReviewSubmission>,
) -> Result<impl IntoResponse, AppError> {
    let result = reviews::submit_review(state.pool(), &user.id, &card_id, &payload, now_ms()).await?;
    Ok(ok(result))
}

async fn preview(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(card_id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(reviews::preview_item(state.pool(), &user.id, &card_id, now_ms()).await?))
}
