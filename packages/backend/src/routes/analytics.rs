use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};
use serde::Deserialize;

use crate::extract::ApiQuery;
use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::analytics::{self, DEFAULT_HISTORY_DAYS, DEFAULT_WEAKNESS_LIMIT};
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/summary", get(summary))
        .route("/weaknesses", get(weaknesses))
        .route("/topics", get(topics))
        .route("/streak", get(streak))
        .route("/history", get(history))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    days: Option<i64>,
}

async fn summary(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(analytics::summary(state.pool(), &user.id, now_ms()).await?))
}

async fn weaknesses(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<LimitQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_WEAKNESS_LIMIT);
    Ok(ok(analytics::weaknesses(state.pool(), &user, limit, now_ms()).await?))
}

async fn topics(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(analytics::topics(state.pool(), &user.id, now_ms()).await?))
}

async fn streak(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(analytics::streak(state.pool(), &user.id, now_ms()).await?))
}

async fn history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let days = query.days.unwrap_or(DEFAULT_HISTORY_DAYS);
    Ok(ok(analytics::history(state.pool(), &user.id, days).await?))
}
