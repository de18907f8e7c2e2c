use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::tutor::{self, AskRequest, DEFAULT_HISTORY_LIMIT};
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ask", post(ask))
        .route("/history", get(history))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<i64>,
}

async fn ask(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<AskRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(tutor::ask(&state.tutor_deps(), &user, &payload, now_ms()).await?))
}

async fn history(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiQuery(query): ApiQuery<HistoryQuery>,
) -> Result<impl IntoResponse, AppError> {
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(ok(tutor::history(state.pool(), &user.id, limit).await?))
}
