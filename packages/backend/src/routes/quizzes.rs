use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Router};
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath};
use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::quizzes::{self, QuizAnswer};
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(generate))
        .route("/:id", get(detail))
        .route("/:id/submit", post(submit))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    #[serde(default)]
    lesson_id: Option<String>,
    #[serde(default)]
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SubmitBody {
    answers: Vec<QuizAnswer>,
}

async fn generate(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiJson(payload): ApiJson<GenerateBody>,
) -> Result<impl IntoResponse, AppError> {
    let quiz = quizzes::generate(
        state.pool(),
        &user,
        payload.lesson_id.as_deref(),
        payload.size,
        &state.config().plan_limits,
        now_ms(),
    )
    .await?;
    Ok(ok(quiz))
}

async fn detail(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(quizzes::get(state.pool(), &user.id, &id).await?))
}

async fn submit(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    ApiPath(id): ApiPath<String>,
    ApiJson(payload): ApiJson<SubmitBody>,
) -> Result<impl IntoResponse, AppError> {
    Ok(ok(quizzes::submit(state.pool(), &user.id, &id, &payload.answers, now_ms()).await?))
}
