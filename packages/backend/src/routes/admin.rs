use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{post, put};
use axum::Router;
use serde::Deserialize;

use crate::extract::{ApiJson, ApiPath};
use crate::response::{ok, AppError};
use crate::services::lessons::{self, NewLesson};
use crate::services::plan;
use crate::state::AppState;
use crate::time::{now_ms, parse_iso_ms};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/lessons", post(create_lesson))
        .route("/users/:id/plan", put(set_plan))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlanBody {
    tier: String,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    period_end: Option<String>,
}

fn default_status() -> String {
    "active".to_string()
}

async fn create_lesson(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<NewLesson>,
) -> Result<impl IntoResponse, AppError> {
    let lesson = lessons::create_lesson(state.pool(), payload, now_ms()).await?;
    Ok((StatusCode::CREATED, ok(lesson)))
}

async fn set_plan(
    State(state): State<AppState>,
    ApiPath(user_id): ApiPath<String>,
    ApiJson(payload): ApiJson<PlanBody>,
) -> Result<impl IntoResponse, AppError> {
    let period_end_ms = match payload.period_end.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(parse_iso_ms(raw).ok_or_else(|| {
            AppError::validation(format!("periodEnd is not a valid date: {raw}"))
        })?),
    };

    let now = now_ms();
    let user = plan::set_plan(
        state.pool(),
        &user_id,
        &payload.tier,
        &payload.status,
        period_end_ms,
        now,
    )
    .await?;

    let overview = plan::plan_overview(state.pool(), &user, &state.config().plan_limits, now).await?;
    Ok(ok(overview))
}
