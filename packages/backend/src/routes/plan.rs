use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Extension, Router};

use crate::middleware::CurrentUser;
use crate::response::{ok, AppError};
use crate::services::plan;
use crate::state::AppState;
use crate::time::now_ms;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(overview))
        .route("/tiers", get(tiers))
}

async fn overview(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, AppError> {
    let overview =
        plan::plan_overview(state.pool(), &user, &state.config().plan_limits, now_ms()).await?;
    Ok(ok(overview))
}

async fn tiers(State(state): State<AppState>) -> impl IntoResponse {
    ok(plan::tier_catalog(&state.config().plan_limits))
}
