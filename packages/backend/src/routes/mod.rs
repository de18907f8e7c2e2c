use axum::http::StatusCode;
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::Router;

use crate::middleware::{rate_limit_middleware, require_admin, require_user};
use crate::response::json_error;
use crate::state::AppState;

pub mod admin;
pub mod analytics;
pub mod health;
pub mod lessons;
pub mod plan;
pub mod quizzes;
pub mod reviews;
pub mod tutor;

pub fn router(state: AppState) -> Router {
    let learner = Router::new()
        .nest("/plan", plan::router())
        .nest("/lessons", lessons::router())
        .nest("/reviews", reviews::router())
        .nest("/quizzes", quizzes::router())
        .nest("/tutor", tutor::router())
        .nest("/analytics", analytics::router())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    let admin = admin::router()
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let api = Router::new().merge(learner).nest("/admin", admin);

    Router::new()
        .nest("/health", health::router())
        .nest("/api", api)
        .fallback(fallback_handler)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn fallback_handler() -> Response {
    json_error(StatusCode::NOT_FOUND, "NOT_FOUND", "Route not found").into_response()
}
