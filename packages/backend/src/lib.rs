pub mod config;
pub mod db;
pub mod extract;
pub mod logging;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;
pub mod time;
pub mod workers;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::config::Config;
use crate::db::DbInitError;
use crate::services::llm_provider::LLMProvider;
use crate::state::AppState;

/// Opens the database and wires the router with the LLM settings from the
/// environment.
pub async fn create_app(config: Config) -> Result<axum::Router, DbInitError> {
    create_app_with(config, LLMProvider::from_env()).await
}

pub async fn create_app_with(
    config: Config,
    llm: LLMProvider,
) -> Result<axum::Router, DbInitError> {
    let pool = db::init_pool(&config.database_path).await?;
    Ok(build_router(AppState::new(pool, config, llm)))
}

pub fn build_router(state: AppState) -> axum::Router {
    routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
