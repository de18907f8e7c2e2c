use std::net::SocketAddr;
use std::process::ExitCode;

use tutorly_backend::config::Config;
use tutorly_backend::services::llm_provider::LLMProvider;
use tutorly_backend::state::AppState;
use tutorly_backend::workers::WorkerManager;
use tutorly_backend::{build_router, db, logging};

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();
    let _log_guard = logging::init_tracing(&config);

    let pool = match db::init_pool(&config.database_path).await {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(
                error = %err,
                path = %config.database_path.display(),
                "failed to open database"
            );
            return ExitCode::FAILURE;
        }
    };

    let worker_manager = if config.worker_leader {
        match WorkerManager::new(pool.clone()).await {
            Ok(manager) => {
                if let Err(e) = manager.start().await {
                    tracing::error!(error = %e, "failed to start workers");
                }
                Some(manager)
            }
            Err(e) => {
                tracing::warn!(error = %e, "worker manager not initialized");
                None
            }
        }
    } else {
        tracing::info!("WORKER_LEADER not set, skipping worker startup");
        None
    };

    let llm = LLMProvider::from_env();
    if !llm.is_available() {
        tracing::warn!("LLM not configured, tutor questions will be rejected");
    }

    let addr = config.bind_addr();
    let app = build_router(AppState::new(pool.clone(), config, llm));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, %addr, "failed to bind listener");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(%addr, "tutorly backend listening");

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        tracing::error!(error = %e, "server error");
    }

    tracing::info!("HTTP server stopped, initiating graceful shutdown sequence");

    if let Some(ref manager) = worker_manager {
        manager.stop().await;
    }
    pool.close().await;

    tracing::info!("Graceful shutdown complete");
    ExitCode::SUCCESS
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
