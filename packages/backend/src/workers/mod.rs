mod plan_expiry;
mod progress_snapshot;

pub use plan_expiry::expire_lapsed_plans;
pub use progress_snapshot::snapshot_all_learners;

use sqlx::SqlitePool;
use tokio::sync::{broadcast, Mutex};
use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info, warn};

use crate::config::env_string;

const PLAN_EXPIRY_SCHEDULE: &str = "0 5 * * * *";
const PROGRESS_SNAPSHOT_SCHEDULE: &str = "0 30 0 * * *";

pub struct WorkerManager {
    scheduler: Mutex<JobScheduler>,
    shutdown_tx: broadcast::Sender<()>,
    pool: SqlitePool,
}

impl WorkerManager {
    pub async fn new(pool: SqlitePool) -> Result<Self, WorkerError> {
        let scheduler = JobScheduler::new().await?;
        let (shutdown_tx, _) = broadcast::channel(1);
        Ok(Self {
            scheduler: Mutex::new(scheduler),
            shutdown_tx,
            pool,
        })
    }

    pub async fn start(&self) -> Result<(), WorkerError> {
        info!("Starting workers (leader mode)");
        let scheduler = self.scheduler.lock().await;

        let schedule = env_string("PLAN_EXPIRY_SCHEDULE")
            .unwrap_or_else(|| PLAN_EXPIRY_SCHEDULE.to_string());
        let pool = self.pool.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let pool = pool.clone();
            let mut rx = shutdown_rx.resubscribe();
            Box::pin(async move {
                tokio::select! {
                    _ = rx.recv() => {},
                    result = expire_lapsed_plans(&pool, crate::time::now_ms()) => {
                        if let Err(e) = result {
                            error!(error = %e, "Plan expiry worker error");
                        }
                    }
                }
            })
        })?;
        scheduler.add(job).await?;
        info!(schedule = %schedule, "Plan expiry worker scheduled");

        let schedule = env_string("PROGRESS_SNAPSHOT_SCHEDULE")
            .unwrap_or_else(|| PROGRESS_SNAPSHOT_SCHEDULE.to_string());
        let pool = self.pool.clone();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let job = Job::new_async(schedule.as_str(), move |_uuid, _lock| {
            let pool = pool.clone();
            let mut rx = shutdown_rx.resubscribe();
            Box::pin(async move {
                tokio::select! {
                    _ = rx.recv() => {},
                    result = snapshot_all_learners(&pool, crate::time::now_ms()) => {
                        if let Err(e) = result {
                            error!(error = %e, "Progress snapshot worker error");
                        }
                    }
                }
            })
        })?;
        scheduler.add(job).await?;
        info!(schedule = %schedule, "Progress snapshot worker scheduled");

        scheduler.start().await?;
        info!("All workers started");
        Ok(())
    }

    pub async fn stop(&self) {
        info!("Stopping workers...");
        let _ = self.shutdown_tx.send(());

        let mut scheduler = self.scheduler.lock().await;
        if let Err(e) = scheduler.shutdown().await {
            warn!(error = %e, "Error shutting down scheduler");
        }
        info!("Workers stopped");
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] tokio_cron_scheduler::JobSchedulerError),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}
