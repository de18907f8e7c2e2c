use std::time::Instant;

use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::operations::users;
use crate::services::plan::PAST_DUE_GRACE_MS;

/// Cancels paid plans whose period ended more than the grace period ago.
pub async fn expire_lapsed_plans(pool: &SqlitePool, now_ms: i64) -> Result<u64, super::WorkerError> {
    let start = Instant::now();
    debug!("Starting plan expiry cycle");

    let canceled = users::cancel_lapsed_plans(pool, now_ms - PAST_DUE_GRACE_MS, now_ms).await?;

    info!(
        canceled,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Plan expiry completed"
    );
    Ok(canceled)
}
