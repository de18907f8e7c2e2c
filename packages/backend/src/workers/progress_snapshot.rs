use std::time::Instant;

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use crate::db::operations::users;
use crate::services::analytics;

/// Stores today's progress row for every learner with review items.
/// A failing learner is logged and skipped.
pub async fn snapshot_all_learners(
    pool: &SqlitePool,
    now_ms: i64,
) -> Result<usize, super::WorkerError> {
    let start = Instant::now();
    debug!("Starting progress snapshot cycle");

    let learners = users::list_learner_ids(pool).await?;
    let mut stored = 0usize;
    for user_id in &learners {
        match analytics::record_snapshot(pool, user_id, now_ms).await {
            Ok(_) => stored += 1,
            Err(e) => warn!(user_id = %user_id, error = %e, "progress snapshot failed"),
        }
    }

    info!(
        learners = learners.len(),
        stored,
        duration_secs = format!("{:.2}", start.elapsed().as_secs_f64()),
        "Progress snapshot completed"
    );
    Ok(stored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::db::operations::snapshots;
    use crate::services::lessons::{create_lesson, NewCard, NewLesson};
    use crate::services::reviews::enroll;

    const NOW: i64 = 1_700_000_000_000;

    #[tokio::test]
    async fn test_snapshots_every_enrolled_learner() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("snap.db")).await.unwrap();
        let lesson = create_lesson(
            &pool,
            NewLesson {
                title: "Verbs".to_string(),
                topic: "spanish".to_string(),
                summary: None,
                body: None,
                level: None,
                premium: false,
                cards: vec![NewCard {
                    prompt: "to eat".to_string(),
                    answer: "comer".to_string(),
                    topic: None,
                }],
            },
            NOW,
        )
        .await
        .unwrap();

        for id in ["ana", "ben"] {
            let user = users::ensure_user(&pool, id, NOW).await.unwrap();
            enroll(&pool, &user, &lesson.lesson.id, NOW).await.unwrap();
        }
        users::ensure_user(&pool, "idle", NOW).await.unwrap();

        assert_eq!(snapshot_all_learners(&pool, NOW).await.unwrap(), 2);
        assert_eq!(snapshot_all_learners(&pool, NOW + 60_000).await.unwrap(), 2);

        let rows = snapshots::list_snapshots(&pool, "ana", 30).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].total_items, 1);
        assert!(snapshots::list_snapshots(&pool, "idle", 30).await.unwrap().is_empty());
    }
}
