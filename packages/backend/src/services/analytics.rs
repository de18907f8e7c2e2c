use std::collections::HashMap;

use serde::Serialize;
use sqlx::SqlitePool;
use tutorly_algo::{
    day_index, detect_weaknesses, study_streak, summarize, topic_breakdown, ItemStats,
    ProgressSummary, StreakInfo, TopicSummary, WeaknessConfig, WeaknessReason,
};

use crate::db::operations::reviews::{self, ReviewItemRow};
use crate::db::operations::snapshots::{self, SnapshotRow};
use crate::db::operations::users::UserRow;
use crate::services::plan::{self, Feature, PlanError};
use crate::time::day_key;

pub const DEFAULT_WEAKNESS_LIMIT: usize = 10;
pub const MAX_WEAKNESS_LIMIT: usize = 50;
pub const DEFAULT_HISTORY_DAYS: i64 = 30;
pub const MAX_HISTORY_DAYS: i64 = 365;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeakCard {
    pub card_id: String,
    pub lesson_id: String,
    pub prompt: String,
    pub topic: String,
    pub score: f64,
    pub accuracy: f64,
    pub ease_factor: f64,
    pub retention: f64,
    pub reasons: Vec<WeaknessReason>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeaknessReport {
    pub cards: Vec<WeakCard>,
    pub weak_topics: Vec<TopicSummary>,
}

async fn load_items(pool: &SqlitePool, user_id: &str) -> Result<Vec<ReviewItemRow>, sqlx::Error> {
    reviews::list_items(pool, user_id).await
}

fn to_stats(rows: &[ReviewItemRow]) -> Vec<ItemStats> {
    rows.iter().map(ReviewItemRow::item_stats).collect()
}

pub async fn summary(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
) -> Result<ProgressSummary, AnalyticsError> {
    let rows = load_items(pool, user_id).await?;
    Ok(summarize(&to_stats(&rows), now_ms, &WeaknessConfig::default()))
}

pub async fn weaknesses(
    pool: &SqlitePool,
    user: &UserRow,
    limit: usize,
    now_ms: i64,
) -> Result<WeaknessReport, AnalyticsError> {
    plan::require(user, Feature::WeaknessReport, now_ms)?;

    let rows = load_items(pool, &user.id).await?;
    let stats = to_stats(&rows);
    let config = WeaknessConfig {
        limit: limit.clamp(1, MAX_WEAKNESS_LIMIT),
        ..WeaknessConfig::default()
    };

    let by_card: HashMap<&str, &ReviewItemRow> =
        rows.iter().map(|r| (r.card_id.as_str(), r)).collect();
    let cards = detect_weaknesses(&stats, now_ms, &config)
        .into_iter()
        .filter_map(|w| {
            let row = by_card.get(w.item_id.as_str())?;
            Some(WeakCard {
                card_id: w.item_id,
                lesson_id: row.lesson_id.clone(),
                prompt: row.prompt.clone(),
                topic: w.topic,
                score: w.score,
                accuracy: w.accuracy,
                ease_factor: w.ease_factor,
                retention: w.retention,
                reasons: w.reasons,
            })
        })
        .collect();

    let weak_topics = topic_breakdown(&stats, now_ms, &config)
        .into_iter()
        .filter(|t| t.weak > 0)
        .collect();

    Ok(WeaknessReport { cards, weak_topics })
}

pub async fn topics(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
) -> Result<Vec<TopicSummary>, AnalyticsError> {
    let rows = load_items(pool, user_id).await?;
    Ok(topic_breakdown(&to_stats(&rows), now_ms, &WeaknessConfig::default()))
}

pub async fn streak(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
) -> Result<StreakInfo, AnalyticsError> {
    let days = reviews::list_active_days(pool, user_id).await?;
    Ok(study_streak(&days, day_index(now_ms)))
}

pub async fn history(
    pool: &SqlitePool,
    user_id: &str,
    days: i64,
) -> Result<Vec<SnapshotRow>, AnalyticsError> {
    Ok(snapshots::list_snapshots(pool, user_id, days.clamp(1, MAX_HISTORY_DAYS)).await?)
}

/// Computes today's progress for one learner and stores it.
pub async fn record_snapshot(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
) -> Result<SnapshotRow, AnalyticsError> {
    let progress = summary(pool, user_id, now_ms).await?;
    let snapshot = SnapshotRow {
        user_id: user_id.to_string(),
        day: day_key(now_ms),
        total_items: progress.total_items as i64,
        mastered_items: progress.mastered_items as i64,
        weak_items: progress.weak_items as i64,
        due_now: progress.due_now as i64,
        accuracy: progress.accuracy,
        average_retention: progress.average_retention,
        created_at: now_ms,
    };
    snapshots::upsert_snapshot(pool, &snapshot).await?;
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::db::operations::users;
    use crate::services::lessons::{create_lesson, NewCard, NewLesson};
    use crate::services::reviews::{enroll, submit_review, ReviewSubmission};
    use tutorly_algo::DAY_MS;

    const NOW: i64 = 1_700_000_000_000;

    async fn seeded() -> (tempfile::TempDir, SqlitePool, UserRow, Vec<String>) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("analytics.db")).await.unwrap();
        let user = users::ensure_user(&pool, "student", NOW).await.unwrap();
        let lesson = create_lesson(
            &pool,
            NewLesson {
                title: "Fractions".to_string(),
                topic: "math".to_string(),
                summary: None,
                body: None,
                level: None,
                premium: false,
                cards: vec![
                    NewCard {
                        prompt: "1/2 + 1/4".to_string(),
                        answer: "3/4".to_string(),
                        topic: Some("fractions".to_string()),
                    },
                    NewCard {
                        prompt: "0.5 * 2".to_string(),
                        answer: "1".to_string(),
                        topic: Some("decimals".to_string()),
                    },
                ],
            },
            NOW,
        )
        .await
        .unwrap();
        enroll(&pool, &user, &lesson.lesson.id, NOW).await.unwrap();
        let card_ids = lesson.cards.iter().map(|c| c.id.clone()).collect();
        (dir, pool, user, card_ids)
    }

    fn quality(q: i64) -> ReviewSubmission {
        ReviewSubmission {
            quality: Some(q),
            ..ReviewSubmission::default()
        }
    }

    #[tokio::test]
    async fn test_summary_and_streak() {
        let (_dir, pool, user, cards) = seeded().await;
        submit_review(&pool, &user.id, &cards[0], &quality(5), NOW - DAY_MS).await.unwrap();
        submit_review(&pool, &user.id, &cards[0], &quality(4), NOW).await.unwrap();

        let progress = summary(&pool, &user.id, NOW).await.unwrap();
        assert_eq!(progress.total_items, 2);
        assert_eq!(progress.new_items, 1);
        assert_eq!(progress.total_attempts, 2);
        assert_eq!(progress.accuracy, Some(1.0));

        let info = streak(&pool, &user.id, NOW).await.unwrap();
        assert_eq!(info.current, 2);
        assert!(info.active_today);
    }

    #[tokio::test]
    async fn test_weakness_report_needs_paid_plan() {
        let (_dir, pool, user, cards) = seeded().await;
        for q in [1, 0, 2, 1] {
            submit_review(&pool, &user.id, &cards[0], &quality(q), NOW).await.unwrap();
        }

        let err = weaknesses(&pool, &user, 10, NOW).await.unwrap_err();
        assert!(matches!(err, AnalyticsError::Plan(PlanError::FeatureLocked { .. })));

        let premium = plan::set_plan(&pool, &user.id, "premium", "active", None, NOW)
            .await
            .unwrap();
        let report = weaknesses(&pool, &premium, 10, NOW).await.unwrap();
        assert_eq!(report.cards.len(), 1);
        assert_eq!(report.cards[0].card_id, cards[0]);
        assert_eq!(report.cards[0].topic, "fractions");
        assert!(report.cards[0].reasons.contains(&WeaknessReason::RepeatedLapses));
        assert_eq!(report.weak_topics.len(), 1);

        let breakdown = topics(&pool, &user.id, NOW).await.unwrap();
        assert_eq!(breakdown[0].topic, "fractions");
    }

    #[tokio::test]
    async fn test_snapshot_upsert_and_history() {
        let (_dir, pool, user, cards) = seeded().await;
        record_snapshot(&pool, &user.id, NOW - DAY_MS).await.unwrap();
        submit_review(&pool, &user.id, &cards[1], &quality(5), NOW).await.unwrap();
        record_snapshot(&pool, &user.id, NOW).await.unwrap();
        record_snapshot(&pool, &user.id, NOW + 1_000).await.unwrap();

        let rows = history(&pool, &user.id, 30).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].day < rows[1].day);
        assert_eq!(rows[1].accuracy, Some(1.0));
    }
}
