use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use tutorly_algo::{ItemStats, ReviewOutcome, ReviewState};

use super::lessons::CardRow;

/// A learner's scheduling row for one card, joined with the card content.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItemRow {
    pub id: String,
    pub user_id: String,
    pub card_id: String,
    pub lesson_id: String,
    pub prompt: String,
    pub answer: String,
    pub topic: String,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    pub correct_count: i64,
    pub incorrect_count: i64,
    pub last_quality: Option<i64>,
    pub last_reviewed_at: Option<i64>,
    pub next_review_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ReviewItemRow {
    pub fn review_state(&self) -> ReviewState {
        ReviewState {
            interval_days: self.interval_days,
            ease_factor: self.ease_factor,
            repetitions: to_u32(self.repetitions),
            correct_count: to_u32(self.correct_count),
            incorrect_count: to_u32(self.incorrect_count),
        }
    }

    pub fn item_stats(&self) -> ItemStats {
        ItemStats {
            item_id: self.card_id.clone(),
            topic: self.topic.clone(),
            state: self.review_state(),
            last_reviewed_ms: self.last_reviewed_at,
            next_review_ms: Some(self.next_review_at),
        }
    }
}

fn to_u32(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

pub struct AnswerInsert<'a> {
    pub user_id: &'a str,
    pub card_id: &'a str,
    pub quality: u8,
    pub is_correct: bool,
    pub response_time_ms: Option<i64>,
    pub source: &'a str,
}

const ITEM_SELECT: &str = r#"
    SELECT r.*, c."lessonId", c."prompt", c."answer", c."topic"
    FROM "review_items" r
    JOIN "cards" c ON c."id" = r."cardId"
"#;

/// Creates one review item per card, due now. Existing items are kept.
pub async fn enroll_cards(
    tx: &mut Transaction<'_, Sqlite>,
    user_id: &str,
    cards: &[CardRow],
    now_ms: i64,
) -> Result<u64, sqlx::Error> {
    let defaults = ReviewState::default();
    let mut created = 0;

    for card in cards {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO "review_items"
                ("id", "userId", "cardId", "intervalDays", "easeFactor", "repetitions",
                 "correctCount", "incorrectCount", "nextReviewAt", "createdAt", "updatedAt")
            VALUES (?, ?, ?, ?, ?, 0, 0, 0, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(&card.id)
        .bind(defaults.interval_days)
        .bind(defaults.ease_factor)
        .bind(now_ms)
        .bind(now_ms)
        .bind(now_ms)
        .execute(&mut **tx)
        .await?;
        created += result.rows_affected();
    }

    Ok(created)
}

pub async fn get_item<'e, E>(
    executor: E,
    user_id: &str,
    card_id: &str,
) -> Result<Option<ReviewItemRow>, sqlx::Error>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(r#"{ITEM_SELECT} WHERE r."userId" = ? AND r."cardId" = ?"#);
    let row = sqlx::query(&sql)
        .bind(user_id)
        .bind(card_id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(map_item).transpose()
}

/// Items due at `now_ms`, longest-waiting first.
pub async fn list_due_items(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
    limit: i64,
) -> Result<Vec<ReviewItemRow>, sqlx::Error> {
    let sql = format!(
        r#"{ITEM_SELECT} WHERE r."userId" = ? AND r."nextReviewAt" <= ? ORDER BY r."nextReviewAt", r."id" LIMIT ?"#
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(now_ms)
        .bind(limit)
        .fetch_all(pool)
        .await?;
    rows.iter().map(map_item).collect()
}

pub async fn count_due_items(pool: &SqlitePool, user_id: &str, now_ms: i64) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "review_items" WHERE "userId" = ? AND "nextReviewAt" <= ?"#,
    )
    .bind(user_id)
    .bind(now_ms)
    .fetch_one(pool)
    .await
}

pub async fn list_items(pool: &SqlitePool, user_id: &str) -> Result<Vec<ReviewItemRow>, sqlx::Error> {
    let sql = format!(r#"{ITEM_SELECT} WHERE r."userId" = ? ORDER BY r."cardId""#);
    let rows = sqlx::query(&sql).bind(user_id).fetch_all(pool).await?;
    rows.iter().map(map_item).collect()
}

/// Writes a scheduling outcome and its answer record. The caller commits.
pub async fn apply_review(
    tx: &mut Transaction<'_, Sqlite>,
    item_id: &str,
    outcome: &ReviewOutcome,
    answer: &AnswerInsert<'_>,
    now_ms: i64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "review_items"
        SET "intervalDays" = ?, "easeFactor" = ?, "repetitions" = ?,
            "correctCount" = ?, "incorrectCount" = ?, "lastQuality" = ?,
            "lastReviewedAt" = ?, "nextReviewAt" = ?, "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(outcome.interval_days)
    .bind(outcome.ease_factor)
    .bind(i64::from(outcome.state.repetitions))
    .bind(i64::from(outcome.state.correct_count))
    .bind(i64::from(outcome.state.incorrect_count))
    .bind(i64::from(answer.quality))
    .bind(now_ms)
    .bind(outcome.next_review_ms)
    .bind(now_ms)
    .bind(item_id)
    .execute(&mut **tx)
    .await?;

    sqlx::query(
        r#"
        INSERT INTO "answer_records"
            ("id", "userId", "cardId", "quality", "isCorrect", "responseTimeMs", "source", "createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(answer.user_id)
    .bind(answer.card_id)
    .bind(i64::from(answer.quality))
    .bind(answer.is_correct)
    .bind(answer.response_time_ms)
    .bind(answer.source)
    .bind(now_ms)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Distinct UTC day indices on which the user answered anything.
pub async fn list_active_days(pool: &SqlitePool, user_id: &str) -> Result<Vec<i64>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT ("createdAt" / 86400000) AS "day"
        FROM "answer_records"
        WHERE "userId" = ?
        ORDER BY "day"
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

fn map_item(row: &SqliteRow) -> Result<ReviewItemRow, sqlx::Error> {
    Ok(ReviewItemRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        card_id: row.try_get("cardId")?,
        lesson_id: row.try_get("lessonId")?,
        prompt: row.try_get("prompt")?,
        answer: row.try_get("answer")?,
        topic: row.try_get("topic")?,
        interval_days: row.try_get("intervalDays")?,
        ease_factor: row.try_get("easeFactor")?,
        repetitions: row.try_get("repetitions")?,
        correct_count: row.try_get("correctCount")?,
        incorrect_count: row.try_get("incorrectCount")?,
        last_quality: row.try_get("lastQuality")?,
        last_reviewed_at: row.try_get("lastReviewedAt")?,
        next_review_at: row.try_get("nextReviewAt")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
