use serde::{Deserialize, Serialize};
use sqlx::{Sqlite, SqlitePool, Transaction};
use tutorly_algo::{preview, schedule, IntervalPreview, Quality, ReviewOutcome, ReviewState};

use crate::db::operations::lessons;
use crate::db::operations::reviews::{self, AnswerInsert, ReviewItemRow};
use crate::db::operations::users::UserRow;
use crate::services::lessons::{accessible_lesson, LessonError};
use crate::time::format_timestamp_ms_iso_millis;

pub const DEFAULT_DUE_LIMIT: i64 = 20;
pub const MAX_DUE_LIMIT: i64 = 200;
pub(crate) const MAX_RESPONSE_TIME_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// Either an explicit quality, or correctness plus an optional response time
/// from which a quality is derived.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSubmission {
    #[serde(default)]
    pub quality: Option<i64>,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub response_time_ms: Option<i64>,
}

impl ReviewSubmission {
    pub fn resolve_quality(&self) -> Result<Quality, ReviewError> {
        if let Some(ms) = self.response_time_ms {
            if !(0..=MAX_RESPONSE_TIME_MS).contains(&ms) {
                return Err(ReviewError::Validation(
                    "responseTimeMs must be between 0 and 86400000".to_string(),
                ));
            }
        }
        match (self.quality, self.is_correct) {
            (Some(raw), _) => Ok(Quality::new(raw)),
            (None, Some(correct)) => Ok(Quality::from_answer(correct, self.response_time_ms)),
            (None, None) => Err(ReviewError::Validation(
                "either quality or isCorrect is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollResult {
    pub lesson_id: String,
    pub cards: usize,
    pub created: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueItem {
    pub card_id: String,
    pub lesson_id: String,
    pub prompt: String,
    pub answer: String,
    pub topic: String,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: i64,
    pub next_review_at: Option<String>,
    pub overdue_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DueReviews {
    pub items: Vec<DueItem>,
    pub total_due: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub card_id: String,
    pub quality: u8,
    pub correct: bool,
    pub interval_days: i64,
    pub ease_factor: f64,
    pub repetitions: u32,
    pub next_review_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPreview {
    pub card_id: String,
    pub current: ReviewState,
    pub options: Vec<IntervalPreview>,
}

pub async fn enroll(
    pool: &SqlitePool,
    user: &UserRow,
    lesson_id: &str,
    now_ms: i64,
) -> Result<EnrollResult, ReviewError> {
    let lesson = accessible_lesson(pool, user, lesson_id, now_ms).await?;
    let cards = lessons::list_cards(pool, &lesson.id).await?;
    let mut tx = pool.begin().await?;
    let created = reviews::enroll_cards(&mut tx, &user.id, &cards, now_ms).await?;
    tx.commit().await?;

    tracing::info!(user_id = %user.id, lesson_id = %lesson.id, created, "lesson enrolled");
    Ok(EnrollResult {
        lesson_id: lesson.id,
        cards: cards.len(),
        created,
    })
}

pub async fn due_items(
    pool: &SqlitePool,
    user_id: &str,
    now_ms: i64,
    limit: i64,
) -> Result<DueReviews, ReviewError> {
    let limit = limit.clamp(1, MAX_DUE_LIMIT);
    let rows = reviews::list_due_items(pool, user_id, now_ms, limit).await?;
    let total_due = reviews::count_due_items(pool, user_id, now_ms).await?;

    let items = rows
        .into_iter()
        .map(|row| DueItem {
            overdue_ms: now_ms - row.next_review_at,
            next_review_at: format_timestamp_ms_iso_millis(row.next_review_at),
            card_id: row.card_id,
            lesson_id: row.lesson_id,
            prompt: row.prompt,
            answer: row.answer,
            topic: row.topic,
            interval_days: row.interval_days,
            ease_factor: row.ease_factor,
            repetitions: row.repetitions,
        })
        .collect();

    Ok(DueReviews { items, total_due })
}

async fn enrolled_item(
    pool: &SqlitePool,
    user_id: &str,
    card_id: &str,
) -> Result<ReviewItemRow, ReviewError> {
    reviews::get_item(pool, user_id, card_id)
        .await?
        .ok_or_else(|| ReviewError::NotFound(format!("no review item for card {card_id}")))
}

/// Schedules one answer for an item and writes both the new state and the
/// answer record inside `tx`.
pub(crate) async fn record_answer(
    tx: &mut Transaction<'_, Sqlite>,
    item: &ReviewItemRow,
    quality: Quality,
    response_time_ms: Option<i64>,
    source: &str,
    now_ms: i64,
) -> Result<ReviewOutcome, ReviewError> {
    let outcome = schedule(&item.review_state(), quality, now_ms);
    let answer = AnswerInsert {
        user_id: &item.user_id,
        card_id: &item.card_id,
        quality: quality.value(),
        is_correct: outcome.correct,
        response_time_ms,
        source,
    };
    reviews::apply_review(tx, &item.id, &outcome, &answer, now_ms).await?;

    tracing::debug!(
        user_id = %item.user_id,
        card_id = %item.card_id,
        quality = quality.value(),
        interval_days = outcome.interval_days,
        ease_factor = outcome.ease_factor,
        "review scheduled"
    );
    Ok(outcome)
}

pub async fn submit_review(
    pool: &SqlitePool,
    user_id: &str,
    card_id: &str,
    submission: &ReviewSubmission,
    now_ms: i64,
) -> Result<ReviewResult, ReviewError> {
    let quality = submission.resolve_quality()?;
    let item = enrolled_item(pool, user_id, card_id).await?;
    let mut tx = pool.begin().await?;
    let outcome = record_answer(
        &mut tx,
        &item,
        quality,
        submission.response_time_ms,
        "review",
        now_ms,
    )
    .await?;
    tx.commit().await?;

    Ok(ReviewResult {
        card_id: item.card_id,
        quality: quality.value(),
        correct: outcome.correct,
        interval_days: outcome.interval_days,
        ease_factor: outcome.ease_factor,
        repetitions: outcome.state.repetitions,
        next_review_at: format_timestamp_ms_iso_millis(outcome.next_review_ms),
    })
}

pub async fn preview_item(
    pool: &SqlitePool,
    user_id: &str,
    card_id: &str,
    now_ms: i64,
) -> Result<ReviewPreview, ReviewError> {
    let item = enrolled_item(pool, user_id, card_id).await?;
    let current = item.review_state();
    Ok(ReviewPreview {
        card_id: item.card_id,
        current,
        options: preview(&current, now_ms),
    })
}
