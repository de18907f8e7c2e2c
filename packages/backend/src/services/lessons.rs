use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db::operations::lessons::{self, CardRow, LessonRow};
use crate::db::operations::users::UserRow;
use crate::services::plan::{self, Feature, PlanError};

const MAX_TITLE_LEN: usize = 200;
const MAX_TOPIC_LEN: usize = 100;
const MAX_CARD_TEXT_LEN: usize = 2000;
const MAX_CARDS_PER_LESSON: usize = 500;
const LEVELS: [&str; 3] = ["beginner", "intermediate", "advanced"];

#[derive(Debug, thiserror::Error)]
pub enum LessonError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("lesson not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonSummary {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub summary: String,
    pub level: String,
    pub premium: bool,
    pub card_count: i64,
    pub locked: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonDetail {
    #[serde(flatten)]
    pub lesson: LessonRow,
    pub cards: Vec<CardRow>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCard {
    pub prompt: String,
    pub answer: String,
    #[serde(default)]
    pub topic: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLesson {
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub premium: bool,
    pub cards: Vec<NewCard>,
}

fn is_locked(lesson: &LessonRow, user: &UserRow, now_ms: i64) -> bool {
    lesson.premium && plan::require(user, Feature::PremiumLessons, now_ms).is_err()
}

pub async fn list_lessons(
    pool: &SqlitePool,
    user: &UserRow,
    now_ms: i64,
) -> Result<Vec<LessonSummary>, LessonError> {
    let rows = lessons::list_lessons(pool).await?;
    Ok(rows
        .into_iter()
        .map(|lesson| LessonSummary {
            locked: is_locked(&lesson, user, now_ms),
            id: lesson.id,
            title: lesson.title,
            topic: lesson.topic,
            summary: lesson.summary,
            level: lesson.level,
            premium: lesson.premium,
            card_count: lesson.card_count,
        })
        .collect())
}

/// Loads a lesson the user may open; premium lessons need `PremiumLessons`.
pub async fn accessible_lesson(
    pool: &SqlitePool,
    user: &UserRow,
    lesson_id: &str,
    now_ms: i64,
) -> Result<LessonRow, LessonError> {
    let lesson = lessons::get_lesson(pool, lesson_id)
        .await?
        .ok_or_else(|| LessonError::NotFound(lesson_id.to_string()))?;

    if lesson.premium {
        plan::require(user, Feature::PremiumLessons, now_ms)?;
    }
    Ok(lesson)
}

pub async fn get_lesson(
    pool: &SqlitePool,
    user: &UserRow,
    lesson_id: &str,
    now_ms: i64,
) -> Result<LessonDetail, LessonError> {
    let lesson = accessible_lesson(pool, user, lesson_id, now_ms).await?;
    let cards = lessons::list_cards(pool, &lesson.id).await?;
    Ok(LessonDetail { lesson, cards })
}

pub async fn create_lesson(
    pool: &SqlitePool,
    input: NewLesson,
    now_ms: i64,
) -> Result<LessonDetail, LessonError> {
    let title = required(&input.title, "title", MAX_TITLE_LEN)?;
    let topic = required(&input.topic, "topic", MAX_TOPIC_LEN)?;

    let level = match input.level.as_deref().map(str::trim) {
        None | Some("") => LEVELS[0].to_string(),
        Some(level) => {
            let level = level.to_ascii_lowercase();
            if !LEVELS.contains(&level.as_str()) {
                return Err(LessonError::Validation(format!(
                    "level must be one of {}",
                    LEVELS.join(", ")
                )));
            }
            level
        }
    };

    if input.cards.is_empty() {
        return Err(LessonError::Validation("a lesson needs at least one card".to_string()));
    }
    if input.cards.len() > MAX_CARDS_PER_LESSON {
        return Err(LessonError::Validation(format!(
            "a lesson holds at most {MAX_CARDS_PER_LESSON} cards"
        )));
    }

    let lesson_id = uuid::Uuid::new_v4().to_string();
    let mut cards = Vec::with_capacity(input.cards.len());
    for (position, card) in input.cards.iter().enumerate() {
        let card_topic = match card.topic.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => required(t, "card topic", MAX_TOPIC_LEN)?,
            _ => topic.clone(),
        };
        cards.push(CardRow {
            id: uuid::Uuid::new_v4().to_string(),
            lesson_id: lesson_id.clone(),
            prompt: required(&card.prompt, "card prompt", MAX_CARD_TEXT_LEN)?,
            answer: required(&card.answer, "card answer", MAX_CARD_TEXT_LEN)?,
            topic: card_topic,
            position: position as i64,
        });
    }

    let lesson = LessonRow {
        id: lesson_id,
        title,
        topic,
        summary: input.summary.unwrap_or_default().trim().to_string(),
        body: input.body.unwrap_or_default(),
        level,
        premium: input.premium,
        card_count: cards.len() as i64,
        created_at: now_ms,
        updated_at: now_ms,
    };

    lessons::insert_lesson(pool, &lesson, &cards).await?;
    tracing::info!(lesson_id = %lesson.id, cards = cards.len(), premium = lesson.premium, "lesson created");

    Ok(LessonDetail { lesson, cards })
}

fn required(value: &str, field: &str, max_len: usize) -> Result<String, LessonError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LessonError::Validation(format!("{field} is required")));
    }
    if trimmed.chars().count() > max_len {
        return Err(LessonError::Validation(format!(
            "{field} must be at most {max_len} characters"
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::db::operations::users;

    const NOW: i64 = 1_700_000_000_000;

    fn new_lesson(premium: bool) -> NewLesson {
        NewLesson {
            title: "  Past tense  ".to_string(),
            topic: "grammar".to_string(),
            summary: None,
            body: None,
            level: Some("Intermediate".to_string()),
            premium,
            cards: vec![
                NewCard {
                    prompt: "go".to_string(),
                    answer: "went".to_string(),
                    topic: None,
                },
                NewCard {
                    prompt: "see".to_string(),
                    answer: "saw".to_string(),
                    topic: Some("irregular verbs".to_string()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_create_and_lock_premium_lessons() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("lessons.db")).await.unwrap();
        let free_user = users::ensure_user(&pool, "free", NOW).await.unwrap();

        let open = create_lesson(&pool, new_lesson(false), NOW).await.unwrap();
        assert_eq!(open.lesson.title, "Past tense");
        assert_eq!(open.lesson.level, "intermediate");
        assert_eq!(open.cards[1].topic, "irregular verbs");
        let premium = create_lesson(&pool, new_lesson(true), NOW).await.unwrap();

        let listed = list_lessons(&pool, &free_user, NOW).await.unwrap();
        assert_eq!(listed.len(), 2);
        let locked: Vec<bool> = listed.iter().map(|l| l.locked).collect();
        assert!(locked.contains(&true) && locked.contains(&false));
        assert!(listed.iter().all(|l| l.card_count == 2));

        assert!(get_lesson(&pool, &free_user, &open.lesson.id, NOW).await.is_ok());
        let err = get_lesson(&pool, &free_user, &premium.lesson.id, NOW).await.unwrap_err();
        assert!(matches!(err, LessonError::Plan(PlanError::FeatureLocked { .. })));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("lessons.db")).await.unwrap();

        let mut no_cards = new_lesson(false);
        no_cards.cards.clear();
        assert!(matches!(
            create_lesson(&pool, no_cards, NOW).await,
            Err(LessonError::Validation(_))
        ));

        let mut bad_level = new_lesson(false);
        bad_level.level = Some("expert".to_string());
        assert!(matches!(
            create_lesson(&pool, bad_level, NOW).await,
            Err(LessonError::Validation(_))
        ));

        let mut blank_answer = new_lesson(false);
        blank_answer.cards[0].answer = "   ".to_string();
        assert!(matches!(
            create_lesson(&pool, blank_answer, NOW).await,
            Err(LessonError::Validation(_))
        ));
    }
}
