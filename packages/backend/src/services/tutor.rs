use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tutorly_algo::{topic_breakdown, WeaknessConfig};

use crate::config::PlanLimits;
use crate::db::operations::lessons::{self, CardRow};
use crate::db::operations::qa::{self, QaRow};
use crate::db::operations::reviews;
use crate::db::operations::users::UserRow;
use crate::services::llm_provider::{ChatMessage, LLMError, LLMProvider};
use crate::services::plan::{self, Feature, PlanError};
use crate::time::format_timestamp_ms_iso_millis;

pub const MAX_QUESTION_CHARS: usize = 2000;
pub const ANSWER_CACHE_TTL_MS: i64 = 10 * 60 * 1000;
const ANSWER_CACHE_CAPACITY: usize = 10_000;
const WEAK_TOPICS_IN_PROMPT: usize = 3;
const WEAK_TOPIC_ACCURACY: f64 = 0.8;
pub const DEFAULT_HISTORY_LIMIT: i64 = 20;
pub const MAX_HISTORY_LIMIT: i64 = 100;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Llm(#[from] LLMError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    card_id: Option<String>,
    question: String,
}

#[derive(Debug, Clone)]
struct CachedAnswer {
    answer: String,
    model: String,
    stored_at_ms: i64,
}

/// Recent answers per learner, so a repeated question is neither re-sent to
/// the model nor charged against the quota.
#[derive(Default)]
pub struct AnswerCache {
    entries: Mutex<HashMap<CacheKey, CachedAnswer>>,
}

impl AnswerCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &CacheKey, now_ms: i64) -> Option<CachedAnswer> {
        let entries = self.entries.lock();
        entries
            .get(key)
            .filter(|hit| now_ms - hit.stored_at_ms < ANSWER_CACHE_TTL_MS)
            .cloned()
    }

    fn insert(&self, key: CacheKey, answer: CachedAnswer, now_ms: i64) {
        let mut entries = self.entries.lock();
        if entries.len() >= ANSWER_CACHE_CAPACITY {
            entries.retain(|_, v| now_ms - v.stored_at_ms < ANSWER_CACHE_TTL_MS);
        }
        if entries.len() >= ANSWER_CACHE_CAPACITY {
            tracing::warn!(size = entries.len(), "answer cache full, clearing");
            entries.clear();
        }
        entries.insert(key, answer);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AskRequest {
    pub question: String,
    #[serde(default)]
    pub card_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorAnswer {
    pub id: Option<String>,
    pub question: String,
    pub answer: String,
    pub model: String,
    pub card_id: Option<String>,
    pub cached: bool,
    pub used_today: Option<i64>,
    pub daily_limit: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub card_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub model: String,
    pub created_at: Option<String>,
}

pub struct TutorDeps<'a> {
    pub pool: &'a SqlitePool,
    pub llm: &'a LLMProvider,
    pub cache: &'a AnswerCache,
    pub limits: &'a PlanLimits,
}

fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

pub fn validate_question(question: &str) -> Result<String, TutorError> {
    let trimmed = question.trim();
    if trimmed.is_empty() {
        return Err(TutorError::Validation("question is required".to_string()));
    }
    if trimmed.chars().count() > MAX_QUESTION_CHARS {
        return Err(TutorError::Validation(format!(
            "question must be at most {MAX_QUESTION_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Topics where the learner answers least accurately, weakest first.
async fn weak_topics(pool: &SqlitePool, user_id: &str, now_ms: i64) -> Result<Vec<String>, sqlx::Error> {
    let items: Vec<_> = reviews::list_items(pool, user_id)
        .await?
        .iter()
        .map(|row| row.item_stats())
        .collect();

    Ok(topic_breakdown(&items, now_ms, &WeaknessConfig::default())
        .into_iter()
        .filter(|t| t.accuracy.is_some_and(|acc| acc < WEAK_TOPIC_ACCURACY))
        .take(WEAK_TOPICS_IN_PROMPT)
        .map(|t| t.topic)
        .collect())
}

pub fn build_system_prompt(weak_topics: &[String], card_context: Option<(&str, &str)>) -> String {
    let mut prompt = String::from(
        "You are a patient tutor. Explain clearly and briefly, check understanding, \
         and prefer worked examples over definitions.",
    );
    if !weak_topics.is_empty() {
        prompt.push_str(&format!(
            "\nThe learner currently struggles with: {}. Connect your explanation to these topics when relevant.",
            weak_topics.join(", ")
        ));
    }
    if let Some((card_prompt, card_answer)) = card_context {
        prompt.push_str(&format!(
            "\nThe question is about the flashcard \"{card_prompt}\" whose answer is \"{card_answer}\"."
        ));
    }
    prompt
}

/// Loads a card the learner may discuss. Cards of premium lessons need
/// `PremiumLessons`.
async fn readable_card(
    pool: &SqlitePool,
    user: &UserRow,
    card_id: &str,
    now_ms: i64,
) -> Result<CardRow, TutorError> {
    let card = lessons::get_cards_by_ids(pool, &[card_id.to_string()])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| TutorError::Validation(format!("unknown card {card_id}")))?;

    let premium = lessons::get_lesson(pool, &card.lesson_id)
        .await?
        .is_some_and(|lesson| lesson.premium);
    if premium {
        plan::require(user, Feature::PremiumLessons, now_ms)?;
    }
    Ok(card)
}

pub async fn ask(
    deps: &TutorDeps<'_>,
    user: &UserRow,
    request: &AskRequest,
    now_ms: i64,
) -> Result<TutorAnswer, TutorError> {
    let question = validate_question(&request.question)?;
    let card_id = request
        .card_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string);

    let card = match &card_id {
        Some(id) => Some(readable_card(deps.pool, user, id, now_ms).await?),
        None => None,
    };

    let key = CacheKey {
        user_id: user.id.clone(),
        card_id: card_id.clone(),
        question: normalize_question(&question),
    };
    if let Some(hit) = deps.cache.get(&key, now_ms) {
        tracing::debug!(user_id = %user.id, "tutor answer served from cache");
        return Ok(TutorAnswer {
            id: None,
            question,
            answer: hit.answer,
            model: hit.model,
            card_id,
            cached: true,
            used_today: None,
            daily_limit: None,
        });
    }

    if !deps.llm.is_available() {
        return Err(LLMError::NotConfigured("LLM_API_KEY").into());
    }

    let grant = plan::consume(deps.pool, user, Feature::TutorQuestion, deps.limits, now_ms).await?;

    let topics = weak_topics(deps.pool, &user.id, now_ms).await?;
    let system = build_system_prompt(
        &topics,
        card.as_ref().map(|c| (c.prompt.as_str(), c.answer.as_str())),
    );
    let messages = [ChatMessage::system(system), ChatMessage::user(question.clone())];

    let completion = match deps.llm.complete(&messages).await {
        Ok(completion) => completion,
        Err(err) => {
            if let Err(release_err) =
                plan::release(deps.pool, &user.id, Feature::TutorQuestion, now_ms).await
            {
                tracing::warn!(error = %release_err, "failed to release tutor quota");
            }
            return Err(err.into());
        }
    };

    let row = QaRow {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        card_id: card_id.clone(),
        question: question.clone(),
        answer: completion.text.clone(),
        model: completion.model.clone(),
        created_at: now_ms,
    };
    qa::insert_qa(deps.pool, &row).await?;

    deps.cache.insert(
        key,
        CachedAnswer {
            answer: completion.text.clone(),
            model: completion.model.clone(),
            stored_at_ms: now_ms,
        },
        now_ms,
    );

    tracing::info!(
        user_id = %user.id,
        model = %completion.model,
        weak_topics = topics.len(),
        used_today = grant.used_today,
        "tutor question answered"
    );

    Ok(TutorAnswer {
        id: Some(row.id),
        question,
        answer: completion.text,
        model: completion.model,
        card_id,
        cached: false,
        used_today: Some(grant.used_today),
        daily_limit: grant.daily_limit,
    })
}

pub async fn history(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<HistoryEntry>, TutorError> {
    let rows = qa::list_qa(pool, user_id, limit.clamp(1, MAX_HISTORY_LIMIT)).await?;
    Ok(rows
        .into_iter()
        .map(|row| HistoryEntry {
            created_at: format_timestamp_ms_iso_millis(row.created_at),
            id: row.id,
            card_id: row.card_id,
            question: row.question,
            answer: row.answer,
            model: row.model,
        })
        .collect())
}
