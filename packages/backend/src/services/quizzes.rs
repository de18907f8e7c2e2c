use std::collections::{HashMap, HashSet};

use rand::seq::{IndexedRandom, SliceRandom};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tutorly_algo::{select_practice_set, weakness_score, PracticeCandidate, Quality, WeaknessConfig};

use crate::config::PlanLimits;
use crate::db::operations::lessons;
use crate::db::operations::quizzes::{self, GradedAnswer, QuizQuestionRow, QuizRow};
use crate::db::operations::reviews as review_ops;
use crate::db::operations::reviews::ReviewItemRow;
use crate::db::operations::users::UserRow;
use crate::services::lessons::{accessible_lesson, LessonError};
use crate::services::plan::{self, Feature, PlanError};
use crate::services::reviews::{record_answer, ReviewError, MAX_RESPONSE_TIME_MS};
use crate::time::format_timestamp_ms_iso_millis;

pub const DEFAULT_QUIZ_SIZE: usize = 10;
pub const MAX_QUIZ_SIZE: usize = 50;
const DISTRACTORS_PER_QUESTION: usize = 3;
const DISTRACTOR_SAMPLE: i64 = 60;

#[derive(Debug, thiserror::Error)]
pub enum QuizError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("quiz not found: {0}")]
    NotFound(String),
    #[error("quiz was already submitted")]
    AlreadySubmitted,
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Lesson(#[from] LessonError),
    #[error(transparent)]
    Review(#[from] ReviewError),
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
    #[error("stored quiz options are corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: String,
    pub card_id: String,
    pub position: i64,
    pub prompt: String,
    pub options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chosen_option: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_option: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizView {
    pub id: String,
    pub lesson_id: Option<String>,
    pub kind: &'static str,
    pub status: String,
    pub score: Option<f64>,
    pub created_at: Option<String>,
    pub submitted_at: Option<String>,
    pub questions: Vec<QuestionView>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizAnswer {
    pub question_id: String,
    #[serde(default)]
    pub chosen_option: Option<i64>,
    #[serde(default)]
    pub response_time_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: String,
    pub card_id: String,
    pub chosen_option: Option<i64>,
    pub correct_option: i64,
    pub correct: bool,
    pub next_review_at: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizResult {
    pub quiz_id: String,
    pub score: f64,
    pub correct: usize,
    pub total: usize,
    pub results: Vec<QuestionResult>,
}

/// Card content a question is built from.
#[derive(Debug, Clone)]
struct QuestionSource {
    card_id: String,
    prompt: String,
    answer: String,
}

pub async fn generate(
    pool: &SqlitePool,
    user: &UserRow,
    lesson_id: Option<&str>,
    size: Option<usize>,
    limits: &PlanLimits,
    now_ms: i64,
) -> Result<QuizView, QuizError> {
    let size = match size {
        None => DEFAULT_QUIZ_SIZE,
        Some(0) => return Err(QuizError::Validation("size must be at least 1".to_string())),
        Some(size) => size.min(MAX_QUIZ_SIZE),
    };

    let (sources, pool_answers) = match lesson_id {
        Some(lesson_id) => {
            let lesson = accessible_lesson(pool, user, lesson_id, now_ms).await?;
            let cards = lessons::list_cards(pool, &lesson.id).await?;
            let answers: Vec<String> = cards.iter().map(|c| c.answer.clone()).collect();
            let mut sources: Vec<QuestionSource> = cards
                .into_iter()
                .map(|c| QuestionSource {
                    card_id: c.id,
                    prompt: c.prompt,
                    answer: c.answer,
                })
                .collect();
            sources.shuffle(&mut rand::rng());
            sources.truncate(size);
            (sources, answers)
        }
        None => {
            let items = review_ops::list_items(pool, &user.id).await?;
            if items.is_empty() {
                return Err(QuizError::Validation(
                    "nothing to review yet, enroll in a lesson first".to_string(),
                ));
            }
            plan::consume(pool, user, Feature::ReviewQuiz, limits, now_ms).await?;
            let answers: Vec<String> = items.iter().map(|i| i.answer.clone()).collect();
            (practice_sources(&items, size, now_ms), answers)
        }
    };

    if sources.is_empty() {
        return Err(QuizError::Validation("lesson has no cards".to_string()));
    }

    let include_premium = plan::require(user, Feature::PremiumLessons, now_ms).is_ok();
    let mut distractor_pool = pool_answers;
    distractor_pool
        .extend(lessons::sample_answers(pool, include_premium, DISTRACTOR_SAMPLE).await?);

    let quiz = QuizRow {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user.id.clone(),
        lesson_id: lesson_id.map(str::to_string),
        status: "open".to_string(),
        score: None,
        created_at: now_ms,
        submitted_at: None,
    };
    let questions = build_questions(&quiz.id, &sources, &distractor_pool)?;
    quizzes::insert_quiz(pool, &quiz, &questions).await?;

    tracing::info!(
        user_id = %user.id,
        quiz_id = %quiz.id,
        lesson_id = ?quiz.lesson_id,
        questions = questions.len(),
        "quiz generated"
    );
    to_view(&quiz, &questions)
}

/// Picks review items for a practice quiz: due cards first, then weak ones.
fn practice_sources(items: &[ReviewItemRow], size: usize, now_ms: i64) -> Vec<QuestionSource> {
    let config = WeaknessConfig::default();
    let candidates: Vec<PracticeCandidate> = items
        .iter()
        .map(|item| PracticeCandidate {
            item_id: item.card_id.clone(),
            weakness: weakness_score(&item.item_stats(), now_ms, &config),
            overdue_ms: now_ms - item.next_review_at,
        })
        .collect();

    let seed: u64 = rand::rng().random();
    let by_card: HashMap<&str, &ReviewItemRow> =
        items.iter().map(|i| (i.card_id.as_str(), i)).collect();

    select_practice_set(&candidates, size, seed)
        .into_iter()
        .filter_map(|card_id| by_card.get(card_id.as_str()).copied())
        .map(|item| QuestionSource {
            card_id: item.card_id.clone(),
            prompt: item.prompt.clone(),
            answer: item.answer.clone(),
        })
        .collect()
}

fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Each question offers the correct answer plus up to three distinct wrong
/// answers, shuffled.
fn build_questions(
    quiz_id: &str,
    sources: &[QuestionSource],
    distractor_pool: &[String],
) -> Result<Vec<QuizQuestionRow>, QuizError> {
    let mut rng = rand::rng();
    let mut seen = HashSet::new();
    let unique_pool: Vec<&String> = distractor_pool
        .iter()
        .filter(|a| !a.trim().is_empty() && seen.insert(normalize_answer(a)))
        .collect();

    let mut questions = Vec::with_capacity(sources.len());
    for (position, source) in sources.iter().enumerate() {
        let correct = normalize_answer(&source.answer);
        let wrong: Vec<&String> = unique_pool
            .iter()
            .copied()
            .filter(|a| normalize_answer(a) != correct)
            .collect();

        let mut options: Vec<String> = wrong
            .choose_multiple(&mut rng, DISTRACTORS_PER_QUESTION)
            .map(|a| (*a).clone())
            .collect();
        options.push(source.answer.clone());
        options.shuffle(&mut rng);

        let correct_option = options
            .iter()
            .position(|o| *o == source.answer)
            .unwrap_or(0) as i64;

        questions.push(QuizQuestionRow {
            id: uuid::Uuid::new_v4().to_string(),
            quiz_id: quiz_id.to_string(),
            card_id: source.card_id.clone(),
            position: position as i64,
            prompt: source.prompt.clone(),
            options: serde_json::to_string(&options)?,
            correct_option,
            chosen_option: None,
            is_correct: None,
        });
    }

    Ok(questions)
}

fn to_view(quiz: &QuizRow, questions: &[QuizQuestionRow]) -> Result<QuizView, QuizError> {
    let submitted = quiz.status == "submitted";
    let questions = questions
        .iter()
        .map(|q| {
            Ok(QuestionView {
                id: q.id.clone(),
                card_id: q.card_id.clone(),
                position: q.position,
                prompt: q.prompt.clone(),
                options: serde_json::from_str(&q.options)?,
                chosen_option: q.chosen_option,
                correct_option: submitted.then_some(q.correct_option),
                correct: q.is_correct,
            })
        })
        .collect::<Result<Vec<_>, QuizError>>()?;

    Ok(QuizView {
        id: quiz.id.clone(),
        lesson_id: quiz.lesson_id.clone(),
        kind: if quiz.lesson_id.is_some() { "lesson" } else { "review" },
        status: quiz.status.clone(),
        score: quiz.score,
        created_at: format_timestamp_ms_iso_millis(quiz.created_at),
        submitted_at: quiz.submitted_at.and_then(format_timestamp_ms_iso_millis),
        questions,
    })
}

pub async fn get(pool: &SqlitePool, user_id: &str, quiz_id: &str) -> Result<QuizView, QuizError> {
    let quiz = quizzes::get_quiz(pool, user_id, quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound(quiz_id.to_string()))?;
    let questions = quizzes::list_questions(pool, &quiz.id).await?;
    to_view(&quiz, &questions)
}

/// Grades a quiz once and feeds every graded answer into the scheduler.
/// Unanswered questions count as wrong. Closing the quiz, enrolling its cards
/// and scheduling every answer commit together or not at all.
pub async fn submit(
    pool: &SqlitePool,
    user_id: &str,
    quiz_id: &str,
    answers: &[QuizAnswer],
    now_ms: i64,
) -> Result<QuizResult, QuizError> {
    let quiz = quizzes::get_quiz(pool, user_id, quiz_id)
        .await?
        .ok_or_else(|| QuizError::NotFound(quiz_id.to_string()))?;
    if quiz.status != "open" {
        return Err(QuizError::AlreadySubmitted);
    }

    let questions = quizzes::list_questions(pool, &quiz.id).await?;
    let by_id: HashMap<&str, &QuizQuestionRow> =
        questions.iter().map(|q| (q.id.as_str(), q)).collect();

    let mut chosen: HashMap<&str, &QuizAnswer> = HashMap::new();
    for answer in answers {
        let Some(question) = by_id.get(answer.question_id.as_str()) else {
            return Err(QuizError::Validation(format!(
                "question {} is not part of this quiz",
                answer.question_id
            )));
        };
        if let Some(ms) = answer.response_time_ms {
            if !(0..=MAX_RESPONSE_TIME_MS).contains(&ms) {
                return Err(QuizError::Validation(format!(
                    "responseTimeMs for question {} must be between 0 and {MAX_RESPONSE_TIME_MS}",
                    question.id
                )));
            }
        }
        if let Some(option) = answer.chosen_option {
            let options: Vec<String> = serde_json::from_str(&question.options)?;
            if option < 0 || option as usize >= options.len() {
                return Err(QuizError::Validation(format!(
                    "chosenOption {option} is out of range for question {}",
                    question.id
                )));
            }
        }
        if chosen.insert(question.id.as_str(), answer).is_some() {
            return Err(QuizError::Validation(format!(
                "question {} answered twice",
                question.id
            )));
        }
    }

    let graded: Vec<(&QuizQuestionRow, Option<&QuizAnswer>, bool)> = questions
        .iter()
        .map(|q| {
            let answer = chosen.get(q.id.as_str()).copied();
            let correct = answer
                .and_then(|a| a.chosen_option)
                .is_some_and(|opt| opt == q.correct_option);
            (q, answer, correct)
        })
        .collect();

    let total = graded.len();
    let correct_count = graded.iter().filter(|(_, _, ok)| *ok).count();
    let score = if total == 0 {
        0.0
    } else {
        correct_count as f64 / total as f64
    };

    let rows: Vec<GradedAnswer<'_>> = graded
        .iter()
        .map(|(q, answer, correct)| GradedAnswer {
            question_id: &q.id,
            chosen_option: answer.and_then(|a| a.chosen_option),
            is_correct: *correct,
        })
        .collect();
    let card_ids: Vec<String> = questions.iter().map(|q| q.card_id.clone()).collect();
    let cards = lessons::get_cards_by_ids(pool, &card_ids).await?;

    let mut tx = pool.begin().await?;
    if !quizzes::submit_quiz(&mut tx, &quiz.id, score, &rows, now_ms).await? {
        return Err(QuizError::AlreadySubmitted);
    }
    // Quiz answers on cards the learner never enrolled in start their schedule.
    review_ops::enroll_cards(&mut tx, user_id, &cards, now_ms).await?;

    let mut results = Vec::with_capacity(total);
    for (question, answer, correct) in graded {
        let response_time_ms = answer.and_then(|a| a.response_time_ms);
        let answered = answer.is_some_and(|a| a.chosen_option.is_some());
        let quality = if answered {
            Quality::from_answer(correct, response_time_ms)
        } else {
            Quality::from_answer(false, None)
        };

        let item = review_ops::get_item(&mut *tx, user_id, &question.card_id).await?;
        let next_review_at = match item {
            Some(item) => {
                let outcome =
                    record_answer(&mut tx, &item, quality, response_time_ms, "quiz", now_ms)
                        .await?;
                format_timestamp_ms_iso_millis(outcome.next_review_ms)
            }
            None => None,
        };

        results.push(QuestionResult {
            question_id: question.id.clone(),
            card_id: question.card_id.clone(),
            chosen_option: answer.and_then(|a| a.chosen_option),
            correct_option: question.correct_option,
            correct,
            next_review_at,
        });
    }
    tx.commit().await?;

    tracing::info!(user_id, quiz_id = %quiz.id, score, total, "quiz submitted");
    Ok(QuizResult {
        quiz_id: quiz.id,
        score,
        correct: correct_count,
        total,
        results,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_pool;
    use crate::db::operations::users;
    use crate::services::lessons::{create_lesson, NewCard, NewLesson};

    const NOW: i64 = 1_700_000_000_000;

    async fn setup() -> (tempfile::TempDir, SqlitePool, UserRow) {
        let dir = tempfile::tempdir().unwrap();
        let pool = init_pool(&dir.path().join("quizzes.db")).await.unwrap();
        let user = users::ensure_user(&pool, "learner", NOW).await.unwrap();
        (dir, pool, user)
    }

    async fn seed(pool: &SqlitePool, title: &str, premium: bool, answers: &[&str]) -> String {
        let lesson = create_lesson(
            pool,
            NewLesson {
                title: title.to_string(),
                topic: "general".to_string(),
                summary: None,
                body: None,
                level: None,
                premium,
                cards: answers
                    .iter()
                    .map(|a| NewCard {
                        prompt: format!("{title}: {a}?"),
                        answer: a.to_string(),
                        topic: None,
                    })
                    .collect(),
            },
            NOW,
        )
        .await
        .unwrap();
        lesson.lesson.id
    }

    fn answer_all(quiz: &QuizView) -> Vec<QuizAnswer> {
        quiz.questions
            .iter()
            .map(|q| QuizAnswer {
                question_id: q.id.clone(),
                chosen_option: Some(0),
                response_time_ms: Some(3_000),
            })
            .collect()
    }

    async fn answer_count(pool: &SqlitePool) -> i64 {
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "answer_records""#)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_failed_submit_leaves_quiz_open_and_schedule_untouched() {
        let (_dir, pool, user) = setup().await;
        let lesson_id = seed(&pool, "Rivers", false, &["Nile", "Amazon", "Danube"]).await;
        let limits = PlanLimits::default();
        let quiz = generate(&pool, &user, Some(lesson_id.as_str()), None, &limits, NOW)
            .await
            .unwrap();
        let answers = answer_all(&quiz);

        // The second answer record write fails part way through the submit.
        sqlx::query(
            r#"
            CREATE TRIGGER "fail_second_answer" BEFORE INSERT ON "answer_records"
            WHEN (SELECT COUNT(*) FROM "answer_records") >= 1
            BEGIN SELECT RAISE(ABORT, 'disk full'); END
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();

        let err = submit(&pool, &user.id, &quiz.id, &answers, NOW).await.unwrap_err();
        assert!(matches!(err, QuizError::Review(ReviewError::Sql(_))));

        let stored = get(&pool, &user.id, &quiz.id).await.unwrap();
        assert_eq!(stored.status, "open");
        assert!(stored.score.is_none());
        assert_eq!(answer_count(&pool).await, 0);
        assert!(review_ops::list_items(&pool, &user.id).await.unwrap().is_empty());

        sqlx::query(r#"DROP TRIGGER "fail_second_answer""#)
            .execute(&pool)
            .await
            .unwrap();

        let result = submit(&pool, &user.id, &quiz.id, &answers, NOW).await.unwrap();
        assert_eq!(result.total, 3);
        assert!(result.results.iter().all(|r| r.next_review_at.is_some()));
        assert_eq!(answer_count(&pool).await, 3);
        let items = review_ops::list_items(&pool, &user.id).await.unwrap();
        assert_eq!(items.len(), 3);
        assert!(items.iter().all(|i| i.last_reviewed_at == Some(NOW)));
    }

    #[tokio::test]
    async fn test_submit_rejects_out_of_range_response_time() {
        let (_dir, pool, user) = setup().await;
        let lesson_id = seed(&pool, "Peaks", false, &["Everest", "K2"]).await;
        let limits = PlanLimits::default();
        let quiz = generate(&pool, &user, Some(lesson_id.as_str()), None, &limits, NOW)
            .await
            .unwrap();

        for bad in [-1, MAX_RESPONSE_TIME_MS + 1] {
            let mut answers = answer_all(&quiz);
            answers[0].response_time_ms = Some(bad);
            let err = submit(&pool, &user.id, &quiz.id, &answers, NOW).await.unwrap_err();
            assert!(matches!(err, QuizError::Validation(_)), "{bad}");
        }

        let mut answers = answer_all(&quiz);
        answers[0].response_time_ms = Some(MAX_RESPONSE_TIME_MS);
        assert!(submit(&pool, &user.id, &quiz.id, &answers, NOW).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_review_quiz_does_not_count_usage() {
        let (_dir, pool, user) = setup().await;
        let limits = PlanLimits::default();

        let err = generate(&pool, &user, None, None, &limits, NOW).await.unwrap_err();
        assert!(matches!(err, QuizError::Validation(_)));

        let overview = plan::plan_overview(&pool, &user, &limits, NOW).await.unwrap();
        let review_quiz = overview
            .entitlements
            .iter()
            .find(|e| e.feature == Feature::ReviewQuiz)
            .unwrap();
        assert_eq!(review_quiz.used_today, 0);
    }

    #[tokio::test]
    async fn test_free_learner_distractors_skip_premium_cards() {
        let (_dir, pool, user) = setup().await;
        let open_id = seed(&pool, "Open", false, &["alpha", "beta", "gamma", "delta"]).await;
        seed(&pool, "Locked", true, &["secret one", "secret two", "secret three"]).await;

        let sampled = lessons::sample_answers(&pool, false, 100).await.unwrap();
        assert_eq!(sampled.len(), 4);
        assert!(sampled.iter().all(|a| !a.starts_with("secret")));
        assert_eq!(lessons::sample_answers(&pool, true, 100).await.unwrap().len(), 7);

        let limits = PlanLimits::default();
        for _ in 0..5 {
            let quiz = generate(&pool, &user, Some(open_id.as_str()), None, &limits, NOW)
                .await
                .unwrap();
            for question in &quiz.questions {
                assert!(question.options.iter().all(|o| !o.starts_with("secret")));
            }
        }
    }

    fn source(id: &str, answer: &str) -> QuestionSource {
        QuestionSource {
            card_id: id.to_string(),
            prompt: format!("prompt {id}"),
            answer: answer.to_string(),
        }
    }

    #[test]
    fn test_build_questions_multiple_choice() {
        let sources = vec![source("a", "went"), source("b", "saw")];
        let pool: Vec<String> = ["went", "saw", "ate", "Went ", "ran", "flew", ""]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let questions = build_questions("quiz", &sources, &pool).unwrap();
        assert_eq!(questions.len(), 2);
        for (question, source) in questions.iter().zip(&sources) {
            let options: Vec<String> = serde_json::from_str(&question.options).unwrap();
            assert_eq!(options.len(), 4);
            assert_eq!(options[question.correct_option as usize], source.answer);
            let lowered: HashSet<String> = options.iter().map(|o| normalize_answer(o)).collect();
            assert_eq!(lowered.len(), 4, "options must be distinct: {options:?}");
        }
    }

    #[test]
    fn test_build_questions_with_small_pool() {
        let sources = vec![source("a", "only")];
        let questions = build_questions("quiz", &sources, &["only".to_string()]).unwrap();
        let options: Vec<String> = serde_json::from_str(&questions[0].options).unwrap();
        assert_eq!(options, vec!["only".to_string()]);
        assert_eq!(questions[0].correct_option, 0);
    }

    #[test]
    fn test_view_hides_answers_until_submitted() {
        let quiz = QuizRow {
            id: "q".to_string(),
            user_id: "u".to_string(),
            lesson_id: None,
            status: "open".to_string(),
            score: None,
            created_at: 0,
            submitted_at: None,
        };
        let questions = build_questions("q", &[source("a", "x")], &[]).unwrap();
        let view = to_view(&quiz, &questions).unwrap();
        assert_eq!(view.kind, "review");
        assert!(view.questions[0].correct_option.is_none());

        let done = QuizRow {
            status: "submitted".to_string(),
            ..quiz
        };
        let view = to_view(&done, &questions).unwrap();
        assert_eq!(view.questions[0].correct_option, Some(0));
    }
}
