use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

#[derive(Debug, Clone)]
pub struct QuizRow {
    pub id: String,
    pub user_id: String,
    pub lesson_id: Option<String>,
    pub status: String,
    pub score: Option<f64>,
    pub created_at: i64,
    pub submitted_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct QuizQuestionRow {
    pub id: String,
    pub quiz_id: String,
    pub card_id: String,
    pub position: i64,
    pub prompt: String,
    /// JSON array of option strings
    pub options: String,
    pub correct_option: i64,
    pub chosen_option: Option<i64>,
    pub is_correct: Option<bool>,
}

pub struct GradedAnswer<'a> {
    pub question_id: &'a str,
    pub chosen_option: Option<i64>,
    pub is_correct: bool,
}

pub async fn insert_quiz(
    pool: &SqlitePool,
    quiz: &QuizRow,
    questions: &[QuizQuestionRow],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "quizzes" ("id", "userId", "lessonId", "status", "score", "createdAt", "submittedAt")
        VALUES (?, ?, ?, ?, NULL, ?, NULL)
        "#,
    )
    .bind(&quiz.id)
    .bind(&quiz.user_id)
    .bind(&quiz.lesson_id)
    .bind(&quiz.status)
    .bind(quiz.created_at)
    .execute(&mut *tx)
    .await?;

    for question in questions {
        sqlx::query(
            r#"
            INSERT INTO "quiz_questions"
                ("id", "quizId", "cardId", "position", "prompt", "options", "correctOption")
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&question.id)
        .bind(&question.quiz_id)
        .bind(&question.card_id)
        .bind(question.position)
        .bind(&question.prompt)
        .bind(&question.options)
        .bind(question.correct_option)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

pub async fn get_quiz(
    pool: &SqlitePool,
    user_id: &str,
    quiz_id: &str,
) -> Result<Option<QuizRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "quizzes" WHERE "id" = ? AND "userId" = ?"#)
        .bind(quiz_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_quiz).transpose()
}

pub async fn list_questions(pool: &SqlitePool, quiz_id: &str) -> Result<Vec<QuizQuestionRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "quiz_questions" WHERE "quizId" = ? ORDER BY "position""#,
    )
    .bind(quiz_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_question).collect()
}

/// Closes an open quiz with its grades. Returns `false` when the quiz was
/// already submitted, in which case nothing is written. The caller commits.
pub async fn submit_quiz(
    tx: &mut Transaction<'_, Sqlite>,
    quiz_id: &str,
    score: f64,
    answers: &[GradedAnswer<'_>],
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let claimed = sqlx::query(
        r#"
        UPDATE "quizzes" SET "status" = 'submitted', "score" = ?, "submittedAt" = ?
        WHERE "id" = ? AND "status" = 'open'
        "#,
    )
    .bind(score)
    .bind(now_ms)
    .bind(quiz_id)
    .execute(&mut **tx)
    .await?;

    if claimed.rows_affected() == 0 {
        return Ok(false);
    }

    for answer in answers {
        sqlx::query(
            r#"UPDATE "quiz_questions" SET "chosenOption" = ?, "isCorrect" = ? WHERE "id" = ?"#,
        )
        .bind(answer.chosen_option)
        .bind(answer.is_correct)
        .bind(answer.question_id)
        .execute(&mut **tx)
        .await?;
    }

    Ok(true)
}

fn map_quiz(row: &SqliteRow) -> Result<QuizRow, sqlx::Error> {
    Ok(QuizRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        lesson_id: row.try_get("lessonId")?,
        status: row.try_get("status")?,
        score: row.try_get("score")?,
        created_at: row.try_get("createdAt")?,
        submitted_at: row.try_get("submittedAt")?,
    })
}

fn map_question(row: &SqliteRow) -> Result<QuizQuestionRow, sqlx::Error> {
    Ok(QuizQuestionRow {
        id: row.try_get("id")?,
        quiz_id: row.try_get("quizId")?,
        card_id: row.try_get("cardId")?,
        position: row.try_get("position")?,
        prompt: row.try_get("prompt")?,
        options: row.try_get("options")?,
        correct_option: row.try_get("correctOption")?,
        chosen_option: row.try_get("chosenOption")?,
        is_correct: row.try_get("isCorrect")?,
    })
}
