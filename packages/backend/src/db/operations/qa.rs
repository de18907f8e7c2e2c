use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QaRow {
    pub id: String,
    pub user_id: String,
    pub card_id: Option<String>,
    pub question: String,
    pub answer: String,
    pub model: String,
    pub created_at: i64,
}

pub async fn insert_qa(pool: &SqlitePool, qa: &QaRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "qa_history" ("id", "userId", "cardId", "question", "answer", "model", "createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&qa.id)
    .bind(&qa.user_id)
    .bind(&qa.card_id)
    .bind(&qa.question)
    .bind(&qa.answer)
    .bind(&qa.model)
    .bind(qa.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Newest first.
pub async fn list_qa(pool: &SqlitePool, user_id: &str, limit: i64) -> Result<Vec<QaRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM "qa_history"
        WHERE "userId" = ?
        ORDER BY "createdAt" DESC, "id" DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_qa).collect()
}

fn map_qa(row: &SqliteRow) -> Result<QaRow, sqlx::Error> {
    Ok(QaRow {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        card_id: row.try_get("cardId")?,
        question: row.try_get("question")?,
        answer: row.try_get("answer")?,
        model: row.try_get("model")?,
        created_at: row.try_get("createdAt")?,
    })
}
