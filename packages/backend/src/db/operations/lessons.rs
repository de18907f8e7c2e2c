use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonRow {
    pub id: String,
    pub title: String,
    pub topic: String,
    pub summary: String,
    pub body: String,
    pub level: String,
    pub premium: bool,
    pub card_count: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRow {
    pub id: String,
    pub lesson_id: String,
    pub prompt: String,
    pub answer: String,
    pub topic: String,
    pub position: i64,
}

const LESSON_COLUMNS: &str = r#"
    l."id", l."title", l."topic", l."summary", l."body", l."level", l."premium",
    l."createdAt", l."updatedAt",
    (SELECT COUNT(*) FROM "cards" c WHERE c."lessonId" = l."id") AS "cardCount"
"#;

pub async fn list_lessons(pool: &SqlitePool) -> Result<Vec<LessonRow>, sqlx::Error> {
    let sql = format!(
        r#"SELECT {LESSON_COLUMNS} FROM "lessons" l ORDER BY l."topic", l."createdAt", l."id""#
    );
    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(map_lesson).collect()
}

pub async fn get_lesson(pool: &SqlitePool, lesson_id: &str) -> Result<Option<LessonRow>, sqlx::Error> {
    let sql = format!(r#"SELECT {LESSON_COLUMNS} FROM "lessons" l WHERE l."id" = ?"#);
    let row = sqlx::query(&sql)
        .bind(lesson_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_lesson).transpose()
}

pub async fn list_cards(pool: &SqlitePool, lesson_id: &str) -> Result<Vec<CardRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT * FROM "cards" WHERE "lessonId" = ? ORDER BY "position", "id""#,
    )
    .bind(lesson_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_card).collect()
}

pub async fn get_cards_by_ids(pool: &SqlitePool, card_ids: &[String]) -> Result<Vec<CardRow>, sqlx::Error> {
    if card_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(r#"SELECT * FROM "cards" WHERE "id" IN ("#);
    {
        let mut separated = qb.separated(", ");
        for id in card_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(")");
    }

    let rows = qb.build().fetch_all(pool).await?;
    rows.iter().map(map_card).collect()
}

/// Random card answers used as quiz distractors. Cards of premium lessons are
/// only sampled when `include_premium` is set.
pub async fn sample_answers(
    pool: &SqlitePool,
    include_premium: bool,
    limit: i64,
) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT c."answer"
        FROM "cards" c
        JOIN "lessons" l ON l."id" = c."lessonId"
        WHERE l."premium" = 0 OR ?
        ORDER BY RANDOM()
        LIMIT ?
        "#,
    )
    .bind(include_premium)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn insert_lesson(
    pool: &SqlitePool,
    lesson: &LessonRow,
    cards: &[CardRow],
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        INSERT INTO "lessons"
            ("id", "title", "topic", "summary", "body", "level", "premium", "createdAt", "updatedAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&lesson.id)
    .bind(&lesson.title)
    .bind(&lesson.topic)
    .bind(&lesson.summary)
    .bind(&lesson.body)
    .bind(&lesson.level)
    .bind(lesson.premium)
    .bind(lesson.created_at)
    .bind(lesson.updated_at)
    .execute(&mut *tx)
    .await?;

    for card in cards {
        sqlx::query(
            r#"
            INSERT INTO "cards" ("id", "lessonId", "prompt", "answer", "topic", "position", "createdAt")
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&card.id)
        .bind(&card.lesson_id)
        .bind(&card.prompt)
        .bind(&card.answer)
        .bind(&card.topic)
        .bind(card.position)
        .bind(lesson.created_at)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await
}

fn map_lesson(row: &SqliteRow) -> Result<LessonRow, sqlx::Error> {
    Ok(LessonRow {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        topic: row.try_get("topic")?,
        summary: row.try_get("summary")?,
        body: row.try_get("body")?,
        level: row.try_get("level")?,
        premium: row.try_get("premium")?,
        card_count: row.try_get("cardCount")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}

pub(crate) fn map_card(row: &SqliteRow) -> Result<CardRow, sqlx::Error> {
    Ok(CardRow {
        id: row.try_get("id")?,
        lesson_id: row.try_get("lessonId")?,
        prompt: row.try_get("prompt")?,
        answer: row.try_get("answer")?,
        topic: row.try_get("topic")?,
        position: row.try_get("position")?,
    })
}
