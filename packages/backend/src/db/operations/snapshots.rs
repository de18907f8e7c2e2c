use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotRow {
    pub user_id: String,
    pub day: String,
    pub total_items: i64,
    pub mastered_items: i64,
    pub weak_items: i64,
    pub due_now: i64,
    pub accuracy: Option<f64>,
    pub average_retention: Option<f64>,
    pub created_at: i64,
}

/// One row per learner and day; a later run on the same day overwrites it.
pub async fn upsert_snapshot(pool: &SqlitePool, snapshot: &SnapshotRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "progress_snapshots"
            ("userId", "day", "totalItems", "masteredItems", "weakItems", "dueNow",
             "accuracy", "averageRetention", "createdAt")
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT ("userId", "day") DO UPDATE SET
            "totalItems" = excluded."totalItems",
            "masteredItems" = excluded."masteredItems",
            "weakItems" = excluded."weakItems",
            "dueNow" = excluded."dueNow",
            "accuracy" = excluded."accuracy",
            "averageRetention" = excluded."averageRetention",
            "createdAt" = excluded."createdAt"
        "#,
    )
    .bind(&snapshot.user_id)
    .bind(&snapshot.day)
    .bind(snapshot.total_items)
    .bind(snapshot.mastered_items)
    .bind(snapshot.weak_items)
    .bind(snapshot.due_now)
    .bind(snapshot.accuracy)
    .bind(snapshot.average_retention)
    .bind(snapshot.created_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Most recent `limit` days, oldest first.
pub async fn list_snapshots(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<SnapshotRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT * FROM (
            SELECT * FROM "progress_snapshots"
            WHERE "userId" = ?
            ORDER BY "day" DESC
            LIMIT ?
        ) ORDER BY "day" ASC
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(map_snapshot).collect()
}

fn map_snapshot(row: &SqliteRow) -> Result<SnapshotRow, sqlx::Error> {
    Ok(SnapshotRow {
        user_id: row.try_get("userId")?,
        day: row.try_get("day")?,
        total_items: row.try_get("totalItems")?,
        mastered_items: row.try_get("masteredItems")?,
        weak_items: row.try_get("weakItems")?,
        due_now: row.try_get("dueNow")?,
        accuracy: row.try_get("accuracy")?,
        average_retention: row.try_get("averageRetention")?,
        created_at: row.try_get("createdAt")?,
    })
}
