use sqlx::{Row, SqlitePool};

/// Bumps the counter for `(user, feature, day)` unless it already reached
/// `limit`. Returns the new count, or `None` when the limit was hit.
///
/// The check and the increment are one statement, so concurrent requests
/// cannot both slip under the limit.
pub async fn try_increment(
    pool: &SqlitePool,
    user_id: &str,
    feature: &str,
    day: &str,
    limit: Option<u32>,
) -> Result<Option<i64>, sqlx::Error> {
    match limit {
        Some(0) => Ok(None),
        Some(limit) => {
            sqlx::query_scalar(
                r#"
                INSERT INTO "usage_counters" ("userId", "feature", "day", "count")
                VALUES (?, ?, ?, 1)
                ON CONFLICT ("userId", "feature", "day")
                DO UPDATE SET "count" = "count" + 1 WHERE "count" < ?
                RETURNING "count"
                "#,
            )
            .bind(user_id)
            .bind(feature)
            .bind(day)
            .bind(i64::from(limit))
            .fetch_optional(pool)
            .await
        }
        None => {
            let count: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO "usage_counters" ("userId", "feature", "day", "count")
                VALUES (?, ?, ?, 1)
                ON CONFLICT ("userId", "feature", "day")
                DO UPDATE SET "count" = "count" + 1
                RETURNING "count"
                "#,
            )
            .bind(user_id)
            .bind(feature)
            .bind(day)
            .fetch_one(pool)
            .await?;
            Ok(Some(count))
        }
    }
}

pub async fn usage_for_day(
    pool: &SqlitePool,
    user_id: &str,
    day: &str,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT "feature", "count" FROM "usage_counters" WHERE "userId" = ? AND "day" = ?"#,
    )
    .bind(user_id)
    .bind(day)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("feature")?, row.try_get("count")?)))
        .collect()
}

/// Gives back one unit, e.g. when the metered call failed downstream.
pub async fn release(
    pool: &SqlitePool,
    user_id: &str,
    feature: &str,
    day: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE "usage_counters" SET "count" = "count" - 1
        WHERE "userId" = ? AND "feature" = ? AND "day" = ? AND "count" > 0
        "#,
    )
    .bind(user_id)
    .bind(feature)
    .bind(day)
    .execute(pool)
    .await?;
    Ok(())
}
