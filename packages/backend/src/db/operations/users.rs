use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRow {
    pub id: String,
    pub plan_tier: String,
    pub plan_status: String,
    pub period_end_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

pub const MAX_USER_ID_LEN: usize = 128;

/// Ids are 1 to 128 characters of ASCII letters, digits and `_-:.@`.
pub fn is_valid_user_id(value: &str) -> bool {
    !value.is_empty()
        && value.len() <= MAX_USER_ID_LEN
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '@'))
}

/// Inserts the user on first sight with the column defaults (free, active).
pub async fn ensure_user(pool: &SqlitePool, user_id: &str, now_ms: i64) -> Result<UserRow, sqlx::Error> {
    let inserted = sqlx::query(
        r#"INSERT OR IGNORE INTO "users" ("id", "createdAt", "updatedAt") VALUES (?, ?, ?)"#,
    )
    .bind(user_id)
    .bind(now_ms)
    .bind(now_ms)
    .execute(pool)
    .await?;

    if inserted.rows_affected() > 0 {
        tracing::info!(user_id, "provisioned new user");
    }

    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
    map_user(&row)
}

pub async fn get_user(pool: &SqlitePool, user_id: &str) -> Result<Option<UserRow>, sqlx::Error> {
    let row = sqlx::query(r#"SELECT * FROM "users" WHERE "id" = ?"#)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(map_user).transpose()
}

pub async fn update_plan(
    pool: &SqlitePool,
    user_id: &str,
    plan_tier: &str,
    plan_status: &str,
    period_end_at: Option<i64>,
    now_ms: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "users"
        SET "planTier" = ?, "planStatus" = ?, "periodEndAt" = ?, "updatedAt" = ?
        WHERE "id" = ?
        "#,
    )
    .bind(plan_tier)
    .bind(plan_status)
    .bind(period_end_at)
    .bind(now_ms)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Cancels paid plans whose period ended before `cutoff_ms`.
pub async fn cancel_lapsed_plans(
    pool: &SqlitePool,
    cutoff_ms: i64,
    now_ms: i64,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "users"
        SET "planStatus" = 'canceled', "updatedAt" = ?
        WHERE "planTier" != 'free'
          AND "planStatus" IN ('active', 'trialing', 'past_due')
          AND "periodEndAt" IS NOT NULL
          AND "periodEndAt" < ?
        "#,
    )
    .bind(now_ms)
    .bind(cutoff_ms)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Users holding at least one review item.
pub async fn list_learner_ids(pool: &SqlitePool) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT DISTINCT "userId" FROM "review_items" ORDER BY "userId""#)
        .fetch_all(pool)
        .await
}

fn map_user(row: &SqliteRow) -> Result<UserRow, sqlx::Error> {
    Ok(UserRow {
        id: row.try_get("id")?,
        plan_tier: row.try_get("planTier")?,
        plan_status: row.try_get("planStatus")?,
        period_end_at: row.try_get("periodEndAt")?,
        created_at: row.try_get("createdAt")?,
        updated_at: row.try_get("updatedAt")?,
    })
}
