pub mod operations;

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub const SCHEMA_VERSION: &str = "1";

const SCHEMA_SQL: &str = include_str!("../../sql/schema.sql");

#[derive(Debug, thiserror::Error)]
pub enum DbInitError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub async fn init_pool(db_path: &Path) -> Result<SqlitePool, DbInitError> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| DbInitError::Io(e.to_string()))?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());
    let options = SqliteConnectOptions::from_str(&db_url)
        .map_err(|e| DbInitError::Config(e.to_string()))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    tracing::info!(path = %db_path.display(), "sqlite database ready");
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), DbInitError> {
    let has_metadata: Option<String> = sqlx::query_scalar(
        r#"SELECT "name" FROM "sqlite_master" WHERE "type" = 'table' AND "name" = '_db_metadata'"#,
    )
    .fetch_optional(pool)
    .await?;

    if has_metadata.is_some() {
        let version: Option<String> = sqlx::query_scalar(
            r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
        )
        .fetch_optional(pool)
        .await?;
        if version.as_deref() == Some(SCHEMA_VERSION) {
            return Ok(());
        }
    }

    let mut tx = pool.begin().await?;
    for stmt in split_sql_statements(SCHEMA_SQL) {
        let sql: String = stmt
            .lines()
            .filter(|line| !line.trim().starts_with("--"))
            .collect::<Vec<_>>()
            .join("\n");
        let trimmed = sql.trim();
        if trimmed.is_empty() {
            continue;
        }
        sqlx::query(trimmed).execute(&mut *tx).await?;
    }

    sqlx::query(r#"INSERT OR REPLACE INTO "_db_metadata" ("key", "value") VALUES ('schema_version', ?)"#)
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(version = SCHEMA_VERSION, "schema applied");
    Ok(())
}

pub async fn ping(pool: &SqlitePool) -> bool {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(pool)
        .await
        .is_ok()
}

/// Splits a script on `;`, ignoring semicolons inside quotes.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            ';' if !in_single_quote && !in_double_quote => {
                let stmt = current.trim();
                if !stmt.is_empty() {
                    statements.push(stmt.to_string());
                }
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }

    let tail = current.trim();
    if !tail.is_empty() {
        statements.push(tail.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_ignores_quoted_semicolons() {
        let sql = r#"CREATE TABLE "a;b" ("x" TEXT DEFAULT ';'); INSERT INTO t VALUES (1);"#;
        let parts = split_sql_statements(sql);
        assert_eq!(parts.len(), 2);
        assert!(parts[0].starts_with("CREATE TABLE"));
        assert_eq!(parts[1], "INSERT INTO t VALUES (1)");
    }

    #[test]
    fn test_schema_has_all_tables() {
        let statements = split_sql_statements(SCHEMA_SQL);
        for table in [
            "users",
            "lessons",
            "cards",
            "review_items",
            "answer_records",
            "quizzes",
            "quiz_questions",
            "usage_counters",
            "qa_history",
            "progress_snapshots",
        ] {
            let needle = format!(r#"CREATE TABLE IF NOT EXISTS "{table}""#);
            assert!(
                statements.iter().any(|s| s.contains(&needle)),
                "missing table {table}"
            );
        }
    }

    #[tokio::test]
    async fn test_init_pool_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("t.db");
        let pool = init_pool(&path).await.unwrap();
        assert!(ping(&pool).await);
        pool.close().await;

        let pool = init_pool(&path).await.unwrap();
        let version: String = sqlx::query_scalar(
            r#"SELECT "value" FROM "_db_metadata" WHERE "key" = 'schema_version'"#,
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }
}
