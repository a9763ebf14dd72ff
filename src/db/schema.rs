use sqlx::SqlitePool;

// email is intentionally not UNIQUE: lookups take the lowest id.
const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS user (
        id      INTEGER PRIMARY KEY AUTOINCREMENT,
        name    TEXT NOT NULL,
        email   TEXT NOT NULL,
        picture TEXT
    )"#,
    r#"
    CREATE TABLE IF NOT EXISTS item (
        id              INTEGER PRIMARY KEY AUTOINCREMENT,
        name            TEXT NOT NULL,
        category        TEXT NOT NULL,
        description     TEXT NOT NULL,
        image           TEXT NOT NULL,
        user_id         INTEGER REFERENCES user(id),
        last_updated_on TEXT NOT NULL
    )"#,
    "CREATE INDEX IF NOT EXISTS idx_item_category ON item (category, last_updated_on)",
    "CREATE INDEX IF NOT EXISTS idx_user_email ON user (email)",
    r#"
    CREATE TABLE IF NOT EXISTS session (
        id         TEXT PRIMARY KEY,
        data       TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )"#,
];

/// Creates the catalog tables if they are missing.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_pool;

    #[tokio::test]
    async fn test_ensure_schema_creates_tables() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('user', 'item', 'session')",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        for expected in ["user", "item", "session"] {
            assert!(names.contains(&expected.to_string()), "missing table {}", expected);
        }
    }

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();
    }
}
