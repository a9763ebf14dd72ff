use sqlx::SqlitePool;

use crate::error::AppResult;
use crate::models::User;

#[derive(Clone)]
pub struct UsersService {
    pool: SqlitePool,
}

impl UsersService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Exact email match. Email is not unique in the store, so the oldest row wins.
    pub async fn get_user_id(&self, email: &str) -> AppResult<Option<i64>> {
        let id = sqlx::query_scalar("SELECT id FROM user WHERE email = ? ORDER BY id ASC LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    /// Unconditional insert; callers check `get_user_id` first.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        picture: Option<&str>,
    ) -> AppResult<i64> {
        let id = sqlx::query("INSERT INTO user (name, email, picture) VALUES (?, ?, ?)")
            .bind(name)
            .bind(email)
            .bind(picture)
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        Ok(id)
    }

    pub async fn get_user(&self, id: i64) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, email, picture FROM user WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// Looks the user up by email, creating it on first sight.
    pub async fn resolve_or_create(
        &self,
        name: &str,
        email: &str,
        picture: Option<&str>,
    ) -> AppResult<i64> {
        if let Some(id) = self.get_user_id(email).await? {
            return Ok(id);
        }
        let id = self.create_user(name, email, picture).await?;
        tracing::info!("Created user {} for {}", id, email);
        Ok(id)
    }

    #[cfg(test)]
    pub(crate) async fn count(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM user")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
