use chrono::{Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::SessionContext;

/// Server-side session records, keyed by the id carried in the session cookie
#[derive(Clone)]
pub struct SessionStore {
    pool: SqlitePool,
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Unknown ids and unreadable records both load as `None`.
    pub async fn load(&self, id: &str) -> AppResult<Option<SessionContext>> {
        let data: Option<String> =
            sqlx::query_scalar("SELECT data FROM session WHERE id = ? LIMIT 1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(data.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(ctx) => Some(ctx),
            Err(e) => {
                tracing::warn!("Discarding unreadable session {}: {}", id, e);
                None
            }
        }))
    }

    pub async fn save(&self, id: &str, ctx: &SessionContext) -> AppResult<()> {
        let data = serde_json::to_string(ctx)
            .map_err(|e| AppError::Internal(format!("Failed to encode session: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO session (id, data, updated_at) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete(&self, id: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM session WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Removes records not saved within `max_age`. Returns how many went.
    pub async fn purge_expired(&self, max_age: Duration) -> AppResult<u64> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query("DELETE FROM session WHERE updated_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::models::ProviderKind;

    #[tokio::test]
    async fn test_save_load_and_overwrite() {
        let store = SessionStore::new(test_pool().await);
        assert_eq!(store.load("sid").await.unwrap(), None);

        let mut ctx = SessionContext {
            state: Some("abc".into()),
            ..SessionContext::default()
        };
        store.save("sid", &ctx).await.unwrap();
        assert_eq!(store.load("sid").await.unwrap(), Some(ctx.clone()));

        ctx.user_id = Some(3);
        ctx.provider = Some(ProviderKind::Facebook);
        store.save("sid", &ctx).await.unwrap();
        assert_eq!(store.load("sid").await.unwrap(), Some(ctx));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = SessionStore::new(test_pool().await);
        store.save("sid", &SessionContext::default()).await.unwrap();
        store.delete("sid").await.unwrap();
        assert_eq!(store.load("sid").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired_keeps_recent_records() {
        let pool = test_pool().await;
        sqlx::query(
            "INSERT INTO session (id, data, updated_at) VALUES ('old', '{}', '2000-01-01T00:00:00+00:00')",
        )
        .execute(&pool)
        .await
        .unwrap();
        let store = SessionStore::new(pool);
        store.save("recent", &SessionContext::default()).await.unwrap();

        let removed = store.purge_expired(Duration::days(7)).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.load("old").await.unwrap(), None);
        assert_eq!(
            store.load("recent").await.unwrap(),
            Some(SessionContext::default())
        );
    }

    #[tokio::test]
    async fn test_corrupt_record_loads_as_none() {
        let pool = test_pool().await;
        sqlx::query("INSERT INTO session (id, data, updated_at) VALUES ('sid', 'not json', '')")
            .execute(&pool)
            .await
            .unwrap();
        let store = SessionStore::new(pool);
        assert_eq!(store.load("sid").await.unwrap(), None);
    }
}
