pub mod pool;
pub mod schema;

pub use pool::create_pool;
pub use schema::ensure_schema;

#[cfg(test)]
pub(crate) async fn test_pool() -> sqlx::SqlitePool {
    let pool = create_pool("sqlite::memory:").await.unwrap();
    ensure_schema(&pool).await.unwrap();
    pool
}
