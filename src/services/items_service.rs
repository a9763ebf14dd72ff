use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::{AppError, AppResult};
use crate::models::{ItemFields, ItemModel};
use crate::services::image_service::ImageService;

/// Reserved category value meaning "most recent items across all categories"
pub const LATEST_CATEGORY: &str = "latest";

/// How many items the reserved category returns
pub const LATEST_LIMIT: i64 = 10;

const ITEM_SELECT: &str = "SELECT i.id, i.name, i.category, i.description, i.image, i.user_id, \
     u.name AS owner_name, i.last_updated_on \
     FROM item i LEFT JOIN user u ON u.id = i.user_id";

// Later insertion first on equal timestamps.
const RECENCY_ORDER: &str = "ORDER BY i.last_updated_on DESC, i.id DESC";

pub struct ItemsService {
    pool: SqlitePool,
    images: Arc<ImageService>,
}

impl ItemsService {
    pub fn new(pool: SqlitePool, images: Arc<ImageService>) -> Self {
        Self { pool, images }
    }

    /// Trims the text fields, lowercases the category and rejects blanks.
    pub fn normalize(fields: ItemFields) -> AppResult<ItemFields> {
        let name = fields.name.trim().to_string();
        let category = fields.category.trim().to_lowercase();
        let description = fields.description.trim().to_string();

        if name.is_empty() {
            return Err(AppError::Validation("name is required".into()));
        }
        if category.is_empty() {
            return Err(AppError::Validation("category is required".into()));
        }
        if description.is_empty() {
            return Err(AppError::Validation("description is required".into()));
        }
        if category == LATEST_CATEGORY {
            return Err(AppError::Validation(format!(
                "'{}' is a reserved category",
                LATEST_CATEGORY
            )));
        }

        Ok(ItemFields {
            name,
            category,
            description,
            image: fields.image,
        })
    }

    pub async fn add(&self, fields: ItemFields, owner_id: i64) -> AppResult<i64> {
        let fields = Self::normalize(fields)?;

        let id = sqlx::query(
            "INSERT INTO item (name, category, description, image, user_id, last_updated_on) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&fields.name)
        .bind(&fields.category)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(owner_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        tracing::info!(
            "Item added: id={}, category={}, owner={}",
            id,
            fields.category,
            owner_id
        );
        Ok(id)
    }

    pub async fn get(&self, id: i64) -> AppResult<Option<ItemModel>> {
        let sql = format!("{} WHERE i.id = ? LIMIT 1", ITEM_SELECT);
        let model = sqlx::query_as::<_, ItemModel>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(model)
    }

    /// Fetches an item the requester may modify.
    pub async fn get_owned(&self, id: i64, requester_id: i64) -> AppResult<ItemModel> {
        let item = self
            .get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;

        if item.user_id != Some(requester_id) {
            tracing::warn!(
                "User {} refused modification of item {}",
                requester_id,
                id
            );
            return Err(AppError::Forbidden);
        }
        Ok(item)
    }

    /// Replaces the mutable fields of an owned item. The owner never changes.
    /// When the image reference changes, the previous file is removed.
    pub async fn update(
        &self,
        id: i64,
        fields: ItemFields,
        requester_id: i64,
    ) -> AppResult<ItemModel> {
        let current = self.get_owned(id, requester_id).await?;
        let fields = Self::normalize(fields)?;

        let rows_affected = sqlx::query(
            "UPDATE item SET name = ?, category = ?, description = ?, image = ?, last_updated_on = ? \
             WHERE id = ? AND user_id = ?",
        )
        .bind(&fields.name)
        .bind(&fields.category)
        .bind(&fields.description)
        .bind(&fields.image)
        .bind(Utc::now())
        .bind(id)
        .bind(requester_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Item {} not found", id)));
        }

        if current.image != fields.image {
            self.images.discard(&current.image).await;
        }

        tracing::info!("Item updated: id={}, category={}", id, fields.category);

        self.get(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))
    }

    /// Deletes an owned item and its image file. Returns the deleted row.
    pub async fn delete(&self, id: i64, requester_id: i64) -> AppResult<ItemModel> {
        let current = self.get_owned(id, requester_id).await?;

        let rows_affected = sqlx::query("DELETE FROM item WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(requester_id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if rows_affected == 0 {
            return Err(AppError::NotFound(format!("Item {} not found", id)));
        }

        self.images.discard(&current.image).await;

        tracing::info!("Item deleted: id={}, category={}", id, current.category);
        Ok(current)
    }

    /// Items of one category, most recently modified first. The reserved
    /// `latest` value returns the newest items across every category.
    pub async fn list_by_category(&self, category: &str) -> AppResult<Vec<ItemModel>> {
        let category = category.trim().to_lowercase();

        if category == LATEST_CATEGORY {
            let sql = format!("{} {} LIMIT ?", ITEM_SELECT, RECENCY_ORDER);
            let models = sqlx::query_as::<_, ItemModel>(&sql)
                .bind(LATEST_LIMIT)
                .fetch_all(&self.pool)
                .await?;
            return Ok(models);
        }

        let sql = format!("{} WHERE i.category = ? {}", ITEM_SELECT, RECENCY_ORDER);
        let models = sqlx::query_as::<_, ItemModel>(&sql)
            .bind(&category)
            .fetch_all(&self.pool)
            .await?;
        Ok(models)
    }

    pub async fn list_all(&self) -> AppResult<Vec<ItemModel>> {
        let sql = format!("{} ORDER BY i.category ASC, i.name ASC, i.id ASC", ITEM_SELECT);
        let models = sqlx::query_as::<_, ItemModel>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(models)
    }

    /// Category index: distinct categories with their item counts.
    pub async fn list_categories(&self) -> AppResult<BTreeMap<String, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT category, COUNT(*) FROM item GROUP BY category")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::services::image_service::{ImageService, DEFAULT_IMAGE};
    use crate::services::users_service::UsersService;
    use crate::storage::{LocalBackend, StorageBackend};
    use std::time::Duration;

    struct Fixture {
        items: ItemsService,
        storage: Arc<LocalBackend>,
        alice: i64,
        bob: i64,
        _dir: tempfile::TempDir,
    }

    async fn fixture() -> Fixture {
        let pool = test_pool().await;
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(LocalBackend::new(dir.path()));
        let images = Arc::new(ImageService::new(storage.clone(), None));

        let users = UsersService::new(pool.clone());
        let alice = users.create_user("Alice", "alice@example.com", None).await.unwrap();
        let bob = users.create_user("Bob", "bob@example.com", None).await.unwrap();

        Fixture {
            items: ItemsService::new(pool, images),
            storage,
            alice,
            bob,
            _dir: dir,
        }
    }

    fn fields(name: &str, category: &str, description: &str, image: &str) -> ItemFields {
        ItemFields {
            name: name.into(),
            category: category.into(),
            description: description.into(),
            image: image.into(),
        }
    }

    #[tokio::test]
    async fn test_add_lowercases_category() {
        let f = fixture().await;
        let id = f
            .items
            .add(fields("Pen", "Stationary", "blue pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();

        let item = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(item.category, "stationary");
        assert_eq!(item.image, DEFAULT_IMAGE);
        assert_eq!(item.user_id, Some(f.alice));
        assert_eq!(item.owner_name.as_deref(), Some("Alice"));
    }

    #[tokio::test]
    async fn test_add_rejects_blank_fields() {
        let f = fixture().await;
        for bad in [
            fields("", "birds", "d", DEFAULT_IMAGE),
            fields("Eagle", "  ", "d", DEFAULT_IMAGE),
            fields("Eagle", "birds", "", DEFAULT_IMAGE),
        ] {
            let err = f.items.add(bad, f.alice).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(f.items.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_rejects_reserved_category() {
        let f = fixture().await;
        let err = f
            .items
            .add(fields("Eagle", "Latest", "d", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_category_index_merges_casing() {
        let f = fixture().await;
        f.items
            .add(fields("Eagle", "Birds", "big", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        f.items
            .add(fields("Sparrow", "birds", "small", DEFAULT_IMAGE), f.bob)
            .await
            .unwrap();

        let categories = f.items.list_categories().await.unwrap();
        assert_eq!(categories.len(), 1);
        assert_eq!(categories.get("birds"), Some(&2));
    }

    #[tokio::test]
    async fn test_update_missing_item_is_not_found() {
        let f = fixture().await;
        let err = f
            .items
            .update(999, fields("Pen", "stationary", "d", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_by_non_owner_is_refused_and_unchanged() {
        let f = fixture().await;
        let id = f
            .items
            .add(fields("Pen", "stationary", "blue pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        let before = f.items.get(id).await.unwrap().unwrap();

        for _ in 0..2 {
            let err = f
                .items
                .update(id, fields("Hacked", "evil", "x", DEFAULT_IMAGE), f.bob)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::Forbidden));
        }

        let after = f.items.get(id).await.unwrap().unwrap();
        assert_eq!(after.name, before.name);
        assert_eq!(after.category, before.category);
        assert_eq!(after.last_updated_on, before.last_updated_on);
    }

    #[tokio::test]
    async fn test_update_keeps_owner_and_refreshes_timestamp() {
        let f = fixture().await;
        let id = f
            .items
            .add(fields("Pen", "stationary", "blue pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        let before = f.items.get(id).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let updated = f
            .items
            .update(id, fields("Red Pen", "Office", "red pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();

        assert_eq!(updated.user_id, Some(f.alice));
        assert_eq!(updated.name, "Red Pen");
        assert_eq!(updated.category, "office");
        assert!(updated.last_updated_on > before.last_updated_on);
    }

    #[tokio::test]
    async fn test_update_with_new_image_removes_previous_file() {
        let f = fixture().await;
        let old = f.storage.put("images/uploads/old.png", b"old").await.unwrap();
        let new = f.storage.put("images/uploads/new.png", b"new").await.unwrap();
        let id = f
            .items
            .add(fields("Pen", "stationary", "pen", &old), f.alice)
            .await
            .unwrap();

        f.items
            .update(id, fields("Pen", "stationary", "pen", &new), f.alice)
            .await
            .unwrap();

        assert!(!f.storage.exists(&old).await);
        assert!(f.storage.exists(&new).await);
    }

    #[tokio::test]
    async fn test_update_and_delete_keep_default_placeholder() {
        let f = fixture().await;
        f.storage.put(DEFAULT_IMAGE, b"gif").await.unwrap();
        let new = f.storage.put("images/uploads/new.png", b"new").await.unwrap();

        let id = f
            .items
            .add(fields("Pen", "stationary", "pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        f.items
            .update(id, fields("Pen", "stationary", "pen", &new), f.alice)
            .await
            .unwrap();
        assert!(f.storage.exists(DEFAULT_IMAGE).await);

        let other = f
            .items
            .add(fields("Ink", "stationary", "ink", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        f.items.delete(other, f.alice).await.unwrap();
        assert!(f.storage.exists(DEFAULT_IMAGE).await);
    }

    #[tokio::test]
    async fn test_delete_by_non_owner_is_refused() {
        let f = fixture().await;
        let id = f
            .items
            .add(fields("Parrot", "Birds", "green", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();

        let err = f.items.delete(id, f.bob).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));

        let listed = f.items.list_by_category("birds").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }

    #[tokio::test]
    async fn test_delete_removes_record_and_image() {
        let f = fixture().await;
        let image = f.storage.put("images/uploads/ink.png", b"ink").await.unwrap();
        let id = f
            .items
            .add(fields("Ink", "stationary", "ink", &image), f.alice)
            .await
            .unwrap();

        let deleted = f.items.delete(id, f.alice).await.unwrap();
        assert_eq!(deleted.id, id);
        assert!(f.items.get(id).await.unwrap().is_none());
        assert!(!f.storage.exists(&image).await);

        let err = f.items.delete(id, f.alice).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_unowned_item_cannot_be_modified() {
        let f = fixture().await;
        sqlx::query(
            "INSERT INTO item (name, category, description, image, user_id, last_updated_on) \
             VALUES ('Legacy', 'misc', 'seeded', ?, NULL, ?)",
        )
        .bind(DEFAULT_IMAGE)
        .bind(Utc::now())
        .execute(&f.items.pool)
        .await
        .unwrap();

        let legacy = f.items.list_by_category("misc").await.unwrap().remove(0);
        assert!(legacy.user_id.is_none());
        let err = f.items.delete(legacy.id, f.alice).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    #[tokio::test]
    async fn test_list_by_category_orders_by_recency() {
        let f = fixture().await;
        let first = f
            .items
            .add(fields("Eagle", "birds", "big", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        let second = f
            .items
            .add(fields("Sparrow", "birds", "small", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        f.items
            .add(fields("Pen", "stationary", "pen", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();

        let ids: Vec<i64> = f
            .items
            .list_by_category("Birds")
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![second, first]);

        tokio::time::sleep(Duration::from_millis(5)).await;
        f.items
            .update(first, fields("Eagle", "birds", "bigger", DEFAULT_IMAGE), f.alice)
            .await
            .unwrap();
        let ids: Vec<i64> = f
            .items
            .list_by_category("birds")
            .await
            .unwrap()
            .iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[tokio::test]
    async fn test_latest_returns_most_recent_across_categories() {
        let f = fixture().await;
        let mut ids = Vec::new();
        for n in 0..(LATEST_LIMIT + 2) {
            let category = if n % 2 == 0 { "birds" } else { "household" };
            let id = f
                .items
                .add(
                    fields(&format!("Item {}", n), category, "d", DEFAULT_IMAGE),
                    f.alice,
                )
                .await
                .unwrap();
            ids.push(id);
        }

        let latest = f.items.list_by_category(LATEST_CATEGORY).await.unwrap();
        assert_eq!(latest.len() as i64, LATEST_LIMIT);
        let newest_first: Vec<i64> = ids.iter().rev().take(LATEST_LIMIT as usize).copied().collect();
        let got: Vec<i64> = latest.iter().map(|i| i.id).collect();
        assert_eq!(got, newest_first);
    }
}
