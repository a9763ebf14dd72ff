use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Item row joined with its owner's display name.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ItemModel {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: String,
    pub user_id: Option<i64>,
    pub owner_name: Option<String>,
    pub last_updated_on: DateTime<Utc>,
}

/// Mutable fields of an item, as submitted by the add/update forms.
#[derive(Debug, Clone)]
pub struct ItemFields {
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CreatedBy {
    pub id: i64,
    pub username: String,
}

/// JSON shape served by the catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: i64,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image: String,
    pub last_updated_on: DateTime<Utc>,
    pub created_by: Option<CreatedBy>,
}

impl From<ItemModel> for ItemRecord {
    fn from(model: ItemModel) -> Self {
        let created_by = match (model.user_id, model.owner_name) {
            (Some(id), Some(username)) => Some(CreatedBy { id, username }),
            _ => None,
        };
        Self {
            id: model.id,
            name: model.name,
            category: model.category,
            description: model.description,
            image: model.image,
            last_updated_on: model.last_updated_on,
            created_by,
        }
    }
}
