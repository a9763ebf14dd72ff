use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::Session;
use crate::models::ItemRecord;
use crate::services::items_service::LATEST_CATEGORY;
use crate::state::AppState;

fn records(items: Vec<crate::models::ItemModel>) -> Vec<ItemRecord> {
    items.into_iter().map(ItemRecord::from).collect()
}

/// GET `/api/v1/items`
pub async fn list_items(State(state): State<Arc<AppState>>) -> AppResult<Json<Vec<ItemRecord>>> {
    Ok(Json(records(state.items.list_all().await?)))
}

/// GET `/api/v1/items/:id`
pub async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> AppResult<Json<ItemRecord>> {
    let item = state
        .items
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Item {} not found", id)))?;
    Ok(Json(item.into()))
}

/// GET `/api/v1/categories`
pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<BTreeMap<String, i64>>> {
    Ok(Json(state.items.list_categories().await?))
}

/// GET `/api/v1/category/:category`
pub async fn category_items(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
) -> AppResult<Json<Vec<ItemRecord>>> {
    Ok(Json(records(state.items.list_by_category(&category).await?)))
}

/// GET `/category/:category`: the category view with the index alongside
pub async fn category_page(
    State(state): State<Arc<AppState>>,
    Path(category): Path<String>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let category = category.trim().to_lowercase();
    let items = records(state.items.list_by_category(&category).await?);
    let categories = state.items.list_categories().await?;

    Ok(Json(json!({
        "category": category,
        "items": items,
        "categories": categories,
        "username": session.ctx.username,
    })))
}

/// GET `/categories`: the index plus the latest additions
pub async fn categories_page(
    State(state): State<Arc<AppState>>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let categories = state.items.list_categories().await?;
    let latest = records(state.items.list_by_category(LATEST_CATEGORY).await?);

    Ok(Json(json!({
        "categories": categories,
        "latest": latest,
        "username": session.ctx.username,
    })))
}
