use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::response::Redirect;
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::middleware::Session;
use crate::models::ItemFields;
use crate::services::image_service::Upload;
use crate::services::items_service::ItemsService;
use crate::state::AppState;

/// Fields of the add/update item form
#[derive(Debug, Default)]
struct ItemForm {
    name: String,
    category: String,
    description: String,
    upload: Option<Upload>,
    feeling_lucky: bool,
}

impl ItemForm {
    fn fields(&self) -> ItemFields {
        ItemFields {
            name: self.name.clone(),
            category: self.category.clone(),
            description: self.description.clone(),
            image: String::new(),
        }
    }
}

fn is_checked(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1" | "yes"
    )
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation(format!("Malformed form data: {}", e))
}

async fn read_item_form(mut multipart: Multipart) -> AppResult<ItemForm> {
    let mut form = ItemForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        match name.as_str() {
            "item_img" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let data = field.bytes().await.map_err(multipart_error)?;
                if !data.is_empty() {
                    form.upload = Some(Upload { file_name, data });
                }
            }
            "item_name" => form.name = field.text().await.map_err(multipart_error)?,
            "item_cat" => form.category = field.text().await.map_err(multipart_error)?,
            "item_desc" => form.description = field.text().await.map_err(multipart_error)?,
            "feeling_lucky" => {
                form.feeling_lucky = is_checked(&field.text().await.map_err(multipart_error)?)
            }
            other => tracing::debug!("Ignoring form field {}", other),
        }
    }
    Ok(form)
}

fn category_location(category: &str) -> String {
    format!("/category/{}", urlencoding::encode(category))
}

/// POST `/add-item`
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    session: Session,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let user_id = session.user_id()?;
    let form = read_item_form(multipart).await?;

    // Validate before touching disk so a rejected form leaves no file behind.
    let fields = ItemsService::normalize(form.fields())?;
    let image = state
        .images
        .resolve_image(form.upload, &fields.name, None, form.feeling_lucky)
        .await?;

    let location = category_location(&fields.category);
    state
        .items
        .add(ItemFields { image, ..fields }, user_id)
        .await?;
    Ok(Redirect::to(&location))
}

/// POST `/update-item/:id`
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    session: Session,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let user_id = session.user_id()?;
    let current = state.items.get_owned(id, user_id).await?;
    let form = read_item_form(multipart).await?;

    let fields = ItemsService::normalize(form.fields())?;
    let image = state
        .images
        .resolve_image(
            form.upload,
            &fields.name,
            Some(&current.image),
            form.feeling_lucky,
        )
        .await?;

    let updated = state
        .items
        .update(id, ItemFields { image, ..fields }, user_id)
        .await?;
    Ok(Redirect::to(&category_location(&updated.category)))
}

/// DELETE or POST `/delete-item/:id`
pub async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    session: Session,
) -> AppResult<Json<serde_json::Value>> {
    let user_id = session.user_id()?;
    let deleted = state.items.delete(id, user_id).await?;
    Ok(Json(json!({ "deleted": deleted.id, "category": deleted.category })))
}
