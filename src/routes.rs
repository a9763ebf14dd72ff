use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;
use http::Method;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{api, auth, health, items};
use crate::state::AppState;

/// Upper bound for the add/update form, image included
const MAX_FORM_BYTES: usize = 10 * 1024 * 1024;

pub fn router(state: Arc<AppState>) -> Router {
    // Read-only JSON endpoints may be called cross-origin
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/items", get(api::list_items))
        .route("/items/:id", get(api::get_item))
        .route("/categories", get(api::list_categories))
        .route("/category/:category", get(api::category_items))
        .layer(cors);

    Router::new()
        .route("/", get(auth::login))
        .route("/login", get(auth::login))
        .route("/gconnect", post(auth::gconnect))
        .route("/fbconnect", post(auth::fbconnect))
        .route("/disconnect", get(auth::disconnect))
        .route("/add-item", post(items::add_item))
        .route("/update-item/:id", post(items::update_item))
        .route(
            "/delete-item/:id",
            delete(items::delete_item).post(items::delete_item),
        )
        .route("/category/:category", get(api::category_page))
        .route("/categories", get(api::categories_page))
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes)
        .layer(DefaultBodyLimit::max(MAX_FORM_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
