pub mod image_search;
pub mod image_service;
pub mod items_service;
pub mod oauth_service;
pub mod session_store;
pub mod sso_providers;
pub mod users_service;

pub use image_service::ImageService;
pub use items_service::ItemsService;
pub use oauth_service::OAuthService;
pub use session_store::SessionStore;
pub use users_service::UsersService;
