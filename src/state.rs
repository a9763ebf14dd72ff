use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::error::AppResult;
use crate::google_auth::GoogleProvider;
use crate::http_client::build_client;
use crate::middleware::SessionKeys;
use crate::models::ProviderKind;
use crate::services::image_search::ImageSearchClient;
use crate::services::image_service::ImageService;
use crate::services::items_service::ItemsService;
use crate::services::oauth_service::OAuthService;
use crate::services::session_store::SessionStore;
use crate::services::sso_providers::{FacebookProvider, IdentityProvider};
use crate::services::users_service::UsersService;
use crate::storage::LocalBackend;

/// Shared per-process state handed to every handler
pub struct AppState {
    pub config: Config,
    pub pool: SqlitePool,
    pub items: ItemsService,
    pub users: UsersService,
    pub images: Arc<ImageService>,
    pub oauth: OAuthService,
    pub sessions: SessionStore,
    pub session_keys: SessionKeys,
}

impl AppState {
    /// Wires the providers and image search from `config`.
    pub fn new(config: Config, pool: SqlitePool) -> AppResult<Self> {
        let http_client = build_client(config.http_timeout)?;

        let mut providers: Vec<Arc<dyn IdentityProvider>> = Vec::new();
        if let Some(secrets) = &config.google {
            tracing::info!("Google sign-in enabled: client_id={}", secrets.client_id);
            providers.push(Arc::new(GoogleProvider::new(
                http_client.clone(),
                secrets.clone(),
                config.endpoints.clone(),
            )));
        }
        if let Some(secrets) = &config.facebook {
            tracing::info!("Facebook login enabled: app_id={}", secrets.app_id);
            providers.push(Arc::new(FacebookProvider::new(
                http_client.clone(),
                secrets.clone(),
                config.endpoints.facebook_graph_url.clone(),
            )));
        }

        let search = config
            .image_search
            .clone()
            .map(|cfg| ImageSearchClient::new(http_client.clone(), cfg));

        let state = Self::build(config, pool, providers, search);
        for kind in [ProviderKind::Google, ProviderKind::Facebook] {
            if !state.oauth.is_configured(kind) {
                tracing::warn!("{} sign-in disabled: no client secrets", kind.name());
            }
        }
        Ok(state)
    }

    pub fn build(
        config: Config,
        pool: SqlitePool,
        providers: Vec<Arc<dyn IdentityProvider>>,
        search: Option<ImageSearchClient>,
    ) -> Self {
        let storage = Arc::new(LocalBackend::new(config.static_root.clone()));
        let images = Arc::new(ImageService::new(storage, search));
        let users = UsersService::new(pool.clone());

        Self {
            items: ItemsService::new(pool.clone(), images.clone()),
            oauth: OAuthService::new(users.clone(), providers),
            sessions: SessionStore::new(pool.clone()),
            session_keys: SessionKeys::new(&config.session_secret),
            users,
            images,
            pool,
            config,
        }
    }
}
