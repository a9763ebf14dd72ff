use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ring::rand::{SecureRandom, SystemRandom};

use crate::error::{AppError, AppResult};
use crate::models::{ProviderKind, SessionContext};
use crate::services::sso_providers::IdentityProvider;
use crate::services::users_service::UsersService;

const STATE_TOKEN_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectOutcome {
    Connected { user_id: i64, username: String },
    AlreadyConnected { username: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum DisconnectOutcome {
    NotConnected,
    Disconnected { revoked: bool },
}

/// Anti-forgery token: 32 random bytes, URL-safe base64 (43 chars)
pub fn generate_state_token() -> AppResult<String> {
    let mut bytes = [0u8; STATE_TOKEN_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal("Failed to generate state token".into()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

pub struct OAuthService {
    users: UsersService,
    providers: HashMap<ProviderKind, Arc<dyn IdentityProvider>>,
}

impl OAuthService {
    pub fn new(users: UsersService, providers: Vec<Arc<dyn IdentityProvider>>) -> Self {
        let providers = providers.into_iter().map(|p| (p.kind(), p)).collect();
        Self { users, providers }
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.providers.contains_key(&kind)
    }

    fn provider(&self, kind: ProviderKind) -> AppResult<&Arc<dyn IdentityProvider>> {
        self.providers.get(&kind).ok_or_else(|| {
            AppError::ProviderUnavailable(format!("{} sign-in is not configured", kind.name()))
        })
    }

    /// Issues a fresh state token and stores it in the session.
    pub fn begin(&self, session: &mut SessionContext) -> AppResult<String> {
        let state = generate_state_token()?;
        session.state = Some(state.clone());
        Ok(state)
    }

    pub async fn connect(
        &self,
        session: &mut SessionContext,
        kind: ProviderKind,
        echoed_state: Option<&str>,
        credential: &str,
    ) -> AppResult<ConnectOutcome> {
        match (session.state.as_deref(), echoed_state) {
            (Some(stored), Some(echoed)) if stored == echoed => {}
            _ => {
                tracing::warn!("Rejected {} connect: invalid state parameter", kind.name());
                return Err(AppError::StateMismatch);
            }
        }

        let provider = self.provider(kind)?;

        let credential = credential.trim();
        if credential.is_empty() {
            return Err(AppError::Validation("Missing authorization credential".into()));
        }

        let identity = provider.exchange(credential).await?;

        if session.is_connected()
            && session.provider == Some(identity.provider)
            && session.provider_subject.as_deref() == Some(identity.subject.as_str())
        {
            tracing::info!("{} user {} is already connected", kind.name(), identity.subject);
            // The exchange minted a token nobody will keep
            if session.access_token.as_deref() != Some(identity.access_token.as_str()) {
                if let Err(e) = provider.revoke(&identity.subject, &identity.access_token).await {
                    tracing::warn!("Failed to revoke redundant {} token: {}", kind.name(), e);
                }
            }
            return Ok(ConnectOutcome::AlreadyConnected {
                username: session.username.clone().unwrap_or(identity.name),
            });
        }

        let user_id = self
            .users
            .resolve_or_create(&identity.name, &identity.email, identity.picture.as_deref())
            .await?;

        session.username = Some(identity.name.clone());
        session.email = Some(identity.email);
        session.picture = identity.picture;
        session.user_id = Some(user_id);
        session.provider = Some(identity.provider);
        session.provider_subject = Some(identity.subject);
        session.access_token = Some(identity.access_token);

        tracing::info!("User {} connected via {}", user_id, kind.name());
        Ok(ConnectOutcome::Connected {
            user_id,
            username: identity.name,
        })
    }

    /// Revokes the provider token (best effort) and clears the session either way.
    pub async fn disconnect(&self, session: &mut SessionContext) -> DisconnectOutcome {
        let Some(access_token) = session.access_token.clone() else {
            return DisconnectOutcome::NotConnected;
        };

        let revoked = match session.provider.map(|kind| self.provider(kind)) {
            Some(Ok(provider)) => {
                let subject = session.provider_subject.clone().unwrap_or_default();
                match provider.revoke(&subject, &access_token).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::warn!("Failed to revoke token for user {:?}: {}", session.user_id, e);
                        false
                    }
                }
            }
            Some(Err(e)) => {
                tracing::warn!("Cannot revoke token: {}", e);
                false
            }
            None => false,
        };

        tracing::info!("User {:?} disconnected", session.user_id);
        session.clear();
        DisconnectOutcome::Disconnected { revoked }
    }
}
