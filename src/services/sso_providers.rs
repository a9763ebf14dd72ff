//! Identity provider registry: provider-specific credential exchange and revocation
//!
//! Every provider turns a client-side credential (Google one-time code,
//! Facebook short-lived token) into a verified `ProviderIdentity`.

use reqwest::Client;
use serde::Deserialize;

use crate::config::FacebookSecrets;
use crate::error::{AppError, AppResult};
use crate::http_client::{provider_error, provider_json};
use crate::models::{ProviderIdentity, ProviderKind};

#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Exchange the credential posted by the sign-in button for a verified identity
    async fn exchange(&self, credential: &str) -> AppResult<ProviderIdentity>;

    /// Revoke the access token obtained by `exchange`
    async fn revoke(&self, subject: &str, access_token: &str) -> AppResult<()>;
}

#[derive(Deserialize)]
struct FacebookTokenResponse {
    access_token: String,
}

#[derive(Deserialize)]
struct DebugTokenEnvelope {
    data: DebugTokenData,
}

#[derive(Deserialize)]
struct DebugTokenData {
    #[serde(default)]
    app_id: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    is_valid: bool,
}

#[derive(Deserialize)]
struct FacebookProfile {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct PictureEnvelope {
    data: PictureData,
}

#[derive(Deserialize)]
struct PictureData {
    url: String,
}

/// Facebook login: short-lived user token from the JavaScript SDK
pub struct FacebookProvider {
    http_client: Client,
    secrets: FacebookSecrets,
    graph_url: String,
}

impl FacebookProvider {
    pub fn new(http_client: Client, secrets: FacebookSecrets, graph_url: String) -> Self {
        Self {
            http_client,
            secrets,
            graph_url: graph_url.trim_end_matches('/').to_string(),
        }
    }

    fn app_token(&self) -> String {
        format!("{}|{}", self.secrets.app_id, self.secrets.app_secret)
    }

    /// Swap the short-lived token for a long-lived one
    async fn exchange_token(&self, short_lived: &str) -> AppResult<String> {
        let response = self
            .http_client
            .get(format!("{}/oauth/access_token", self.graph_url))
            .query(&[
                ("grant_type", "fb_exchange_token"),
                ("client_id", self.secrets.app_id.as_str()),
                ("client_secret", self.secrets.app_secret.as_str()),
                ("fb_exchange_token", short_lived),
            ])
            .send()
            .await
            .map_err(|e| provider_error("Facebook token exchange failed", e))?;

        let tokens: FacebookTokenResponse =
            provider_json("Failed to exchange the Facebook token", response).await?;
        Ok(tokens.access_token)
    }

    /// Confirms the token was issued to this app and returns its user id
    async fn inspect_token(&self, access_token: &str) -> AppResult<String> {
        let response = self
            .http_client
            .get(format!("{}/debug_token", self.graph_url))
            .query(&[
                ("input_token", access_token),
                ("access_token", self.app_token().as_str()),
            ])
            .send()
            .await
            .map_err(|e| provider_error("Facebook debug_token failed", e))?;

        let envelope: DebugTokenEnvelope = provider_json("Facebook debug_token", response).await?;
        let data = envelope.data;

        if !data.is_valid {
            return Err(AppError::UpstreamAuth("Facebook token is not valid".into()));
        }
        if data.app_id.as_deref() != Some(self.secrets.app_id.as_str()) {
            return Err(AppError::TokenMismatch(
                "Token's app ID does not match app's".into(),
            ));
        }
        data.user_id
            .ok_or_else(|| AppError::UpstreamAuth("Facebook token has no user".into()))
    }

    async fn fetch_profile(&self, access_token: &str) -> AppResult<FacebookProfile> {
        let response = self
            .http_client
            .get(format!("{}/me", self.graph_url))
            .query(&[("access_token", access_token), ("fields", "id,name,email")])
            .send()
            .await
            .map_err(|e| provider_error("Facebook profile request failed", e))?;

        provider_json("Facebook profile", response).await
    }

    /// Profile picture is cosmetic; any failure just leaves it empty.
    async fn fetch_picture(&self, access_token: &str) -> Option<String> {
        let response = self
            .http_client
            .get(format!("{}/me/picture", self.graph_url))
            .query(&[
                ("access_token", access_token),
                ("redirect", "0"),
                ("height", "200"),
                ("width", "200"),
            ])
            .send()
            .await;

        let picture = match response {
            Ok(r) => provider_json::<PictureEnvelope>("Facebook picture", r).await,
            Err(e) => Err(provider_error("Facebook picture request failed", e)),
        };
        match picture {
            Ok(p) => Some(p.data.url),
            Err(e) => {
                tracing::warn!("Could not fetch Facebook picture: {}", e);
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for FacebookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
    }

    async fn exchange(&self, short_lived: &str) -> AppResult<ProviderIdentity> {
        let access_token = self.exchange_token(short_lived).await?;
        let token_user = self.inspect_token(&access_token).await?;

        let profile = self.fetch_profile(&access_token).await?;
        if profile.id != token_user {
            return Err(AppError::TokenMismatch(
                "Token's user ID doesn't match given user ID".into(),
            ));
        }

        let email = profile
            .email
            .ok_or_else(|| AppError::UpstreamAuth("Facebook account has no email".into()))?;
        let name = profile.name.unwrap_or_else(|| email.clone());
        let picture = self.fetch_picture(&access_token).await;

        Ok(ProviderIdentity {
            provider: ProviderKind::Facebook,
            subject: profile.id,
            access_token,
            name,
            email,
            picture,
        })
    }

    async fn revoke(&self, subject: &str, access_token: &str) -> AppResult<()> {
        let response = self
            .http_client
            .delete(format!("{}/{}/permissions", self.graph_url, subject))
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| provider_error("Facebook revoke request failed", e))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamAuth(format!(
                "Failed to revoke token: status={}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn provider(server: &MockServer) -> FacebookProvider {
        FacebookProvider::new(
            reqwest::Client::new(),
            FacebookSecrets {
                app_id: "app-1".into(),
                app_secret: "shh".into(),
            },
            server.base_url(),
        )
    }

    async fn mock_exchange(server: &MockServer) {
        server
            .mock_async(|when, then| {
                when.method(GET)
                    .path("/oauth/access_token")
                    .query_param("grant_type", "fb_exchange_token")
                    .query_param("fb_exchange_token", "short");
                then.status(200)
                    .json_body(json!({ "access_token": "long", "token_type": "bearer" }));
            })
            .await;
    }

    async fn mock_debug(server: &MockServer, app_id: &str, user_id: &str, valid: bool) {
        let body = json!({
            "data": { "app_id": app_id, "user_id": user_id, "is_valid": valid }
        });
        server
            .mock_async(move |when, then| {
                when.method(GET)
                    .path("/debug_token")
                    .query_param("input_token", "long")
                    .query_param("access_token", "app-1|shh");
                then.status(200).json_body(body);
            })
            .await;
    }

    async fn mock_profile(server: &MockServer, id: &str) {
        let body = json!({ "id": id, "name": "Bob", "email": "bob@example.com" });
        server
            .mock_async(move |when, then| {
                when.method(GET).path("/me").query_param("fields", "id,name,email");
                then.status(200).json_body(body);
            })
            .await;
    }

    #[tokio::test]
    async fn test_exchange_returns_identity_with_picture() {
        let server = MockServer::start_async().await;
        mock_exchange(&server).await;
        mock_debug(&server, "app-1", "fb-9", true).await;
        mock_profile(&server, "fb-9").await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/me/picture").query_param("redirect", "0");
                then.status(200)
                    .json_body(json!({ "data": { "url": "https://example.com/bob.jpg" } }));
            })
            .await;

        let identity = provider(&server).exchange("short").await.unwrap();
        assert_eq!(identity.provider, ProviderKind::Facebook);
        assert_eq!(identity.subject, "fb-9");
        assert_eq!(identity.access_token, "long");
        assert_eq!(identity.name, "Bob");
        assert_eq!(identity.email, "bob@example.com");
        assert_eq!(identity.picture.as_deref(), Some("https://example.com/bob.jpg"));
    }

    #[tokio::test]
    async fn test_picture_failure_is_not_fatal() {
        let server = MockServer::start_async().await;
        mock_exchange(&server).await;
        mock_debug(&server, "app-1", "fb-9", true).await;
        mock_profile(&server, "fb-9").await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/me/picture");
                then.status(400);
            })
            .await;

        let identity = provider(&server).exchange("short").await.unwrap();
        assert_eq!(identity.picture, None);
    }

    #[tokio::test]
    async fn test_token_for_another_app_is_mismatch() {
        let server = MockServer::start_async().await;
        mock_exchange(&server).await;
        mock_debug(&server, "other-app", "fb-9", true).await;

        let err = provider(&server).exchange("short").await.unwrap_err();
        assert!(matches!(err, AppError::TokenMismatch(_)));
    }

    #[tokio::test]
    async fn test_invalid_token_is_upstream_error() {
        let server = MockServer::start_async().await;
        mock_exchange(&server).await;
        mock_debug(&server, "app-1", "fb-9", false).await;

        let err = provider(&server).exchange("short").await.unwrap_err();
        assert!(matches!(err, AppError::UpstreamAuth(_)));
    }

    #[tokio::test]
    async fn test_profile_for_other_user_is_mismatch() {
        let server = MockServer::start_async().await;
        mock_exchange(&server).await;
        mock_debug(&server, "app-1", "fb-9", true).await;
        mock_profile(&server, "fb-10").await;

        let err = provider(&server).exchange("short").await.unwrap_err();
        assert!(matches!(err, AppError::TokenMismatch(_)));
    }

    #[tokio::test]
    async fn test_revoke_deletes_permissions() {
        let server = MockServer::start_async().await;
        let revoke = server
            .mock_async(|when, then| {
                when.method(DELETE)
                    .path("/fb-9/permissions")
                    .query_param("access_token", "long");
                then.status(200).json_body(json!({ "success": true }));
            })
            .await;

        provider(&server).revoke("fb-9", "long").await.unwrap();
        revoke.assert_async().await;
    }
}
