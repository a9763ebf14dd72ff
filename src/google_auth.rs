use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::config::{GoogleSecrets, ProviderEndpoints};
use crate::error::{AppError, AppResult};
use crate::http_client::{provider_error, provider_json};
use crate::models::{ProviderIdentity, ProviderKind};
use crate::services::sso_providers::IdentityProvider;

/// Allowed issuers for Google ID tokens
const ALLOWED_ISSUERS: &[&str] = &["accounts.google.com", "https://accounts.google.com"];

/// Cache TTL in seconds (1 hour)
const JWKS_CACHE_TTL_SECS: u64 = 3600;

/// Redirect URI used by the JavaScript sign-in client's one-time code flow
const POSTMESSAGE_REDIRECT: &str = "postmessage";

/// Claims extracted from a verified Google ID token
#[derive(Debug, Clone)]
pub struct GoogleClaims {
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Internal JWT claims structure for Google ID token
#[derive(Debug, Serialize, Deserialize)]
struct GoogleIdTokenClaims {
    sub: String,
    email: Option<String>,
    email_verified: Option<bool>,
    name: Option<String>,
    picture: Option<String>,
    aud: String,
    iss: String,
    exp: u64,
    iat: u64,
}

/// JWKS key from Google
#[derive(Debug, Deserialize)]
struct JwkKey {
    kid: String,
    n: String,
    e: String,
    kty: String,
}

/// JWKS response from Google
#[derive(Debug, Deserialize)]
struct JwksResponse {
    keys: Vec<JwkKey>,
}

/// Cached JWKS keys
struct JwksCache {
    keys: HashMap<String, JwkKey>,
    fetched_at: std::time::Instant,
}

/// Google ID token verifier with JWKS caching
#[derive(Clone)]
pub struct GoogleTokenVerifier {
    client: Client,
    client_id: String,
    jwks_url: String,
    cache: Arc<RwLock<Option<JwksCache>>>,
}

impl GoogleTokenVerifier {
    pub fn new(client: Client, client_id: String, jwks_url: String) -> Self {
        Self {
            client,
            client_id,
            jwks_url,
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Verify a Google ID token and return the claims
    pub async fn verify(&self, id_token: &str) -> AppResult<GoogleClaims> {
        // Decode header to get kid
        let header = decode_header(id_token)
            .map_err(|e| AppError::UpstreamAuth(format!("Invalid ID token header: {}", e)))?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::UpstreamAuth("ID token missing kid header".into()))?;

        // Get the matching key from JWKS
        let decoding_key = self.get_decoding_key(&kid).await?;

        // Audience is compared below so a foreign token is reported as a mismatch
        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.set_issuer(ALLOWED_ISSUERS);

        let token_data = decode::<GoogleIdTokenClaims>(id_token, &decoding_key, &validation)
            .map_err(|e| AppError::UpstreamAuth(format!("ID token validation failed: {}", e)))?;

        let claims = token_data.claims;

        if claims.aud != self.client_id {
            return Err(AppError::TokenMismatch(
                "ID token was issued to a different client".into(),
            ));
        }

        // Ensure email is present and verified
        let email = claims
            .email
            .ok_or_else(|| AppError::UpstreamAuth("ID token missing email claim".into()))?;
        if claims.email_verified != Some(true) {
            return Err(AppError::UpstreamAuth("Email not verified".into()));
        }

        Ok(GoogleClaims {
            sub: claims.sub,
            email,
            name: claims.name,
            picture: claims.picture,
        })
    }

    async fn get_decoding_key(&self, kid: &str) -> AppResult<DecodingKey> {
        // Check cache first
        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.fetched_at.elapsed().as_secs() < JWKS_CACHE_TTL_SECS {
                    if let Some(key) = cached.keys.get(kid) {
                        return Self::jwk_to_decoding_key(key);
                    }
                }
            }
        }

        // Fetch fresh JWKS
        let response = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| AppError::ProviderUnavailable(format!("Failed to fetch JWKS: {}", e)))?;

        let jwks: JwksResponse = response.json().await.map_err(|e| {
            AppError::ProviderUnavailable(format!("Failed to parse JWKS: {}", e))
        })?;

        let mut keys = HashMap::new();
        for key in jwks.keys {
            keys.insert(key.kid.clone(), key);
        }

        let decoding_key = keys
            .get(kid)
            .ok_or_else(|| AppError::UpstreamAuth(format!("Key with kid '{}' not found in JWKS", kid)))
            .and_then(Self::jwk_to_decoding_key)?;

        // Update cache
        {
            let mut cache = self.cache.write().await;
            *cache = Some(JwksCache {
                keys,
                fetched_at: std::time::Instant::now(),
            });
        }

        Ok(decoding_key)
    }

    fn jwk_to_decoding_key(key: &JwkKey) -> AppResult<DecodingKey> {
        if key.kty != "RSA" {
            return Err(AppError::UpstreamAuth(format!(
                "Unsupported key type: {}",
                key.kty
            )));
        }
        DecodingKey::from_rsa_components(&key.n, &key.e)
            .map_err(|e| AppError::UpstreamAuth(format!("Failed to create decoding key: {}", e)))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
}

/// v1 tokeninfo reports `issued_to`/`user_id`; newer endpoints use `aud`/`sub`.
#[derive(Deserialize)]
struct TokenInfo {
    #[serde(default)]
    issued_to: Option<String>,
    #[serde(default)]
    aud: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct UserInfo {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Google sign-in: one-time authorization code from the JavaScript client
pub struct GoogleProvider {
    http_client: Client,
    secrets: GoogleSecrets,
    endpoints: ProviderEndpoints,
    verifier: GoogleTokenVerifier,
}

impl GoogleProvider {
    pub fn new(http_client: Client, secrets: GoogleSecrets, endpoints: ProviderEndpoints) -> Self {
        let verifier = GoogleTokenVerifier::new(
            http_client.clone(),
            secrets.client_id.clone(),
            endpoints.google_jwks_url.clone(),
        );
        Self {
            http_client,
            secrets,
            endpoints,
            verifier,
        }
    }

    async fn exchange_code(&self, code: &str) -> AppResult<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("client_id", self.secrets.client_id.as_str()),
            ("client_secret", self.secrets.client_secret.as_str()),
            ("code", code),
            ("redirect_uri", POSTMESSAGE_REDIRECT),
        ];

        let response = self
            .http_client
            .post(&self.endpoints.google_token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| provider_error("Google token request failed", e))?;

        provider_json("Failed to upgrade the authorization code", response).await
    }

    /// Confirms the access token belongs to our client and returns its subject.
    async fn check_access_token(&self, access_token: &str) -> AppResult<String> {
        let response = self
            .http_client
            .get(&self.endpoints.google_tokeninfo_url)
            .query(&[("access_token", access_token)])
            .send()
            .await
            .map_err(|e| provider_error("Google tokeninfo request failed", e))?;

        let info: TokenInfo = provider_json("Google tokeninfo", response).await?;
        if let Some(error) = info.error {
            return Err(AppError::UpstreamAuth(format!("Google tokeninfo: {}", error)));
        }

        let audience = info.issued_to.or(info.aud);
        if audience.as_deref() != Some(self.secrets.client_id.as_str()) {
            return Err(AppError::TokenMismatch(
                "Token's client ID does not match app's".into(),
            ));
        }

        info.user_id
            .or(info.sub)
            .ok_or_else(|| AppError::UpstreamAuth("Google tokeninfo has no subject".into()))
    }

    async fn fetch_user_info(&self, access_token: &str) -> AppResult<UserInfo> {
        let response = self
            .http_client
            .get(&self.endpoints.google_userinfo_url)
            .query(&[("access_token", access_token), ("alt", "json")])
            .send()
            .await
            .map_err(|e| provider_error("Google userinfo request failed", e))?;

        provider_json("Google userinfo", response).await
    }
}

#[async_trait::async_trait]
impl IdentityProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    async fn exchange(&self, code: &str) -> AppResult<ProviderIdentity> {
        let tokens = self.exchange_code(code).await?;

        let id_claims = match tokens.id_token.as_deref() {
            Some(id_token) => Some(self.verifier.verify(id_token).await?),
            None => None,
        };

        let subject = self.check_access_token(&tokens.access_token).await?;
        if let Some(claims) = &id_claims {
            if claims.sub != subject {
                return Err(AppError::TokenMismatch(
                    "Token's user ID doesn't match given user ID".into(),
                ));
            }
        }

        let info = self.fetch_user_info(&tokens.access_token).await?;

        let email = info
            .email
            .or_else(|| id_claims.as_ref().map(|c| c.email.clone()))
            .ok_or_else(|| AppError::UpstreamAuth("Google account has no email".into()))?;
        let name = info
            .name
            .or_else(|| id_claims.as_ref().and_then(|c| c.name.clone()))
            .unwrap_or_else(|| email.clone());
        let picture = info
            .picture
            .or_else(|| id_claims.as_ref().and_then(|c| c.picture.clone()));

        Ok(ProviderIdentity {
            provider: ProviderKind::Google,
            subject,
            access_token: tokens.access_token,
            name,
            email,
            picture,
        })
    }

    async fn revoke(&self, _subject: &str, access_token: &str) -> AppResult<()> {
        let response = self
            .http_client
            .get(&self.endpoints.google_revoke_url)
            .query(&[("token", access_token)])
            .send()
            .await
            .map_err(|e| provider_error("Google revoke request failed", e))?;

        if !response.status().is_success() {
            return Err(AppError::UpstreamAuth(format!(
                "Failed to revoke token: status={}",
                response.status()
            )));
        }
        Ok(())
    }
}
