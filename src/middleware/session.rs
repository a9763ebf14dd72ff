use std::sync::Arc;

use axum::extract::FromRequestParts;
use chrono::Utc;
use http::header::{COOKIE, SET_COOKIE};
use http::request::Parts;
use http::{HeaderName, HeaderValue};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::SessionContext;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "catalog_session";

/// Session cookie lifetime, also the server-side record lifetime
pub const SESSION_TTL_DAYS: i64 = 7;

/// Claims carried by the session cookie. Everything else lives server-side.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sid: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct SessionKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SessionKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn sign(&self, sid: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = SessionClaims {
            sid: sid.to_string(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::days(SESSION_TTL_DAYS)).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("JWT error: {}", e)))
    }

    /// Returns the session id of a valid, unexpired cookie.
    pub fn verify(&self, token: &str) -> Option<String> {
        decode::<SessionClaims>(token, &self.decoding, &Validation::default())
            .ok()
            .map(|data| data.claims.sid)
    }
}

fn session_cookie(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

/// The caller's login state, loaded from the session cookie. A request without
/// a valid cookie gets a fresh anonymous session.
#[derive(Debug)]
pub struct Session {
    pub id: String,
    pub ctx: SessionContext,
    pub fresh: bool,
}

impl Session {
    /// The logged-in user, or `Unauthenticated`
    pub fn user_id(&self) -> AppResult<i64> {
        self.ctx.user_id.ok_or(AppError::Unauthenticated)
    }

    /// Drops the stored record and moves the context to a new id, so a cookie
    /// issued before a login or logout no longer names this session.
    pub async fn rotate(&mut self, state: &AppState) -> AppResult<()> {
        if !self.fresh {
            state.sessions.delete(&self.id).await?;
        }
        self.id = uuid::Uuid::new_v4().to_string();
        self.fresh = false;
        Ok(())
    }

    /// Persists the context and returns the cookie header to send back.
    pub async fn commit(&self, state: &AppState) -> AppResult<[(HeaderName, HeaderValue); 1]> {
        state.sessions.save(&self.id, &self.ctx).await?;

        let token = state.session_keys.sign(&self.id)?;
        let cookie = format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE,
            token,
            SESSION_TTL_DAYS * 24 * 60 * 60
        );
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| AppError::Internal(format!("Invalid cookie header: {}", e)))?;
        Ok([(SET_COOKIE, value)])
    }
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for Session {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(id) = session_cookie(parts).and_then(|token| state.session_keys.verify(token)) {
            if let Some(ctx) = state.sessions.load(&id).await? {
                return Ok(Session {
                    id,
                    ctx,
                    fresh: false,
                });
            }
        }

        Ok(Session {
            id: uuid::Uuid::new_v4().to_string(),
            ctx: SessionContext::default(),
            fresh: true,
        })
    }
}
