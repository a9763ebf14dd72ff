use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::middleware::Session;
use crate::models::ProviderKind;
use crate::services::oauth_service::{ConnectOutcome, DisconnectOutcome};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectQuery {
    pub state: Option<String>,
}

/// GET `/` and `/login`: issues the anti-forgery state token
pub async fn login(
    State(state): State<Arc<AppState>>,
    mut session: Session,
) -> AppResult<impl IntoResponse> {
    let token = state.oauth.begin(&mut session.ctx)?;
    let cookie = session.commit(&state).await?;

    let user = match session.ctx.user_id {
        Some(id) if session.ctx.is_connected() => state.users.get_user(id).await?,
        _ => None,
    };

    let body = json!({
        "state": token,
        "google_client_id": state.config.google.as_ref().map(|g| g.client_id.clone()),
        "facebook_app_id": state.config.facebook.as_ref().map(|f| f.app_id.clone()),
        "user": user,
    });
    Ok((cookie, Json(body)))
}

async fn connect(
    state: &AppState,
    mut session: Session,
    kind: ProviderKind,
    echoed_state: Option<&str>,
    credential: &str,
) -> AppResult<Response> {
    let outcome = state
        .oauth
        .connect(&mut session.ctx, kind, echoed_state, credential)
        .await?;

    let body = match outcome {
        ConnectOutcome::Connected { user_id, username } => json!({
            "status": "connected",
            "user_id": user_id,
            "username": username,
            "picture": session.ctx.picture,
            "provider": kind,
        }),
        ConnectOutcome::AlreadyConnected { username } => {
            return Ok(Json(json!({
                "status": "already_connected",
                "username": username,
            }))
            .into_response());
        }
    };

    session.rotate(state).await?;
    let cookie = session.commit(state).await?;
    Ok((cookie, Json(body)).into_response())
}

/// POST `/gconnect?state=`: body is the one-time Google authorization code
pub async fn gconnect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    session: Session,
    code: String,
) -> AppResult<Response> {
    connect(&state, session, ProviderKind::Google, query.state.as_deref(), &code).await
}

/// POST `/fbconnect?state=`: body is the short-lived Facebook token
pub async fn fbconnect(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    session: Session,
    token: String,
) -> AppResult<Response> {
    connect(&state, session, ProviderKind::Facebook, query.state.as_deref(), &token).await
}

/// GET `/disconnect`. The session is cleared even when the revoke fails.
pub async fn disconnect(
    State(state): State<Arc<AppState>>,
    mut session: Session,
) -> AppResult<Response> {
    let outcome = state.oauth.disconnect(&mut session.ctx).await;

    let (status, body) = match &outcome {
        DisconnectOutcome::NotConnected => (
            StatusCode::OK,
            json!({ "status": "not_connected", "message": "Current user not connected" }),
        ),
        DisconnectOutcome::Disconnected { revoked: true } => (
            StatusCode::OK,
            json!({ "status": "disconnected", "message": "Successfully disconnected" }),
        ),
        DisconnectOutcome::Disconnected { revoked: false } => (
            StatusCode::BAD_REQUEST,
            json!({
                "status": "disconnected",
                "error": "revoke_failed",
                "message": "Failed to revoke token for given user",
            }),
        ),
    };

    if session.fresh {
        return Ok((status, Json(body)).into_response());
    }
    if matches!(outcome, DisconnectOutcome::Disconnected { .. }) {
        session.rotate(&state).await?;
    }
    let cookie = session.commit(&state).await?;
    Ok((status, cookie, Json(body)).into_response())
}
