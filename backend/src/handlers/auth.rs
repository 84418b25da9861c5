use std::time::Duration as StdDuration;

use axum::{
    extract::{Extension, State},
    http::{header, HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::error::AppError;
use crate::models::session::Session;
use crate::models::user::{LoginRequest, LoginResponse, RefreshResponse, UserResponse};
use crate::services::directory::VerifiedIdentity;
use crate::services::session::SessionError;
use crate::state::AppState;
use crate::utils::cookies::{
    build_auth_cookie, build_clear_cookie, extract_cookie_value, REFRESH_COOKIE_NAME,
    REFRESH_COOKIE_PATH,
};
use crate::utils::device::RequestMeta;
use crate::utils::jwt::AccessClaims;

impl From<VerifiedIdentity> for UserResponse {
    fn from(identity: VerifiedIdentity) -> Self {
        Self {
            id: identity.user_id.to_string(),
            email: identity.email,
            display_name: identity.display_name,
            role: identity.role.as_str().to_string(),
        }
    }
}

/// Verifies credentials against the identity directory and opens a
/// session. The refresh token travels only as an HttpOnly cookie scoped to
/// the auth routes; the access token is returned in the body for bearer
/// use.
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, AppError> {
    payload.validate()?;

    let identity = state
        .directory
        .verify_credentials(&payload.email, &payload.password)
        .await
        .map_err(AppError::InternalServerError)?
        .ok_or_else(|| AppError::Unauthorized("Invalid email or password".to_string()))?;

    let meta = RequestMeta::from_headers(&headers);
    let issued = state
        .sessions
        .create_session(identity.user_id, &identity.email, &meta, &identity.role)
        .await?;

    tracing::info!(
        user_id = %identity.user_id,
        session_id = %issued.session_id,
        device_label = %issued.device_label,
        "user logged in"
    );

    let cookie = refresh_cookie(&state, &issued.refresh_token);
    let body = Json(LoginResponse {
        access_token: issued.access_token,
        session_id: issued.session_id,
        device_id: issued.device_id,
        device_label: issued.device_label,
        user: identity.into(),
    });

    Ok(([(header::SET_COOKIE, cookie)], body).into_response())
}

/// Exchanges the cookie-borne refresh token for a new token pair. On any
/// failure the cookie is cleared so the client does not retry a burned
/// token.
pub async fn refresh(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let meta = RequestMeta::from_headers(&headers);
    let token = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .and_then(|raw| extract_cookie_value(raw, REFRESH_COOKIE_NAME));

    let result = match token {
        Some(token) => state.sessions.refresh_session(&token, &meta).await,
        None => Err(SessionError::InvalidToken),
    };

    match result {
        Ok(refreshed) => {
            let cookie = refresh_cookie(&state, &refreshed.refresh_token);
            let body = Json(RefreshResponse {
                access_token: refreshed.access_token,
                session_id: refreshed.session_id,
                device_id: refreshed.device_id,
            });
            ([(header::SET_COOKIE, cookie)], body).into_response()
        }
        Err(err) => with_cleared_refresh_cookie(&state, AppError::Session(err).into_response()),
    }
}

/// Logs out the caller's device: every active session in the family is
/// marked logged out and the refresh cookie is cleared.
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
) -> Result<Response, AppError> {
    let count = state
        .sessions
        .logout_user(session.user_id, &session.device_id)
        .await?;

    tracing::info!(
        user_id = %session.user_id,
        device_id = %session.device_id,
        sessions = count,
        "user logged out"
    );

    let response = Json(json!({ "message": "Logged out", "sessions": count })).into_response();
    Ok(with_cleared_refresh_cookie(&state, response))
}

/// Returns the caller's current session metadata.
pub async fn current_session(
    Extension(session): Extension<Session>,
    Extension(claims): Extension<AccessClaims>,
) -> Json<Value> {
    Json(json!({
        "session_id": session.id,
        "device_id": session.device_id,
        "device_label": session.device_label,
        "created_at": session.created_at,
        "last_used_at": session.last_used_at,
        "subject": claims.sub,
    }))
}

fn refresh_cookie(state: &AppState, token: &str) -> String {
    let max_age = StdDuration::from_secs(
        (state.config.refresh_token_ttl_days.max(0) as u64) * 24 * 60 * 60,
    );
    build_auth_cookie(
        REFRESH_COOKIE_NAME,
        token,
        max_age,
        REFRESH_COOKIE_PATH,
        state.config.cookie_options(),
    )
}

fn with_cleared_refresh_cookie(state: &AppState, mut response: Response) -> Response {
    let cookie = build_clear_cookie(
        REFRESH_COOKIE_NAME,
        REFRESH_COOKIE_PATH,
        state.config.cookie_options(),
    );
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    response
}
