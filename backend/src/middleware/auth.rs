//! Request authentication: bearer access token -> verified claims ->
//! live session. Rejections carry the normalized machine codes so clients
//! can react to "replaced by a newer login" differently from "log in
//! again".

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::error::AppError;
use crate::models::session::Session;
use crate::models::user::UserRole;
use crate::state::AppState;
use crate::utils::jwt::{verify_access_token, AccessClaims};

pub async fn auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (claims, session) = authenticate_request(&state, request.headers()).await?;
    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

/// Auth + admin role for privileged session-management routes. The role
/// check is delegated to the identity directory, not to token claims.
pub async fn auth_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let (claims, session) = authenticate_request(&state, request.headers()).await?;

    let identity = state
        .directory
        .find_identity(session.user_id)
        .await
        .map_err(AppError::InternalServerError)?
        .ok_or_else(|| AppError::Unauthorized("Unknown subject".to_string()))?;
    if identity.role != UserRole::Admin {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    request.extensions_mut().insert(claims);
    request.extensions_mut().insert(session);
    Ok(next.run(request).await)
}

async fn authenticate_request(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<(AccessClaims, Session), AppError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(parse_bearer_token)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

    let claims = verify_access_token(token, &state.config.jwt_secret)
        .map_err(|err| AppError::Session(err.into()))?;

    let session = state.sessions.validate_session(&claims.sid).await?;
    state.sessions.touch_session(&session.id).await;

    Ok((claims, session))
}

fn parse_bearer_token(header: &str) -> Option<&str> {
    let (scheme, rest) = header.split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        let token = rest.trim_start();
        (!token.is_empty()).then_some(token)
    } else {
        None
    }
}
