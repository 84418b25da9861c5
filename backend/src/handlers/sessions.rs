use axum::{
    extract::{Extension, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::session::Session;
use crate::state::AppState;
use crate::utils::jwt::AccessClaims;

#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub id: String,
    pub device_id: String,
    pub device_label: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub is_current: bool,
}

impl SessionResponse {
    fn from_session(session: Session, current_sid: &str) -> Self {
        let is_current = session.id == current_sid;
        Self {
            id: session.id,
            device_id: session.device_id,
            device_label: session.device_label,
            status: session.status.as_str().to_string(),
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            is_current,
        }
    }
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(claims): Extension<AccessClaims>,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    let sessions = state.sessions.list_user_sessions(session.user_id).await?;
    let responses = sessions
        .into_iter()
        .map(|s| SessionResponse::from_session(s, &claims.sid))
        .collect();
    Ok(Json(responses))
}

/// Logs out one of the caller's other sessions (its whole device family).
/// The current session has to go through logout instead.
pub async fn revoke_session(
    State(state): State<AppState>,
    Extension(session): Extension<Session>,
    Extension(claims): Extension<AccessClaims>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if session_id.trim().is_empty() {
        return Err(AppError::BadRequest("Session ID is required".into()));
    }

    let target = state
        .sessions
        .get_session(&session_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Session not found".into()))?;

    if target.user_id != session.user_id {
        return Err(AppError::Forbidden("Forbidden".into()));
    }

    if target.id == claims.sid {
        return Err(AppError::BadRequest(
            "Cannot revoke current session; use logout instead".into(),
        ));
    }

    let count = state
        .sessions
        .logout_user(target.user_id, &target.device_id)
        .await?;

    Ok(Json(json!({
        "message": "Session logged out",
        "session_id": session_id,
        "sessions": count
    })))
}
