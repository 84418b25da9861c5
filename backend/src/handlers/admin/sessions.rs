//! Privileged session-management surface: list by subject or device
//! family, bulk revocation, statistics, and on-demand cleanup.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use utoipa::ToSchema;

use crate::error::AppError;
use crate::models::session::{RevocationReason, Session};
use crate::services::session::SessionStats;
use crate::state::AppState;
use crate::types::UserId;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminSessionResponse {
    pub id: String,
    pub user_id: String,
    pub email: String,
    pub device_id: String,
    pub device_label: String,
    pub status: String,
    pub reason: Option<String>,
    pub replaced_by: Option<String>,
    pub rotated_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl From<Session> for AdminSessionResponse {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            user_id: session.user_id.to_string(),
            email: session.email,
            device_id: session.device_id,
            device_label: session.device_label,
            status: session.status.as_str().to_string(),
            reason: session.reason.map(|r| r.as_str().to_string()),
            replaced_by: session.replaced_by,
            rotated_from: session.rotated_from,
            created_at: session.created_at,
            last_used_at: session.last_used_at,
            revoked_at: session.revoked_at,
        }
    }
}

fn parse_user_id(raw: &str) -> Result<UserId, AppError> {
    UserId::from_str(raw).map_err(|_| AppError::BadRequest("Invalid user ID".into()))
}

pub async fn list_user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<AdminSessionResponse>>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let sessions = state.sessions.list_user_sessions(user_id).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

pub async fn list_device_sessions(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Vec<AdminSessionResponse>>, AppError> {
    if device_id.trim().is_empty() {
        return Err(AppError::BadRequest("Device ID is required".into()));
    }
    let sessions = state.sessions.list_device_sessions(&device_id).await?;
    Ok(Json(sessions.into_iter().map(Into::into).collect()))
}

/// Revokes all of a subject's active sessions.
pub async fn revoke_user_sessions(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let user_id = parse_user_id(&user_id)?;
    let revoked = state.sessions.revoke_user_sessions(user_id).await?;

    tracing::info!(%user_id, revoked, "admin revoked subject sessions");

    Ok(Json(json!({
        "message": "Sessions revoked",
        "user_id": user_id.to_string(),
        "revoked": revoked
    })))
}

/// Revokes an entire device family regardless of status.
pub async fn revoke_device_sessions(
    State(state): State<AppState>,
    Path(device_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    if device_id.trim().is_empty() {
        return Err(AppError::BadRequest("Device ID is required".into()));
    }
    let revoked = state
        .sessions
        .revoke_family(&device_id, RevocationReason::FamilyRevocation)
        .await?;

    tracing::info!(device_id = %device_id, revoked, "admin revoked device family");

    Ok(Json(json!({
        "message": "Device family revoked",
        "device_id": device_id,
        "revoked": revoked
    })))
}

pub async fn session_stats(
    State(state): State<AppState>,
) -> Result<Json<SessionStats>, AppError> {
    let stats = state.sessions.session_stats().await?;
    Ok(Json(stats))
}

/// Runs the expiry sweep immediately. Reports when a sweep was already in
/// flight instead of queueing another.
pub async fn force_cleanup(State(state): State<AppState>) -> Result<Json<Value>, AppError> {
    match state.cleanup.run_once().await? {
        Some(deleted) => Ok(Json(json!({
            "message": "Cleanup complete",
            "deleted": deleted
        }))),
        None => Ok(Json(json!({
            "message": "A cleanup sweep is already in flight",
            "deleted": Value::Null
        }))),
    }
}
