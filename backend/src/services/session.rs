//! Session orchestration: creation, refresh-token rotation, reuse
//! containment, revocation, validation, and the expiry sweep.
//!
//! Every mutation of session rows funnels through this manager, and the
//! cross-row invariants (one active session per subject under the single
//! policy, append-only rotation chains) rest on the store's transactions,
//! not on in-process locking — the service may run as several instances.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::Config;
use crate::db::connection::DbPool;
use crate::models::session::{RevocationReason, Session, SessionStatus};
use crate::models::user::UserRole;
use crate::repositories::session as session_repo;
use crate::repositories::session::NewSession;
use crate::services::policy;
use crate::types::UserId;
use crate::utils::device::{self, RequestMeta};
use crate::utils::jwt::{self, TokenError};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("token is invalid")]
    InvalidToken,
    #[error("token has expired")]
    ExpiredToken,
    #[error("session not found")]
    NotFound,
    #[error("session has been revoked")]
    Revoked {
        reason: Option<RevocationReason>,
        replaced_by: Option<String>,
        revoked_at: Option<DateTime<Utc>>,
    },
    #[error("session has been superseded by a newer token")]
    Rotated,
    #[error("session is not active")]
    Invalid { reason: &'static str },
    #[error("failed to issue tokens")]
    Issuance(anyhow::Error),
    #[error("session storage unavailable")]
    Storage(#[from] sqlx::Error),
}

impl SessionError {
    /// Stable machine-readable code surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::InvalidToken => "INVALID_TOKEN",
            SessionError::ExpiredToken => "TOKEN_EXPIRED",
            SessionError::NotFound => "SESSION_NOT_FOUND",
            SessionError::Revoked { .. } => "SESSION_REVOKED",
            SessionError::Rotated => "SESSION_ROTATED",
            SessionError::Invalid { .. } => "SESSION_INVALID",
            SessionError::Issuance(_) => "TOKEN_ISSUANCE_FAILED",
            SessionError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Client-side diagnostics attached to the error body.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            SessionError::Revoked {
                reason,
                replaced_by,
                revoked_at,
            } => Some(serde_json::json!({
                "reason": reason.map(|r| r.as_str()),
                "replaced_by": replaced_by,
                "revoked_at": revoked_at,
            })),
            SessionError::Invalid { reason } => {
                Some(serde_json::json!({ "reason": reason }))
            }
            _ => None,
        }
    }
}

impl From<TokenError> for SessionError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => SessionError::ExpiredToken,
            TokenError::Invalid | TokenError::Malformed => SessionError::InvalidToken,
        }
    }
}

/// Result of a successful login. The refresh token is handed to the
/// transport layer for cookie delivery and deliberately not serializable.
#[derive(Debug)]
pub struct IssuedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub device_id: String,
    pub device_label: String,
}

/// Result of a successful rotation.
#[derive(Debug)]
pub struct RefreshedSession {
    pub access_token: String,
    pub refresh_token: String,
    pub session_id: String,
    pub device_id: String,
    pub device_label: String,
}

/// Session counts grouped by status.
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct SessionStats {
    pub active: i64,
    pub rotated: i64,
    pub revoked: i64,
    pub logged_out: i64,
    pub total: i64,
}

pub struct SessionManager {
    pool: DbPool,
    config: Config,
}

impl SessionManager {
    pub fn new(pool: DbPool, config: Config) -> Self {
        Self { pool, config }
    }

    /// Creates a session for a verified subject and mints its token pair.
    ///
    /// The active-session read, the insert, and the policy revocations are
    /// one transaction serialized per subject, so no reader can observe a
    /// policy violation between them.
    pub async fn create_session(
        &self,
        user_id: UserId,
        email: &str,
        meta: &RequestMeta,
        role: &UserRole,
    ) -> Result<IssuedSession, SessionError> {
        let device_id = device::fingerprint(&meta.remote_addr, &meta.user_agent);
        let device_label = device::device_label(&meta.user_agent);
        let session_id = Uuid::new_v4().to_string();

        let session_policy = policy::resolve_policy(&self.pool, user_id, role).await;

        let mut tx = self.pool.begin().await?;
        session_repo::lock_subject(&mut tx, user_id).await?;
        let others = session_repo::active_sessions_for_user(&mut tx, user_id).await?;
        let session = session_repo::insert_session(
            &mut tx,
            &NewSession {
                id: &session_id,
                user_id,
                email,
                device_id: &device_id,
                device_label,
                rotated_from: None,
            },
        )
        .await?;

        if let Some(max_active) = session_policy.max_active() {
            // `others` excludes the fresh insert; count it back in and
            // displace however many oldest sessions the bound requires.
            let excess = (others.len() as i64 + 1 - max_active).max(0) as usize;
            if excess > 0 {
                let victims: Vec<String> =
                    others.iter().take(excess).map(|s| s.id.clone()).collect();
                let revoked = session_repo::revoke_sessions_by_id(
                    &mut tx,
                    &victims,
                    RevocationReason::Replaced,
                    Some(&session.id),
                )
                .await?;
                tracing::info!(
                    %user_id,
                    policy = session_policy.as_str(),
                    revoked,
                    new_session = %session.id,
                    "revoked sessions displaced by new login"
                );
            }
        }
        tx.commit().await?;

        let access_token = jwt::issue_access_token(
            user_id,
            email,
            &session.id,
            &self.config.jwt_secret,
            self.config.access_token_ttl_minutes,
        )
        .map_err(SessionError::Issuance)?;
        let refresh_token = jwt::issue_refresh_token(
            user_id,
            email,
            &session.id,
            &device_id,
            &self.config.jwt_secret,
            self.config.refresh_token_ttl_days,
        )
        .map_err(SessionError::Issuance)?;

        Ok(IssuedSession {
            access_token,
            refresh_token,
            session_id: session.id,
            device_id,
            device_label: device_label.to_string(),
        })
    }

    /// Exchanges a refresh token for a new token pair, rotating the chain.
    ///
    /// Presenting a token whose session is unknown or no longer active is
    /// treated as reuse: the whole device family is revoked (best effort)
    /// before the rejection is returned.
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        meta: &RequestMeta,
    ) -> Result<RefreshedSession, SessionError> {
        let claims = jwt::verify_refresh_token(refresh_token, &self.config.jwt_secret)?;

        let Some(session) = session_repo::find_session_by_id(&self.pool, &claims.sid).await? else {
            // Well-signed but pointing at nothing: the record was already
            // consumed and purged, or the id came from a compromised
            // signing path. Either way the family is burned.
            self.contain_reuse(&claims.did).await;
            return Err(SessionError::NotFound);
        };
        if !session.is_active() {
            self.contain_reuse(&session.device_id).await;
            return Err(Self::rejection_for(&session));
        }

        let successor_id = Uuid::new_v4().to_string();
        let device_label = device::device_label(&meta.user_agent);

        let mut tx = self.pool.begin().await?;
        let rotated = session_repo::mark_rotated_if_active(&mut tx, &session.id).await?;
        if !rotated {
            // Lost the compare-and-set to a concurrent refresh of the same
            // token: the legitimate-client-vs-thief race. The loser path is
            // the reuse path.
            tx.rollback().await.ok();
            self.contain_reuse(&session.device_id).await;
            let current = session_repo::find_session_by_id(&self.pool, &session.id).await?;
            return Err(current
                .as_ref()
                .map(Self::rejection_for)
                .unwrap_or(SessionError::NotFound));
        }
        let successor = session_repo::insert_session(
            &mut tx,
            &NewSession {
                id: &successor_id,
                user_id: session.user_id,
                email: &session.email,
                // The family is defined by the token chain, not by the
                // caller's current address; only the label is refreshed.
                device_id: &session.device_id,
                device_label,
                rotated_from: Some(&session.id),
            },
        )
        .await?;
        tx.commit().await?;

        let access_token = jwt::issue_access_token(
            session.user_id,
            &session.email,
            &successor.id,
            &self.config.jwt_secret,
            self.config.access_token_ttl_minutes,
        )
        .map_err(SessionError::Issuance)?;
        let refresh_token = jwt::issue_refresh_token(
            session.user_id,
            &session.email,
            &successor.id,
            &session.device_id,
            &self.config.jwt_secret,
            self.config.refresh_token_ttl_days,
        )
        .map_err(SessionError::Issuance)?;

        Ok(RefreshedSession {
            access_token,
            refresh_token,
            session_id: successor.id,
            device_id: successor.device_id,
            device_label: successor.device_label,
        })
    }

    /// Pure read used by the request-authentication path: maps the stored
    /// status to a normalized verdict.
    pub async fn validate_session(&self, session_id: &str) -> Result<Session, SessionError> {
        let Some(session) = session_repo::find_session_by_id(&self.pool, session_id).await? else {
            return Err(SessionError::NotFound);
        };
        if session.is_active() {
            Ok(session)
        } else {
            Err(Self::rejection_for(&session))
        }
    }

    /// Raw point lookup without a status verdict.
    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>, SessionError> {
        Ok(session_repo::find_session_by_id(&self.pool, session_id).await?)
    }

    /// Last-used bookkeeping; failures are logged, never surfaced.
    pub async fn touch_session(&self, session_id: &str) {
        if let Err(err) = session_repo::touch_session(&self.pool, session_id, Utc::now()).await {
            tracing::debug!(session_id, error = ?err, "failed to update session last_used_at");
        }
    }

    pub async fn list_user_sessions(&self, user_id: UserId) -> Result<Vec<Session>, SessionError> {
        Ok(session_repo::list_sessions_for_user(&self.pool, user_id).await?)
    }

    pub async fn list_device_sessions(
        &self,
        device_id: &str,
    ) -> Result<Vec<Session>, SessionError> {
        Ok(session_repo::list_sessions_for_device(&self.pool, device_id).await?)
    }

    /// Revokes every session in a device family.
    pub async fn revoke_family(
        &self,
        device_id: &str,
        reason: RevocationReason,
    ) -> Result<u64, SessionError> {
        Ok(session_repo::revoke_family(&self.pool, device_id, reason).await?)
    }

    /// Administrative: revokes all of a subject's active sessions.
    pub async fn revoke_user_sessions(&self, user_id: UserId) -> Result<u64, SessionError> {
        Ok(session_repo::revoke_sessions_for_user(
            &self.pool,
            user_id,
            RevocationReason::AdminRevocation,
        )
        .await?)
    }

    /// Marks the subject's active sessions on one device as logged out.
    pub async fn logout_user(
        &self,
        user_id: UserId,
        device_id: &str,
    ) -> Result<u64, SessionError> {
        Ok(session_repo::logout_sessions(&self.pool, user_id, device_id).await?)
    }

    /// Expiry sweep: marks lapsed active sessions expired, then deletes
    /// rows older than the retention window. Returns the deleted count.
    pub async fn cleanup_expired(&self, retention: Duration) -> Result<u64, SessionError> {
        let now = Utc::now();

        let lapsed_cutoff = now - Duration::days(self.config.refresh_token_ttl_days);
        let expired = session_repo::mark_expired_created_before(&self.pool, lapsed_cutoff).await?;
        if expired > 0 {
            tracing::info!(expired, "marked lapsed sessions as expired");
        }

        let deleted =
            session_repo::delete_sessions_created_before(&self.pool, now - retention).await?;
        Ok(deleted)
    }

    pub async fn session_stats(&self) -> Result<SessionStats, SessionError> {
        let rows = session_repo::count_sessions_by_status(&self.pool).await?;
        let mut stats = SessionStats::default();
        for (status, count) in rows {
            match status {
                SessionStatus::Active => stats.active = count,
                SessionStatus::Rotated => stats.rotated = count,
                SessionStatus::Revoked => stats.revoked = count,
                SessionStatus::LoggedOut => stats.logged_out = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    /// Best-effort family lockout after reuse detection. Its own failure is
    /// logged and must never mask the rejection being returned.
    async fn contain_reuse(&self, device_id: &str) {
        match session_repo::revoke_family(&self.pool, device_id, RevocationReason::Reuse).await {
            Ok(revoked) => tracing::warn!(
                device_id,
                revoked,
                "refresh token reuse detected, revoked device family"
            ),
            Err(err) => tracing::error!(
                device_id,
                error = ?err,
                "failed to revoke device family after reuse detection"
            ),
        }
    }

    fn rejection_for(session: &Session) -> SessionError {
        match session.status {
            SessionStatus::Rotated => SessionError::Rotated,
            SessionStatus::Revoked => SessionError::Revoked {
                reason: session.reason,
                replaced_by: session.replaced_by.clone(),
                revoked_at: session.revoked_at,
            },
            SessionStatus::LoggedOut => SessionError::Invalid {
                reason: "session_logged_out",
            },
            SessionStatus::Active => SessionError::Invalid {
                reason: "session_not_active",
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn revoked_session_error() -> SessionError {
        SessionError::Revoked {
            reason: Some(RevocationReason::Replaced),
            replaced_by: Some("next-id".into()),
            revoked_at: Some(Utc::now()),
        }
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(SessionError::InvalidToken.code(), "INVALID_TOKEN");
        assert_eq!(SessionError::ExpiredToken.code(), "TOKEN_EXPIRED");
        assert_eq!(SessionError::NotFound.code(), "SESSION_NOT_FOUND");
        assert_eq!(revoked_session_error().code(), "SESSION_REVOKED");
        assert_eq!(SessionError::Rotated.code(), "SESSION_ROTATED");
        assert_eq!(
            SessionError::Invalid {
                reason: "session_logged_out"
            }
            .code(),
            "SESSION_INVALID"
        );
    }

    #[test]
    fn revoked_details_expose_diagnostics() {
        let details = revoked_session_error().details().expect("details");
        assert_eq!(details["reason"], "replaced");
        assert_eq!(details["replaced_by"], "next-id");
        assert!(details["revoked_at"].is_string());
    }

    #[test]
    fn token_errors_map_to_session_errors() {
        assert!(matches!(
            SessionError::from(TokenError::Expired),
            SessionError::ExpiredToken
        ));
        assert!(matches!(
            SessionError::from(TokenError::Invalid),
            SessionError::InvalidToken
        ));
        assert!(matches!(
            SessionError::from(TokenError::Malformed),
            SessionError::InvalidToken
        ));
    }
}
