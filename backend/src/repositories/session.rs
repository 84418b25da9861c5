//! SQL access to the `sessions` table.
//!
//! All mutation of session rows goes through this module (driven by the
//! session manager), so the transactional guarantees live in one place.
//! Functions taking `&mut PgConnection` participate in a caller-owned
//! transaction; functions taking `&PgPool` are single-statement and rely
//! on statement atomicity.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use crate::models::session::{RevocationReason, Session, SessionStatus};
use crate::types::UserId;

const SESSION_COLUMNS: &str = "id, user_id, email, device_id, device_label, status, reason, \
     replaced_by, rotated_from, created_at, last_used_at, revoked_at, rotated_at, logged_out_at";

pub struct NewSession<'a> {
    pub id: &'a str,
    pub user_id: UserId,
    pub email: &'a str,
    pub device_id: &'a str,
    pub device_label: &'a str,
    pub rotated_from: Option<&'a str>,
}

/// Serializes session creation per subject for the rest of the enclosing
/// transaction. Two concurrent logins for the same subject queue behind
/// this lock, so neither can miss the other's freshly inserted row.
pub async fn lock_subject(conn: &mut PgConnection, user_id: UserId) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1), 0)")
        .bind(user_id.to_string())
        .execute(conn)
        .await
        .map(|_| ())
}

/// Reads the subject's active sessions, oldest first, locking the rows for
/// the enclosing transaction.
pub async fn active_sessions_for_user(
    conn: &mut PgConnection,
    user_id: UserId,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions \
         WHERE user_id = $1 AND status = 'active' \
         ORDER BY created_at ASC, id ASC \
         FOR UPDATE"
    ))
    .bind(user_id)
    .fetch_all(conn)
    .await
}

pub async fn insert_session(
    conn: &mut PgConnection,
    new: &NewSession<'_>,
) -> Result<Session, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "INSERT INTO sessions (id, user_id, email, device_id, device_label, status, rotated_from) \
         VALUES ($1, $2, $3, $4, $5, 'active', $6) \
         RETURNING {SESSION_COLUMNS}"
    ))
    .bind(new.id)
    .bind(new.user_id)
    .bind(new.email)
    .bind(new.device_id)
    .bind(new.device_label)
    .bind(new.rotated_from)
    .fetch_one(conn)
    .await
}

/// Marks the given sessions revoked in one statement, recording which
/// session displaced them.
pub async fn revoke_sessions_by_id(
    conn: &mut PgConnection,
    ids: &[String],
    reason: RevocationReason,
    replaced_by: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET status = 'revoked', reason = $2, replaced_by = $3, revoked_at = NOW() \
         WHERE id = ANY($1)",
    )
    .bind(ids)
    .bind(reason.as_str())
    .bind(replaced_by)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Compare-and-set transition `active -> rotated`. Returns false when the
/// session was no longer active at write time (a concurrent refresh won).
pub async fn mark_rotated_if_active(
    conn: &mut PgConnection,
    session_id: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions SET status = 'rotated', rotated_at = NOW() \
         WHERE id = $1 AND status = 'active'",
    )
    .bind(session_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn find_session_by_id(
    pool: &PgPool,
    session_id: &str,
) -> Result<Option<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
    ))
    .bind(session_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_sessions_for_user(
    pool: &PgPool,
    user_id: UserId,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions \
         WHERE user_id = $1 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn list_sessions_for_device(
    pool: &PgPool,
    device_id: &str,
) -> Result<Vec<Session>, sqlx::Error> {
    sqlx::query_as::<_, Session>(&format!(
        "SELECT {SESSION_COLUMNS} FROM sessions \
         WHERE device_id = $1 \
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(device_id)
    .fetch_all(pool)
    .await
}

/// Revokes every session in a device family regardless of current status.
/// A single UPDATE, so the batch is atomic.
pub async fn revoke_family(
    pool: &PgPool,
    device_id: &str,
    reason: RevocationReason,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET status = 'revoked', reason = $2, revoked_at = NOW() \
         WHERE device_id = $1 AND status != 'revoked'",
    )
    .bind(device_id)
    .bind(reason.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Revokes a subject's active sessions (administrative bulk action).
pub async fn revoke_sessions_for_user(
    pool: &PgPool,
    user_id: UserId,
    reason: RevocationReason,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET status = 'revoked', reason = $2, revoked_at = NOW() \
         WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id)
    .bind(reason.as_str())
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Marks the subject's active sessions on one device as logged out.
pub async fn logout_sessions(
    pool: &PgPool,
    user_id: UserId,
    device_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET status = 'logged_out', reason = 'logout', logged_out_at = NOW() \
         WHERE user_id = $1 AND device_id = $2 AND status = 'active'",
    )
    .bind(user_id)
    .bind(device_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn touch_session(
    pool: &PgPool,
    session_id: &str,
    last_used_at: DateTime<Utc>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE sessions SET last_used_at = $1 WHERE id = $2")
        .bind(last_used_at)
        .bind(session_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Marks active sessions created before the cutoff as expired. Keeps
/// validation answers accurate for rows still inside the retention window.
pub async fn mark_expired_created_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE sessions \
         SET status = 'revoked', reason = 'expired', revoked_at = NOW() \
         WHERE status = 'active' AND created_at < $1",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Hard-deletes rows older than the cutoff, irrespective of status. The
/// only path that physically removes session rows.
pub async fn delete_sessions_created_before(
    pool: &PgPool,
    cutoff: DateTime<Utc>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM sessions WHERE created_at < $1")
        .bind(cutoff)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_sessions_by_status(
    pool: &PgPool,
) -> Result<Vec<(SessionStatus, i64)>, sqlx::Error> {
    sqlx::query_as::<_, (SessionStatus, i64)>(
        "SELECT status, COUNT(*) FROM sessions GROUP BY status",
    )
    .fetch_all(pool)
    .await
}
