//! Durable session records and their lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::UserId;

/// Lifecycle state of a session. `Active` is the only entry state; the
/// other three are terminal and a row never returns to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Rotated,
    Revoked,
    LoggedOut,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Rotated => "rotated",
            SessionStatus::Revoked => "revoked",
            SessionStatus::LoggedOut => "logged_out",
        }
    }
}

/// Why a session left the `Active` state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum RevocationReason {
    /// Displaced by a newer login under the subject's session policy.
    Replaced,
    /// Refresh-token reuse detected in this device family.
    Reuse,
    Logout,
    /// Refresh lifetime lapsed before the cleanup sweep found the row.
    Expired,
    AdminRevocation,
    FamilyRevocation,
}

impl RevocationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevocationReason::Replaced => "replaced",
            RevocationReason::Reuse => "reuse",
            RevocationReason::Logout => "logout",
            RevocationReason::Expired => "expired",
            RevocationReason::AdminRevocation => "admin_revocation",
            RevocationReason::FamilyRevocation => "family_revocation",
        }
    }
}

/// Database representation of one refresh-token lineage member.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    /// Opaque unique token identifier ("jti"); never reused.
    pub id: String,
    pub user_id: UserId,
    /// Denormalized for audit output.
    pub email: String,
    /// Hash grouping sessions issued to the same client ("token family").
    pub device_id: String,
    /// Coarse display label (browser/OS family), non-identifying.
    pub device_label: String,
    pub status: SessionStatus,
    pub reason: Option<RevocationReason>,
    /// Id of the session that displaced this one, when `reason = replaced`.
    pub replaced_by: Option<String>,
    /// Predecessor in the rotation chain within one device family.
    pub rotated_from: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub logged_out_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
