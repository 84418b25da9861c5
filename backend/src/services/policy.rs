//! Concurrent-session policy resolution.
//!
//! Resolution order: per-user override from the profile, then the role
//! default table. Any lookup failure resolves to `Single` — the resolver
//! never fails open toward `Unlimited`.

use sqlx::PgPool;

use crate::models::user::UserRole;
use crate::repositories::user as user_repo;
use crate::types::UserId;

/// Maximum number of concurrently active sessions permitted for a subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    Single,
    BoundedTwo,
    Unlimited,
}

impl SessionPolicy {
    pub fn max_active(&self) -> Option<i64> {
        match self {
            SessionPolicy::Single => Some(1),
            SessionPolicy::BoundedTwo => Some(2),
            SessionPolicy::Unlimited => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPolicy::Single => "single",
            SessionPolicy::BoundedTwo => "bounded_two",
            SessionPolicy::Unlimited => "unlimited",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" => Some(SessionPolicy::Single),
            "bounded_two" | "bounded-two" | "two" => Some(SessionPolicy::BoundedTwo),
            "unlimited" => Some(SessionPolicy::Unlimited),
            _ => None,
        }
    }
}

/// Role defaults. Every built-in role maps to the most restrictive policy;
/// looser policies are granted per user via the profile override only.
pub fn default_policy_for_role(role: &UserRole) -> SessionPolicy {
    match role {
        UserRole::Client | UserRole::Advisor | UserRole::Admin => SessionPolicy::Single,
    }
}

pub async fn resolve_policy(pool: &PgPool, user_id: UserId, role: &UserRole) -> SessionPolicy {
    match user_repo::find_session_policy_override(pool, user_id).await {
        Ok(Some(raw)) => match SessionPolicy::parse(&raw) {
            Some(policy) => policy,
            None => {
                tracing::warn!(
                    %user_id,
                    value = %raw,
                    "unparseable session policy override, falling back to single"
                );
                SessionPolicy::Single
            }
        },
        Ok(None) => default_policy_for_role(role),
        Err(err) => {
            tracing::warn!(
                %user_id,
                error = ?err,
                "session policy lookup failed, falling back to single"
            );
            SessionPolicy::Single
        }
    }
}
