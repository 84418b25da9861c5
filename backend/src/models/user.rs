//! Models for user profiles, authentication payloads, and role metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use crate::types::UserId;

/// Local mirror of a directory user profile. Account management lives in
/// the external identity provider; this row carries what the backend needs
/// for credential checks and session-policy resolution.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: UserRole,
    /// Per-user session policy override; `None` means the role default.
    pub session_policy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Supported user roles stored in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type, Default)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
pub enum UserRole {
    /// End user of the advisory chat.
    #[default]
    Client,
    /// Financial advisor answering client conversations.
    Advisor,
    /// Administrator with session-management privileges.
    Admin,
}

impl UserRole {
    /// Returns the canonical snake_case representation of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Client => "client",
            UserRole::Advisor => "advisor",
            UserRole::Admin => "admin",
        }
    }
}

impl Serialize for UserRole {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for UserRole {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            // primary canonical values (snake_case)
            "client" => Ok(UserRole::Client),
            "advisor" => Ok(UserRole::Advisor),
            "admin" => Ok(UserRole::Admin),
            // tolerate common legacy casings
            "Client" | "CLIENT" => Ok(UserRole::Client),
            "Advisor" | "ADVISOR" => Ok(UserRole::Advisor),
            "Admin" | "ADMIN" => Ok(UserRole::Admin),
            other => Err(serde::de::Error::unknown_variant(
                other,
                &["client", "advisor", "admin"],
            )),
        }
    }
}

/// Credentials submitted by a user attempting to authenticate.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// Public view of the authenticated user returned alongside tokens.
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub role: String,
}

/// Body returned on successful login. The refresh token is delivered only
/// as an HttpOnly cookie and never appears here.
#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub session_id: String,
    pub device_id: String,
    pub device_label: String,
    pub user: UserResponse,
}

/// Body returned on successful refresh.
#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub session_id: String,
    pub device_id: String,
}
