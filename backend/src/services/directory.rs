//! Identity directory boundary.
//!
//! Credential verification is the job of an external user directory; the
//! session core only ever sees an already-verified identity. The trait
//! keeps that boundary explicit and swappable in tests; the default
//! implementation reads the local profile mirror.

use async_trait::async_trait;

use crate::db::connection::DbPool;
use crate::models::user::{User, UserRole};
use crate::repositories::user as user_repo;
use crate::types::UserId;
use crate::utils::password::verify_password;

/// The subject attributes the session layer needs after verification.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub role: UserRole,
}

impl From<User> for VerifiedIdentity {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
        }
    }
}

#[async_trait]
pub trait IdentityDirectory: Send + Sync {
    /// Returns the verified identity, or `None` when the credentials do
    /// not match a known user.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Option<VerifiedIdentity>>;

    async fn find_identity(&self, user_id: UserId) -> anyhow::Result<Option<VerifiedIdentity>>;
}

pub struct PgIdentityDirectory {
    pool: DbPool,
}

impl PgIdentityDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityDirectory for PgIdentityDirectory {
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> anyhow::Result<Option<VerifiedIdentity>> {
        let Some(user) = user_repo::find_user_by_email(&self.pool, email).await? else {
            return Ok(None);
        };
        if !verify_password(password, &user.password_hash)? {
            return Ok(None);
        }
        Ok(Some(user.into()))
    }

    async fn find_identity(&self, user_id: UserId) -> anyhow::Result<Option<VerifiedIdentity>> {
        let user = user_repo::find_user_by_id(&self.pool, user_id).await?;
        Ok(user.map(Into::into))
    }
}
