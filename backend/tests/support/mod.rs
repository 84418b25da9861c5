#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use chrono::Utc;
use sqlx::{postgres::PgPoolOptions, PgPool};
use uuid::Uuid;

use advisory_backend::{
    config::Config,
    models::user::{User, UserRole},
    services::session::SessionManager,
    state::AppState,
    types::UserId,
    utils::{cookies::SameSite, password::hash_password},
};

pub const TEST_PASSWORD: &str = "correct-horse-battery-staple";
pub const TEST_JWT_SECRET: &str = "a_secure_test_secret_that_is_long_enough";

pub const UA_CHROME: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36";
pub const UA_FIREFOX: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:127.0) Gecko/20100101 Firefox/127.0";
pub const UA_SAFARI: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15";

/// Connects to the database named by `TEST_DATABASE_URL` and applies
/// migrations. Returns `None` when the variable is unset so tests can skip
/// in environments without a database.
pub async fn try_test_pool() -> Option<PgPool> {
    let url = match env::var("TEST_DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("TEST_DATABASE_URL not set; skipping database-backed test");
            return None;
        }
    };
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("connect test database");
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("run migrations");
    Some(pool)
}

pub fn test_config() -> Config {
    Config {
        database_url: "postgres://unused-in-tests".into(),
        bind_addr: "127.0.0.1:0".into(),
        jwt_secret: TEST_JWT_SECRET.into(),
        access_token_ttl_minutes: 15,
        refresh_token_ttl_days: 7,
        session_retention_days: 30,
        cleanup_interval_seconds: 3600,
        cookie_secure: false,
        cookie_same_site: SameSite::Lax,
        cors_allow_origins: vec!["http://localhost:5173".into()],
    }
}

pub fn manager(pool: &PgPool) -> SessionManager {
    SessionManager::new(Arc::new(pool.clone()), test_config())
}

pub fn app_state(pool: &PgPool) -> AppState {
    AppState::new(Arc::new(pool.clone()), test_config())
}

pub async fn seed_user(pool: &PgPool, role: UserRole, session_policy: Option<&str>) -> User {
    let id = UserId::new();
    let email = format!("user_{}@example.com", Uuid::new_v4());
    let password_hash = hash_password(TEST_PASSWORD).expect("hash password");

    sqlx::query(
        "INSERT INTO users (id, email, display_name, password_hash, role, session_policy) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(id.to_string())
    .bind(&email)
    .bind("Test User")
    .bind(&password_hash)
    .bind(role.as_str())
    .bind(session_policy)
    .execute(pool)
    .await
    .expect("insert user");

    User {
        id,
        email,
        display_name: "Test User".into(),
        password_hash,
        role,
        session_policy: session_policy.map(|s| s.to_string()),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

pub async fn count_active_sessions(pool: &PgPool, user_id: UserId) -> i64 {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM sessions WHERE user_id = $1 AND status = 'active'",
    )
    .bind(user_id.to_string())
    .fetch_one(pool)
    .await
    .expect("count active sessions")
}

/// Shifts a session's creation time into the past.
pub async fn backdate_session(pool: &PgPool, session_id: &str, days: i32) {
    sqlx::query(
        "UPDATE sessions SET created_at = NOW() - make_interval(days => $1) WHERE id = $2",
    )
    .bind(days)
    .bind(session_id)
    .execute(pool)
    .await
    .expect("backdate session");
}
