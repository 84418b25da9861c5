//! One-shot expiry sweep, runnable from cron alongside the in-process
//! scheduler.

use advisory_backend::{
    config::Config, db::connection::create_pool, services::session::SessionManager,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let config = Config::load()?;
    let pool = create_pool(&config.database_url).await?;

    let manager = SessionManager::new(pool.clone(), config.clone());
    let deleted = manager
        .cleanup_expired(chrono::Duration::days(config.session_retention_days))
        .await?;
    if deleted > 0 {
        tracing::info!(deleted, "Deleted session rows past the retention window");
    }

    sqlx::query("VACUUM (ANALYZE) sessions")
        .execute(&*pool)
        .await?;

    Ok(())
}
