use std::sync::Arc;

use crate::config::Config;
use crate::db::connection::DbPool;
use crate::services::directory::{IdentityDirectory, PgIdentityDirectory};
use crate::services::session::SessionManager;
use crate::services::session_cleanup::SessionCleanup;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Config,
    pub sessions: Arc<SessionManager>,
    pub directory: Arc<dyn IdentityDirectory>,
    pub cleanup: Arc<SessionCleanup>,
}

impl AppState {
    pub fn new(pool: DbPool, config: Config) -> Self {
        let sessions = Arc::new(SessionManager::new(pool.clone(), config.clone()));
        let cleanup = SessionCleanup::new(
            sessions.clone(),
            config.cleanup_interval_seconds,
            config.session_retention_days,
        );
        let directory: Arc<dyn IdentityDirectory> = Arc::new(PgIdentityDirectory::new(pool.clone()));
        Self {
            pool,
            config,
            sessions,
            directory,
            cleanup,
        }
    }

    /// Swaps the identity directory implementation (tests, alternative
    /// providers).
    pub fn with_directory(mut self, directory: Arc<dyn IdentityDirectory>) -> Self {
        self.directory = directory;
        self
    }
}
