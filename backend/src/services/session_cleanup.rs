//! Periodic expiry sweep driver.
//!
//! Runs the session manager's cleanup on a fixed interval and exposes an
//! on-demand entry point for the admin force-cleanup endpoint and the
//! one-shot binary. An in-flight flag collapses overlapping runs; a failed
//! sweep is abandoned for the cycle and retried on the next tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;

use crate::services::session::{SessionError, SessionManager};

pub struct SessionCleanup {
    manager: Arc<SessionManager>,
    interval: StdDuration,
    retention: Duration,
    in_flight: AtomicBool,
}

impl SessionCleanup {
    pub fn new(
        manager: Arc<SessionManager>,
        interval_seconds: u64,
        retention_days: i64,
    ) -> Arc<Self> {
        Arc::new(Self {
            manager,
            interval: StdDuration::from_secs(interval_seconds.max(1)),
            retention: Duration::days(retention_days),
            in_flight: AtomicBool::new(false),
        })
    }

    /// Runs one sweep unless another is already in flight. Returns the
    /// number of deleted rows, or `None` when the run was skipped.
    pub async fn run_once(&self) -> Result<Option<u64>, SessionError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Ok(None);
        }
        let result = self.manager.cleanup_expired(self.retention).await;
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(Some)
    }

    /// Spawns the interval loop on the runtime.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so startup is not
            // serialized behind a sweep.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match self.run_once().await {
                    Ok(Some(deleted)) if deleted > 0 => {
                        tracing::info!(deleted, "session cleanup sweep removed rows");
                    }
                    Ok(Some(_)) => {
                        tracing::debug!("session cleanup sweep found nothing to remove");
                    }
                    Ok(None) => {
                        tracing::warn!("previous session cleanup sweep still running, skipped tick");
                    }
                    Err(err) => {
                        tracing::error!(error = ?err, "session cleanup sweep failed, retrying next tick");
                    }
                }
            }
        })
    }
}
