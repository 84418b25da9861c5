//! Backend for the advisory chat application.
//!
//! The interesting part lives in `services`: session creation under a
//! per-subject concurrency policy, refresh-token rotation with reuse
//! containment, and the expiry sweep. Everything else is the surrounding
//! HTTP plumbing.

pub mod config;
pub mod db;
pub mod docs;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod state;
pub mod types;
pub mod utils;
