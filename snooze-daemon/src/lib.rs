//! Snooze daemon library.
//!
//! Exposes the daemon's building blocks for integration testing.
//! In production, `snooze-daemon` is used as a binary (main.rs).

pub mod backends;
pub mod cli;
pub mod health;
pub mod logging;
pub mod metrics_server;
pub mod orchestrator;
pub mod pid_file;
pub mod replay;
pub mod services;
