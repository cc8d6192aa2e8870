//! services/monitor/src/error.rs
//!
//! Startup and runtime errors of the monitor binary.

use crate::config::ConfigError;
use paper_watch_core::ports::PortError;

/// Everything that can stop the `monitor` service from starting or serving.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A ledger, source or provider call failed outside of a request.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// The embedded ledger schema could not be applied.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Binding the listener or serving connections failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
