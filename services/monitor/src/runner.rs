//! services/monitor/src/runner.rs
//!
//! Drives `SubscriptionScheduler::run_pass` on a cron schedule until the
//! cancellation token fires.

use std::sync::Arc;

use chrono::Utc;
use cron::Schedule;
use paper_watch_core::scheduler::SubscriptionScheduler;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ConfigError;

/// Parses a standard 5-field cron expression. The `cron` crate wants a
/// leading seconds field, which is pinned to 0.
pub fn parse_schedule(expr: &str) -> Result<Schedule, ConfigError> {
    format!("0 {}", expr.trim())
        .parse::<Schedule>()
        .map_err(|e| {
            ConfigError::InvalidValue(
                "CHECK_SCHEDULE".to_string(),
                format!("invalid cron expression '{}': {}", expr, e),
            )
        })
}

pub async fn run_pass_loop(
    scheduler: Arc<SubscriptionScheduler>,
    schedule: Schedule,
    token: CancellationToken,
) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!("Check schedule has no upcoming fire time, stopping the pass runner");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();
        info!(next_pass = %next, "Waiting for the next subscription pass");

        tokio::select! {
            _ = token.cancelled() => {
                info!("Pass runner shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // A pass in flight finishes before cancellation is observed.
        scheduler.run_pass(Utc::now(), false).await;
    }
}
