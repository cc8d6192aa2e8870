//! services/monitor/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use paper_watch_core::ports::{EnrichmentService, LedgerService};
use paper_watch_core::scheduler::SubscriptionScheduler;
use paper_watch_core::search_session::PaperSearch;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn LedgerService>,
    pub config: Arc<Config>,
    /// Shared with the background pass runner.
    pub scheduler: Arc<SubscriptionScheduler>,
    pub search: Arc<PaperSearch>,
    pub enricher: Arc<dyn EnrichmentService>,
}
