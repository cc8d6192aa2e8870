pub mod dedup;
pub mod domain;
pub mod enrich;
pub mod gate;
pub mod ports;
pub mod render;
pub mod scheduler;
pub mod search_session;

#[cfg(test)]
mod testing;

pub use dedup::DedupIndex;
pub use domain::{Cadence, Paper, PublishablePage, SeenMark, Subscription, SubscriptionId, User, UserId};
pub use enrich::{enrich_or_link, PageEnricher};
pub use gate::{CheckGate, GateConfig};
pub use ports::{
    ContentSource, EnrichmentService, LedgerService, Notifier, PagePublisher, PortError,
    PortResult, SummaryService,
};
pub use scheduler::{PassReport, SchedulerConfig, SubscriptionScheduler};
pub use search_session::{Handle, PaperSearch, SearchError, SearchPage, SessionStore};
