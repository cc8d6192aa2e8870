//! crates/paper_watch_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    Cadence, Paper, PublishablePage, SeenMark, Subscription, SubscriptionId, User, UserId,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("External provider failure: {0}")]
    Provider(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Persistent record of users, subscriptions and seen-item markers.
#[async_trait]
pub trait LedgerService: Send + Sync {
    // --- User Management ---

    /// Idempotent: registering an existing user returns the stored record.
    async fn register_user(&self, user_id: UserId) -> PortResult<User>;

    // --- Subscription Management ---

    /// Fails with `InvalidInput` on an empty topic and with
    /// `ForeignKeyViolation` when the user was never registered.
    async fn create_subscription(
        &self,
        user_id: UserId,
        topic: &str,
        cadence: Cadence,
    ) -> PortResult<SubscriptionId>;

    async fn get_subscription(&self, id: SubscriptionId) -> PortResult<Subscription>;

    /// Subscriptions of one user, in insertion order.
    async fn list_subscriptions(&self, user_id: UserId) -> PortResult<Vec<Subscription>>;

    /// Every subscription in the ledger, for the scheduler.
    async fn list_all_subscriptions(&self) -> PortResult<Vec<Subscription>>;

    /// Returns whether a row existed. Seen marks are kept.
    async fn delete_subscription(&self, id: SubscriptionId) -> PortResult<bool>;

    async fn touch_last_checked(&self, id: SubscriptionId, now: DateTime<Utc>) -> PortResult<()>;

    // --- Seen Marks ---

    /// Idempotent per (user, item).
    async fn mark_seen(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Returns the ids not yet seen by the user, in input order.
    async fn filter_unseen(&self, user_id: UserId, item_ids: &[String]) -> PortResult<Vec<String>>;

    /// Every paper delivered to a user, oldest first.
    async fn list_seen_marks(&self, user_id: UserId) -> PortResult<Vec<SeenMark>>;
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Searches newest-first. May return fewer than `max_results` papers.
    async fn search(&self, topic: &str, max_results: usize, offset: usize)
        -> PortResult<Vec<Paper>>;
}

#[async_trait]
pub trait SummaryService: Send + Sync {
    /// Produces a short plain-text summary of a paper.
    async fn summarize(&self, paper: &Paper) -> PortResult<String>;
}

#[async_trait]
pub trait PagePublisher: Send + Sync {
    /// Publishes a page and returns its public URL.
    async fn publish(&self, page: &PublishablePage) -> PortResult<String>;
}

#[async_trait]
pub trait EnrichmentService: Send + Sync {
    /// Turns a paper into a publishable URL (summary page).
    async fn enrich(&self, paper: &Paper) -> PortResult<String>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends a rendered (HTML) message to a user.
    async fn notify(&self, user_id: UserId, message: &str) -> PortResult<()>;
}
