//! crates/paper_watch_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.

use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Opaque user identifier (the chat id notifications are delivered to).
pub type UserId = i64;

pub type SubscriptionId = i64;

// Represents a user - created on first interaction, never mutated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// How often a subscription is checked. Only daily checks exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Cadence {
    #[default]
    Daily,
}

impl Cadence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cadence::Daily => "daily",
        }
    }
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Cadence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Cadence::Daily),
            other => Err(format!("unsupported cadence '{}'", other)),
        }
    }
}

/// A user's standing request to be notified about new papers on a topic.
///
/// `last_checked` is the only field that changes after creation, and only the
/// scheduler writes it. `None` means the subscription was never checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: SubscriptionId,
    pub user_id: UserId,
    pub topic: String,
    pub cadence: Cadence,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Durable record that a paper was already delivered to a user.
/// Unique per (user, item), whichever subscription surfaced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeenMark {
    pub user_id: UserId,
    pub subscription_id: SubscriptionId,
    pub item_id: String,
    pub sent_at: DateTime<Utc>,
}

/// A single search result from the content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    /// Stable identifier assigned by the source (e.g. `2401.01234v1`).
    pub external_id: String,
    pub title: String,
    pub abstract_text: String,
    pub year: Option<i32>,
    pub link: String,
}

/// The content handed to a page publisher once a summary exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishablePage {
    pub title: String,
    pub summary: String,
    pub source_link: String,
}
