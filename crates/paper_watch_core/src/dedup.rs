//! crates/paper_watch_core/src/dedup.rs
//!
//! Query surface over the ledger's seen marks: which papers are new for a
//! user, and recording a paper as delivered.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::domain::{Paper, SubscriptionId, UserId};
use crate::ports::{LedgerService, PortResult};

#[derive(Clone)]
pub struct DedupIndex {
    ledger: Arc<dyn LedgerService>,
}

impl DedupIndex {
    pub fn new(ledger: Arc<dyn LedgerService>) -> Self {
        Self { ledger }
    }

    /// Keeps the papers the user has not been sent yet, in source order.
    pub async fn new_items(&self, user_id: UserId, candidates: Vec<Paper>) -> PortResult<Vec<Paper>> {
        if candidates.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = candidates.iter().map(|p| p.external_id.clone()).collect();
        let unseen: HashSet<String> = self
            .ledger
            .filter_unseen(user_id, &ids)
            .await?
            .into_iter()
            .collect();

        Ok(candidates
            .into_iter()
            .filter(|p| unseen.contains(&p.external_id))
            .collect())
    }

    pub async fn is_new(&self, user_id: UserId, item_id: &str) -> PortResult<bool> {
        let unseen = self
            .ledger
            .filter_unseen(user_id, &[item_id.to_string()])
            .await?;
        Ok(!unseen.is_empty())
    }

    /// Must only be called after the paper was dispatched.
    pub async fn record_sent(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        self.ledger
            .mark_seen(user_id, subscription_id, item_id, now)
            .await
    }
}
