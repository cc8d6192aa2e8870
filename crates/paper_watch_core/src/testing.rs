//! In-memory implementations of every port, used by the core's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{Cadence, Paper, SeenMark, Subscription, SubscriptionId, User, UserId};
use crate::ports::{
    ContentSource, EnrichmentService, LedgerService, Notifier, PortError, PortResult,
};

pub fn paper(id: &str) -> Paper {
    Paper {
        external_id: id.to_string(),
        title: format!("Paper {}", id),
        abstract_text: format!("Abstract of {}", id),
        year: Some(2024),
        link: format!("http://arxiv.org/abs/{}", id),
    }
}

pub fn papers(ids: &[&str]) -> Vec<Paper> {
    ids.iter().map(|id| paper(id)).collect()
}

//=========================================================================================
// Ledger
//=========================================================================================

#[derive(Default)]
struct LedgerTables {
    users: HashMap<UserId, User>,
    subscriptions: Vec<Subscription>,
    next_id: SubscriptionId,
    seen: Vec<(UserId, SubscriptionId, String, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryLedger {
    tables: Mutex<LedgerTables>,
    writes: AtomicUsize,
    fail_mark_seen: Mutex<bool>,
}

impl MemoryLedger {
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn seen_count(&self, user_id: UserId) -> usize {
        let tables = self.tables.lock().unwrap();
        tables.seen.iter().filter(|(u, ..)| *u == user_id).count()
    }

    pub fn seen_ids(&self, user_id: UserId) -> Vec<String> {
        let tables = self.tables.lock().unwrap();
        tables
            .seen
            .iter()
            .filter(|(u, ..)| *u == user_id)
            .map(|(_, _, item, _)| item.clone())
            .collect()
    }

    pub fn fail_mark_seen(&self, fail: bool) {
        *self.fail_mark_seen.lock().unwrap() = fail;
    }

    fn wrote(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerService for MemoryLedger {
    async fn register_user(&self, user_id: UserId) -> PortResult<User> {
        self.wrote();
        let mut tables = self.tables.lock().unwrap();
        let user = tables.users.entry(user_id).or_insert_with(|| User {
            user_id,
            created_at: Utc::now(),
        });
        Ok(user.clone())
    }

    async fn create_subscription(
        &self,
        user_id: UserId,
        topic: &str,
        cadence: Cadence,
    ) -> PortResult<SubscriptionId> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PortError::InvalidInput("topic must not be empty".to_string()));
        }
        let mut tables = self.tables.lock().unwrap();
        if !tables.users.contains_key(&user_id) {
            return Err(PortError::ForeignKeyViolation(format!("user {}", user_id)));
        }
        self.wrote();
        tables.next_id += 1;
        let id = tables.next_id;
        tables.subscriptions.push(Subscription {
            id,
            user_id,
            topic: topic.to_string(),
            cadence,
            last_checked: None,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn get_subscription(&self, id: SubscriptionId) -> PortResult<Subscription> {
        let tables = self.tables.lock().unwrap();
        tables
            .subscriptions
            .iter()
            .find(|s| s.id == id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Subscription {} not found", id)))
    }

    async fn list_subscriptions(&self, user_id: UserId) -> PortResult<Vec<Subscription>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .subscriptions
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_all_subscriptions(&self) -> PortResult<Vec<Subscription>> {
        Ok(self.tables.lock().unwrap().subscriptions.clone())
    }

    async fn delete_subscription(&self, id: SubscriptionId) -> PortResult<bool> {
        self.wrote();
        let mut tables = self.tables.lock().unwrap();
        let before = tables.subscriptions.len();
        tables.subscriptions.retain(|s| s.id != id);
        Ok(tables.subscriptions.len() != before)
    }

    async fn touch_last_checked(&self, id: SubscriptionId, now: DateTime<Utc>) -> PortResult<()> {
        self.wrote();
        let mut tables = self.tables.lock().unwrap();
        if let Some(sub) = tables.subscriptions.iter_mut().find(|s| s.id == id) {
            sub.last_checked = Some(now);
        }
        Ok(())
    }

    async fn mark_seen(
        &self,
        user_id: UserId,
        subscription_id: SubscriptionId,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> PortResult<()> {
        if *self.fail_mark_seen.lock().unwrap() {
            return Err(PortError::Unexpected("disk full".to_string()));
        }
        self.wrote();
        let mut tables = self.tables.lock().unwrap();
        let exists = tables
            .seen
            .iter()
            .any(|(u, _, item, _)| *u == user_id && item == item_id);
        if !exists {
            tables
                .seen
                .push((user_id, subscription_id, item_id.to_string(), now));
        }
        Ok(())
    }

    async fn filter_unseen(&self, user_id: UserId, item_ids: &[String]) -> PortResult<Vec<String>> {
        let tables = self.tables.lock().unwrap();
        Ok(item_ids
            .iter()
            .filter(|id| {
                !tables
                    .seen
                    .iter()
                    .any(|(u, _, item, _)| *u == user_id && item == *id)
            })
            .cloned()
            .collect())
    }

    async fn list_seen_marks(&self, user_id: UserId) -> PortResult<Vec<SeenMark>> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .seen
            .iter()
            .filter(|(u, ..)| *u == user_id)
            .map(|(u, sub, item, at)| SeenMark {
                user_id: *u,
                subscription_id: *sub,
                item_id: item.clone(),
                sent_at: *at,
            })
            .collect())
    }
}

//=========================================================================================
// Content source
//=========================================================================================

/// Serves a fixed, newest-first list of papers per topic.
#[derive(Default)]
pub struct FakeSource {
    topics: Mutex<HashMap<String, Vec<Paper>>>,
    failing: Mutex<HashSet<String>>,
    calls: Mutex<Vec<(String, usize, usize)>>,
}

impl FakeSource {
    pub fn with_topic(self, topic: &str, papers: Vec<Paper>) -> Self {
        self.set_topic(topic, papers);
        self
    }

    pub fn set_topic(&self, topic: &str, papers: Vec<Paper>) {
        self.topics.lock().unwrap().insert(topic.to_string(), papers);
    }

    pub fn failing_for(self, topic: &str) -> Self {
        self.failing.lock().unwrap().insert(topic.to_string());
        self
    }

    pub fn calls(&self) -> Vec<(String, usize, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn search(
        &self,
        topic: &str,
        max_results: usize,
        offset: usize,
    ) -> PortResult<Vec<Paper>> {
        self.calls
            .lock()
            .unwrap()
            .push((topic.to_string(), max_results, offset));
        if self.failing.lock().unwrap().contains(topic) {
            return Err(PortError::Provider("source unavailable".to_string()));
        }
        let topics = self.topics.lock().unwrap();
        Ok(topics
            .get(topic)
            .map(|all| all.iter().skip(offset).take(max_results).cloned().collect())
            .unwrap_or_default())
    }
}

//=========================================================================================
// Enrichment and notifications
//=========================================================================================

#[derive(Default)]
pub struct FakeEnricher {
    fail: bool,
    calls: AtomicUsize,
}

impl FakeEnricher {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EnrichmentService for FakeEnricher {
    async fn enrich(&self, paper: &Paper) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PortError::Provider("summarizer quota exhausted".to_string()));
        }
        Ok(format!("https://telegra.ph/{}", paper.external_id))
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(UserId, String)>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<(UserId, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, fail: bool) {
        *self.fail.lock().unwrap() = fail;
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, user_id: UserId, message: &str) -> PortResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(PortError::Provider("chat not found".to_string()));
        }
        self.sent.lock().unwrap().push((user_id, message.to_string()));
        Ok(())
    }
}
