//! crates/paper_watch_core/src/scheduler.rs
//!
//! One pass over every subscription: gate, fetch, dedup, cap, enrich,
//! dispatch, mark, touch. Subscriptions are processed sequentially and each
//! one in isolation, so a failure never aborts the rest of the pass.
//!
//! Transport failures are absorbed per message: the paper stays unmarked and
//! is offered again on the next due day. Only ledger failures leave
//! `last_checked` stale.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::dedup::DedupIndex;
use crate::domain::Subscription;
use crate::enrich::enrich_or_link;
use crate::gate::CheckGate;
use crate::ports::{ContentSource, EnrichmentService, LedgerService, Notifier, PortResult};
use crate::render;

pub const DEFAULT_CANDIDATE_BATCH: usize = 5;
pub const DEFAULT_DELIVERY_CAP: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Newest papers fetched per subscription per pass.
    pub candidate_batch: usize,
    /// Most papers delivered per subscription per pass.
    pub delivery_cap: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            candidate_batch: DEFAULT_CANDIDATE_BATCH,
            delivery_cap: DEFAULT_DELIVERY_CAP,
        }
    }
}

/// What one pass did, for logs and manual triggers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// The pass stopped at the global window check.
    pub outside_window: bool,
    pub not_due: usize,
    pub checked: usize,
    pub failed: usize,
    pub delivered: usize,
    /// Papers whose notification the transport rejected. They stay unmarked.
    pub undelivered: usize,
}

pub struct SubscriptionScheduler {
    ledger: Arc<dyn LedgerService>,
    dedup: DedupIndex,
    source: Arc<dyn ContentSource>,
    enricher: Arc<dyn EnrichmentService>,
    notifier: Arc<dyn Notifier>,
    gate: CheckGate,
    config: SchedulerConfig,
}

impl SubscriptionScheduler {
    pub fn new(
        ledger: Arc<dyn LedgerService>,
        source: Arc<dyn ContentSource>,
        enricher: Arc<dyn EnrichmentService>,
        notifier: Arc<dyn Notifier>,
        gate: CheckGate,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            dedup: DedupIndex::new(ledger.clone()),
            ledger,
            source,
            enricher,
            notifier,
            gate,
            config,
        }
    }

    pub async fn run_pass(&self, now: DateTime<Utc>, force: bool) -> PassReport {
        let mut report = PassReport::default();

        if !self.gate.in_window(now, force) {
            info!(%now, "Skipping subscription pass: outside the source's update window");
            report.outside_window = true;
            return report;
        }

        let subscriptions = match self.ledger.list_all_subscriptions().await {
            Ok(subs) => subs,
            Err(e) => {
                error!(error = %e, "Failed to list subscriptions");
                return report;
            }
        };
        info!(count = subscriptions.len(), force, "Starting subscription pass");

        for sub in subscriptions {
            if !self.gate.eligible(now, sub.last_checked, force) {
                debug!(subscription_id = sub.id, "Subscription already checked today");
                report.not_due += 1;
                continue;
            }

            match self.check_subscription(&sub, now).await {
                Ok(outcome) => {
                    report.checked += 1;
                    report.delivered += outcome.delivered;
                    report.undelivered += outcome.undelivered;
                }
                Err(e) => {
                    // last_checked stays stale so the next eligible pass retries it.
                    error!(subscription_id = sub.id, error = %e, "Subscription check failed");
                    report.failed += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            not_due = report.not_due,
            failed = report.failed,
            delivered = report.delivered,
            undelivered = report.undelivered,
            "Subscription pass finished"
        );
        report
    }

    async fn check_subscription(
        &self,
        sub: &Subscription,
        now: DateTime<Utc>,
    ) -> PortResult<CheckOutcome> {
        let candidates = match self
            .source
            .search(&sub.topic, self.config.candidate_batch, 0)
            .await
        {
            Ok(papers) => papers,
            Err(e) => {
                warn!(subscription_id = sub.id, error = %e, "Content source failed, no candidates this pass");
                Vec::new()
            }
        };

        let fresh = self.dedup.new_items(sub.user_id, candidates).await?;

        if fresh.is_empty() {
            if let Err(e) = self
                .notifier
                .notify(sub.user_id, &render::nothing_new_message(&sub.topic))
                .await
            {
                warn!(subscription_id = sub.id, user_id = sub.user_id, error = %e, "Failed to send the nothing-new notice");
            }
        }

        let mut outcome = CheckOutcome::default();
        for paper in fresh.into_iter().take(self.config.delivery_cap) {
            let url = enrich_or_link(self.enricher.as_ref(), &paper).await;
            let message = render::new_paper_message(&sub.topic, &paper, &url);
            if let Err(e) = self.notifier.notify(sub.user_id, &message).await {
                warn!(
                    subscription_id = sub.id,
                    user_id = sub.user_id,
                    item_id = %paper.external_id,
                    error = %e,
                    "Notification failed, paper left unmarked"
                );
                outcome.undelivered += 1;
                continue;
            }
            self.dedup
                .record_sent(sub.user_id, sub.id, &paper.external_id, now)
                .await?;
            outcome.delivered += 1;
            info!(subscription_id = sub.id, user_id = sub.user_id, item_id = %paper.external_id, "Delivered paper");
        }

        self.ledger.touch_last_checked(sub.id, now).await?;
        Ok(outcome)
    }
}

#[derive(Debug, Default)]
struct CheckOutcome {
    delivered: usize,
    undelivered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Cadence;
    use crate::testing::{papers, FakeEnricher, FakeSource, MemoryLedger, RecordingNotifier};
    use chrono::TimeZone;

    const USER: i64 = 42;

    struct Harness {
        ledger: Arc<MemoryLedger>,
        source: Arc<FakeSource>,
        enricher: Arc<FakeEnricher>,
        notifier: Arc<RecordingNotifier>,
        scheduler: SubscriptionScheduler,
    }

    fn harness(source: FakeSource, enricher: FakeEnricher) -> Harness {
        let ledger = Arc::new(MemoryLedger::default());
        let source = Arc::new(source);
        let enricher = Arc::new(enricher);
        let notifier = Arc::new(RecordingNotifier::default());
        let scheduler = SubscriptionScheduler::new(
            ledger.clone(),
            source.clone(),
            enricher.clone(),
            notifier.clone(),
            CheckGate::default(),
            SchedulerConfig::default(),
        );
        Harness {
            ledger,
            source,
            enricher,
            notifier,
            scheduler,
        }
    }

    async fn subscribe(ledger: &MemoryLedger, topic: &str) -> i64 {
        ledger.register_user(USER).await.unwrap();
        ledger
            .create_subscription(USER, topic, Cadence::Daily)
            .await
            .unwrap()
    }

    /// Monday 2024-01-08, 09:00 in UTC+5.
    fn monday_morning() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 8, 4, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_delivers_at_most_cap_new_papers() {
        let h = harness(
            FakeSource::default().with_topic("quantum computing", papers(&["p1", "p2", "p3", "p4", "p5"])),
            FakeEnricher::default(),
        );
        let sub_id = subscribe(&h.ledger, "quantum computing").await;
        let now = monday_morning();

        let report = h.scheduler.run_pass(now, false).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.delivered, 3);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|(user, _)| *user == USER));
        assert!(sent[0].1.contains("https://telegra.ph/p1"));
        assert_eq!(h.ledger.seen_ids(USER), vec!["p1", "p2", "p3"]);
        let sub = h.ledger.get_subscription(sub_id).await.unwrap();
        assert_eq!(sub.last_checked, Some(now));
        assert_eq!(h.source.calls(), vec![("quantum computing".to_string(), 5, 0)]);
    }

    #[tokio::test]
    async fn test_remaining_papers_are_delivered_next_day() {
        let h = harness(
            FakeSource::default().with_topic("quantum computing", papers(&["p1", "p2", "p3", "p4", "p5"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "quantum computing").await;

        h.scheduler.run_pass(monday_morning(), false).await;
        let tuesday = monday_morning() + chrono::Duration::days(1);
        let report = h.scheduler.run_pass(tuesday, false).await;

        assert_eq!(report.delivered, 2);
        assert_eq!(h.ledger.seen_ids(USER), vec!["p1", "p2", "p3", "p4", "p5"]);
    }

    #[tokio::test]
    async fn test_no_update_weekday_touches_nothing() {
        let h = harness(
            FakeSource::default().with_topic("t", papers(&["p1"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "t").await;
        let writes = h.ledger.writes();
        // Friday noon local.
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 7, 0, 0).unwrap();

        let report = h.scheduler.run_pass(friday, false).await;

        assert!(report.outside_window);
        assert_eq!(h.ledger.writes(), writes);
        assert!(h.source.calls().is_empty());
        assert_eq!(h.enricher.calls(), 0);
        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_same_day_processes_nothing() {
        let h = harness(
            FakeSource::default()
                .with_topic("a", papers(&["p1"]))
                .with_topic("b", papers(&["p2"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "a").await;
        subscribe(&h.ledger, "b").await;

        let first = h.scheduler.run_pass(monday_morning(), false).await;
        let second = h
            .scheduler
            .run_pass(monday_morning() + chrono::Duration::hours(1), false)
            .await;

        assert_eq!(first.checked, 2);
        assert_eq!(second.checked, 0);
        assert_eq!(second.not_due, 2);
        assert_eq!(h.source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_force_bypasses_window_and_throttle() {
        let h = harness(
            FakeSource::default().with_topic("a", papers(&["p1"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "a").await;
        let friday = Utc.with_ymd_and_hms(2024, 1, 5, 7, 0, 0).unwrap();

        h.scheduler.run_pass(friday, true).await;
        let report = h.scheduler.run_pass(friday, true).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.delivered, 0);
        // Second forced pass found nothing new and said so.
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.starts_with("📭"));
    }

    #[tokio::test]
    async fn test_enrichment_failure_falls_back_to_link() {
        let h = harness(
            FakeSource::default().with_topic("a", papers(&["2401.00001v1"])),
            FakeEnricher::failing(),
        );
        subscribe(&h.ledger, "a").await;

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.delivered, 1);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("http://arxiv.org/abs/2401.00001v1"));
        assert_eq!(h.ledger.seen_ids(USER), vec!["2401.00001v1"]);
    }

    #[tokio::test]
    async fn test_nothing_new_still_notifies_and_touches() {
        let h = harness(FakeSource::default(), FakeEnricher::default());
        let sub_id = subscribe(&h.ledger, "obscure topic").await;

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.checked, 1);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains("obscure topic"));
        let sub = h.ledger.get_subscription(sub_id).await.unwrap();
        assert_eq!(sub.last_checked, Some(monday_morning()));
    }

    #[tokio::test]
    async fn test_source_failure_is_treated_as_no_candidates() {
        let h = harness(
            FakeSource::default()
                .failing_for("broken")
                .with_topic("fine", papers(&["p1"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "broken").await;
        subscribe(&h.ledger, "fine").await;

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.checked, 2);
        assert_eq!(report.failed, 0);
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn test_failed_subscription_does_not_abort_pass() {
        let h = harness(
            FakeSource::default()
                .with_topic("a", papers(&["p1"]))
                .with_topic("b", papers(&["p2"])),
            FakeEnricher::default(),
        );
        let a = subscribe(&h.ledger, "a").await;
        let b = subscribe(&h.ledger, "b").await;
        h.ledger.fail_mark_seen(true);

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.failed, 2);
        // Both were attempted, neither advanced its cadence.
        assert_eq!(h.notifier.sent().len(), 2);
        assert_eq!(h.ledger.get_subscription(a).await.unwrap().last_checked, None);
        assert_eq!(h.ledger.get_subscription(b).await.unwrap().last_checked, None);

        // Once the ledger recovers the next pass retries; the duplicate is the accepted cost.
        h.ledger.fail_mark_seen(false);
        let retry = h
            .scheduler
            .run_pass(monday_morning() + chrono::Duration::hours(1), false)
            .await;
        assert_eq!(retry.delivered, 2);
        assert!(h.ledger.get_subscription(a).await.unwrap().last_checked.is_some());
    }

    #[tokio::test]
    async fn test_dispatch_failure_leaves_paper_unmarked() {
        let h = harness(
            FakeSource::default().with_topic("a", papers(&["p1", "p2"])),
            FakeEnricher::default(),
        );
        let sub_id = subscribe(&h.ledger, "a").await;
        h.notifier.fail(true);

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(report.delivered, 0);
        assert_eq!(report.undelivered, 2);
        assert!(h.ledger.seen_ids(USER).is_empty());
        assert_eq!(
            h.ledger.get_subscription(sub_id).await.unwrap().last_checked,
            Some(monday_morning())
        );

        // The transport recovers; the unmarked papers go out on the next due day.
        h.notifier.fail(false);
        let tuesday = monday_morning() + chrono::Duration::days(1);
        let retry = h.scheduler.run_pass(tuesday, false).await;
        assert_eq!(retry.delivered, 2);
        assert_eq!(h.ledger.seen_ids(USER), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_blocked_user_is_not_re_enriched_hourly() {
        let h = harness(
            FakeSource::default().with_topic("a", papers(&["p1"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "a").await;
        h.notifier.fail(true);

        for hour in 0..18 {
            h.scheduler
                .run_pass(monday_morning() + chrono::Duration::hours(hour), false)
                .await;
        }

        assert_eq!(h.source.calls().len(), 1);
        assert_eq!(h.enricher.calls(), 1);
    }

    #[tokio::test]
    async fn test_failed_nothing_new_notice_still_touches() {
        let h = harness(FakeSource::default(), FakeEnricher::default());
        let sub_id = subscribe(&h.ledger, "quiet").await;
        h.notifier.fail(true);

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.checked, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(
            h.ledger.get_subscription(sub_id).await.unwrap().last_checked,
            Some(monday_morning())
        );
    }

    #[tokio::test]
    async fn test_same_paper_across_subscriptions_is_sent_once() {
        let h = harness(
            FakeSource::default()
                .with_topic("qubits", papers(&["shared"]))
                .with_topic("quantum", papers(&["shared"])),
            FakeEnricher::default(),
        );
        subscribe(&h.ledger, "qubits").await;
        subscribe(&h.ledger, "quantum").await;

        let report = h.scheduler.run_pass(monday_morning(), false).await;

        assert_eq!(report.delivered, 1);
        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.starts_with("📭"));
    }
}
