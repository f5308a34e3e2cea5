//! Schedule ticker tests: queue refill, dispatch and lease behaviour.
//!
//! Run with: `cargo test -p oxide-tests --test ticker_tests`

use chrono::{Duration as ChronoDuration, Utc};
use oxide_core::commit::CommitIdWithOrder;
use oxide_core::ports::{LeaseProvider, WorkQueue};
use oxide_core::schedule::{Schedule, ScheduleConfig};
use oxide_scheduler::ticker::{REFILL_LEASE_KEY, schedule_lease_key};
use oxide_scheduler::{ScheduleTicker, SchedulerConfig, TickSummary};
use oxide_tests::{
    CommitFixture, ScheduleFixture, SchedulerHarness, init_test_logging, stream_id, template_id,
};
use pretty_assertions::assert_eq;
use std::time::Duration;
use tokio::sync::watch;

fn harness() -> SchedulerHarness {
    init_test_logging();
    SchedulerHarness::new(SchedulerConfig::default()).expect("Failed to build harness")
}

/// A schedule with one pending change, last triggered two hours ago.
fn overdue(patterns: &[&str]) -> Schedule {
    let mut schedule = ScheduleFixture::with_config(ScheduleConfig {
        require_submitted_change: true,
        patterns: patterns.iter().map(|p| p.to_string()).collect(),
        ..Default::default()
    });
    schedule.last_trigger_commit_id = Some(CommitIdWithOrder::new(100));
    schedule.last_trigger_time = Some(Utc::now() - ChronoDuration::hours(2));
    schedule
}

#[tokio::test]
async fn test_tick_dispatches_due_schedule() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.add_schedule(&overdue(&["0 0 * * * *"])).await.unwrap();

    let summary = h.ticker.tick(Utc::now()).await.unwrap();

    assert_eq!(
        summary,
        TickSummary {
            refilled: true,
            queued: 1,
            dispatched: 1,
            triggered: 1,
        }
    );
    assert_eq!(h.jobs.created_orders(), vec![101]);
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_schedule_not_yet_due_stays_queued() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let mut schedule = overdue(&["0 0 2 * * *"]);
    schedule.last_trigger_time = Some(Utc::now());
    h.add_schedule(&schedule).await.unwrap();

    let summary = h.ticker.tick(Utc::now()).await.unwrap();

    assert_eq!(summary.queued, 1);
    assert_eq!(summary.dispatched, 0);
    assert!(h.jobs.created().is_empty());
    assert!(h.queue.score(&schedule.queue_item()).await.unwrap() > Utc::now().timestamp());
}

#[tokio::test]
async fn test_disabled_and_patternless_schedules_are_not_queued() {
    init_test_logging();
    let config = SchedulerConfig {
        refill_lease_ttl_secs: 0,
        ..Default::default()
    };
    let h = SchedulerHarness::new(config).unwrap();
    let mut schedule = overdue(&[]);
    h.add_schedule(&schedule).await.unwrap();

    let summary = h.ticker.tick(Utc::now()).await.unwrap();
    assert_eq!(summary.queued, 0);

    schedule.config.patterns = vec!["0 0 * * * *".to_string()];
    schedule.config.enabled = false;
    h.add_schedule(&schedule).await.unwrap();

    let summary = h.ticker.tick(Utc::now()).await.unwrap();
    assert!(summary.refilled);
    assert_eq!(summary.queued, 0);
}

#[tokio::test]
async fn test_refill_runs_once_per_lease() {
    let h = harness();
    h.add_schedule(&overdue(&["0 0 2 * * *"])).await.unwrap();

    let first = h.ticker.tick(Utc::now()).await.unwrap();
    let second = h.ticker.tick(Utc::now()).await.unwrap();

    assert!(first.refilled);
    assert!(!second.refilled);
    assert!(h.leases.is_held(REFILL_LEASE_KEY).await);
}

#[tokio::test]
async fn test_refill_skipped_when_lease_held_elsewhere() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.add_schedule(&overdue(&["0 0 * * * *"])).await.unwrap();
    h.leases
        .try_acquire(REFILL_LEASE_KEY, Duration::from_secs(60))
        .await
        .unwrap()
        .expect("lease should be free");

    let summary = h.ticker.tick(Utc::now()).await.unwrap();

    assert_eq!(summary, TickSummary::default());
    assert!(h.jobs.created().is_empty());
}

#[tokio::test]
async fn test_item_lease_held_elsewhere_drops_item() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let schedule = overdue(&[]);
    h.add_schedule(&schedule).await.unwrap();

    let item = schedule.queue_item();
    h.queue.push(&item, 0).await.unwrap();
    h.leases
        .try_acquire(&schedule_lease_key(&item), Duration::from_secs(300))
        .await
        .unwrap()
        .expect("lease should be free");

    let summary = h.ticker.tick(Utc::now()).await.unwrap();

    assert_eq!(summary.dispatched, 1);
    assert_eq!(summary.triggered, 0);
    assert!(h.jobs.created().is_empty());
    assert_eq!(h.queue.len().await.unwrap(), 0);
}

#[tokio::test]
async fn test_item_lease_released_after_dispatch() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let schedule = overdue(&["0 0 * * * *"]);
    h.add_schedule(&schedule).await.unwrap();

    h.ticker.tick(Utc::now()).await.unwrap();

    assert!(!h.leases.is_held(&schedule_lease_key(&schedule.queue_item())).await);
}

#[tokio::test]
async fn test_concurrent_tickers_do_not_double_trigger() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(101..=103));
    h.add_schedule(&overdue(&["0 0 * * * *"])).await.unwrap();

    let other = ScheduleTicker::new(
        h.engine.clone(),
        h.schedules.clone(),
        h.queue.clone(),
        h.leases.clone(),
        SchedulerConfig::default(),
    );

    let now = Utc::now();
    let (a, b) = tokio::join!(h.ticker.tick(now), other.tick(now));
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(a.refilled as usize + b.refilled as usize, 1);
    assert_eq!(a.triggered + b.triggered, 1);
    assert_eq!(h.jobs.created_orders(), vec![101]);
}

#[tokio::test]
async fn test_trigger_now_ignores_cadence() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.add_schedule(&overdue(&[])).await.unwrap();

    assert!(h.ticker.trigger_now(&stream_id(), &template_id()).await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101]);
}

#[tokio::test]
async fn test_trigger_now_respects_item_lease() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let schedule = overdue(&[]);
    h.add_schedule(&schedule).await.unwrap();
    h.leases
        .try_acquire(&schedule_lease_key(&schedule.queue_item()), Duration::from_secs(300))
        .await
        .unwrap()
        .expect("lease should be free");

    assert!(!h.ticker.trigger_now(&stream_id(), &template_id()).await.unwrap());
    assert!(h.jobs.created().is_empty());
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let h = harness();
    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();

    let stopped = tokio::time::timeout(Duration::from_secs(5), h.ticker.run(rx)).await;
    assert!(stopped.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_run_stops_during_slow_tick() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.commits.set_find_delay(Duration::from_secs(100));
    h.add_schedule(&overdue(&["0 0 * * * *"])).await.unwrap();
    let (tx, rx) = watch::channel(false);

    let stop = async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        tx.send(true).unwrap();
    };
    let (stopped, ()) = tokio::join!(
        tokio::time::timeout(Duration::from_secs(10), h.ticker.run(rx)),
        stop
    );

    assert!(stopped.is_ok());
    assert_eq!(h.commits.find_calls(), 1);
    assert!(h.jobs.created().is_empty());
}
