//! Periodic schedule ticker.
//!
//! Each tick refills the shared work queue with every enabled schedule's next
//! trigger time, then drains the items that are due. Refill is guarded by a
//! global lease held to expiry; each dispatched item is guarded by its own
//! lease so a schedule is evaluated by at most one instance at a time.

use crate::cadence::next_trigger_time;
use crate::config::SchedulerConfig;
use crate::trigger::TriggerEngine;
use chrono::{DateTime, Utc};
use oxide_core::Result;
use oxide_core::ids::{StreamId, TemplateId};
use oxide_core::lease::Lease;
use oxide_core::ports::{LeaseProvider, ScheduleRepository, WorkQueue};
use oxide_core::schedule::ScheduleQueueItem;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Lease key guarding queue refill.
pub const REFILL_LEASE_KEY: &str = "scheduler/refill";

/// Lease key guarding evaluation of a single schedule.
pub fn schedule_lease_key(item: &ScheduleQueueItem) -> String {
    format!("scheduler/schedule/{}/{}", item.stream_id, item.template_id)
}

/// Counters for a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    /// Whether this instance refilled the queue.
    pub refilled: bool,
    /// Schedules pushed during refill.
    pub queued: usize,
    /// Items popped from the queue.
    pub dispatched: usize,
    /// Items that started at least one job.
    pub triggered: usize,
}

pub struct ScheduleTicker {
    engine: Arc<TriggerEngine>,
    schedules: Arc<dyn ScheduleRepository>,
    queue: Arc<dyn WorkQueue>,
    leases: Arc<dyn LeaseProvider>,
    config: SchedulerConfig,
}

impl ScheduleTicker {
    pub fn new(
        engine: Arc<TriggerEngine>,
        schedules: Arc<dyn ScheduleRepository>,
        queue: Arc<dyn WorkQueue>,
        leases: Arc<dyn LeaseProvider>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            schedules,
            queue,
            leases,
            config,
        }
    }

    /// Run the ticker until shutdown is signalled or the sender is dropped.
    ///
    /// A tick in flight is abandoned at its next suspension point.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.config.tick_interval());

        info!(
            interval_secs = self.config.tick_interval_secs,
            "Starting schedule ticker"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            tokio::select! {
                result = self.tick(Utc::now()) => match result {
                    Ok(summary) => debug!(?summary, "Schedule tick complete"),
                    Err(e) => error!(error = %e, "Schedule tick failed"),
                },
                _ = shutdown.wait_for(|stop| *stop) => {
                    warn!("Schedule tick interrupted by shutdown");
                    break;
                }
            }
        }

        info!("Schedule ticker shutting down");
    }

    /// Refill the queue if this instance wins the refill lease, then
    /// dispatch every item due at `now`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickSummary> {
        let mut summary = TickSummary::default();

        if let Some(queued) = self.refill(now).await? {
            summary.refilled = true;
            summary.queued = queued;
        }

        while summary.dispatched < self.config.max_items_per_tick {
            let Some(item) = self.queue.pop_lowest(now.timestamp()).await? else {
                break;
            };
            summary.dispatched += 1;
            if self.dispatch(&item, now).await {
                summary.triggered += 1;
            }
        }

        Ok(summary)
    }

    /// Push every enabled schedule with its next trigger time.
    ///
    /// Returns `None` if another instance holds the refill lease.
    async fn refill(&self, now: DateTime<Utc>) -> Result<Option<usize>> {
        let Some(lease) = Lease::acquire(
            Arc::clone(&self.leases),
            REFILL_LEASE_KEY,
            self.config.refill_lease_ttl(),
        )
        .await?
        else {
            debug!("Refill lease held elsewhere");
            return Ok(None);
        };
        // Held to expiry so refill runs at most once per TTL
        lease.forget();

        let mut queued = 0;
        for schedule in self.schedules.find(true).await? {
            let item = schedule.queue_item();
            match next_trigger_time(&schedule, now) {
                Ok(Some(next)) => {
                    self.queue.push(&item, next.timestamp()).await?;
                    queued += 1;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(schedule = %item, error = %e, "Failed to compute next trigger time");
                }
            }
        }

        debug!(queued, "Refilled schedule queue");
        Ok(Some(queued))
    }

    /// Evaluate one popped item under its lease. Returns true if a job started.
    async fn dispatch(&self, item: &ScheduleQueueItem, now: DateTime<Utc>) -> bool {
        let lease = match Lease::acquire(
            Arc::clone(&self.leases),
            schedule_lease_key(item),
            self.config.item_lease_ttl(),
        )
        .await
        {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                debug!(schedule = %item, "Schedule lease held elsewhere; skipping");
                return false;
            }
            Err(e) => {
                error!(schedule = %item, error = %e, "Failed to acquire schedule lease");
                return false;
            }
        };

        let triggered = match self
            .engine
            .trigger(&item.stream_id, &item.template_id, now)
            .await
        {
            Ok(triggered) => triggered,
            Err(e) => {
                error!(schedule = %item, error = %e, "Failed to evaluate schedule");
                false
            }
        };

        if let Err(e) = lease.release().await {
            warn!(schedule = %item, error = %e, "Failed to release schedule lease");
        }
        triggered
    }

    /// Evaluate a schedule immediately, outside the cadence.
    ///
    /// Returns `Ok(false)` without evaluating if another instance is
    /// currently evaluating the same schedule.
    pub async fn trigger_now(&self, stream_id: &StreamId, template_id: &TemplateId) -> Result<bool> {
        let item = ScheduleQueueItem::new(stream_id.clone(), template_id.clone());
        let Some(lease) = Lease::acquire(
            Arc::clone(&self.leases),
            schedule_lease_key(&item),
            self.config.item_lease_ttl(),
        )
        .await?
        else {
            info!(schedule = %item, "Schedule is being evaluated elsewhere");
            return Ok(false);
        };

        info!(schedule = %item, "Triggering schedule on demand");
        let result = self.engine.trigger(stream_id, template_id, Utc::now()).await;
        lease.release().await?;
        result
    }
}
