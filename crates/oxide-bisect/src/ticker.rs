//! Periodic driver for active bisect tasks.

use crate::config::BisectConfig;
use crate::engine::BisectEngine;
use oxide_core::bisect::BisectTaskState;
use oxide_core::ids::BisectTaskId;
use oxide_core::lease::Lease;
use oxide_core::ports::{BisectTaskRepository, LeaseProvider};
use oxide_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Lease key guarding evaluation of a bisect task.
pub fn task_lease_key(id: BisectTaskId) -> String {
    format!("bisect/{}", id)
}

/// Counters for a single tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BisectTickSummary {
    /// Active tasks found.
    pub tasks: usize,
    /// Tasks evaluated under their lease.
    pub evaluated: usize,
    /// Tasks skipped because another instance held the lease.
    pub skipped: usize,
    /// Tasks whose evaluation failed.
    pub failed: usize,
}

pub struct BisectTicker {
    engine: Arc<BisectEngine>,
    tasks: Arc<dyn BisectTaskRepository>,
    leases: Arc<dyn LeaseProvider>,
    config: BisectConfig,
}

impl BisectTicker {
    pub fn new(
        engine: Arc<BisectEngine>,
        tasks: Arc<dyn BisectTaskRepository>,
        leases: Arc<dyn LeaseProvider>,
        config: BisectConfig,
    ) -> Self {
        Self {
            engine,
            tasks,
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
            "Starting bisect ticker"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.wait_for(|stop| *stop) => break,
            }

            tokio::select! {
                result = self.tick() => match result {
                    Ok(summary) => debug!(?summary, "Bisect tick complete"),
                    Err(e) => error!(error = %e, "Bisect tick failed"),
                },
                _ = shutdown.wait_for(|stop| *stop) => {
                    warn!("Bisect tick interrupted by shutdown");
                    break;
                }
            }
        }

        info!("Bisect ticker shutting down");
    }

    /// Evaluate every running task once.
    pub async fn tick(&self) -> Result<BisectTickSummary> {
        let active = self.tasks.find_active().await?;
        let mut summary = BisectTickSummary {
            tasks: active.len(),
            ..Default::default()
        };

        for task in active {
            match self.process(task.id).await {
                Ok(Some(_)) => summary.evaluated += 1,
                Ok(None) => summary.skipped += 1,
                Err(e) => {
                    summary.failed += 1;
                    error!(
                        task_id = %task.id,
                        stream_id = %task.stream_id,
                        template_id = %task.template_id,
                        node = %task.node_name,
                        error = %e,
                        "Failed to evaluate bisect task"
                    );
                }
            }
        }

        Ok(summary)
    }

    /// Evaluate one task under its lease.
    ///
    /// Returns the task's state afterwards, or `None` if the lease is held
    /// elsewhere.
    pub async fn process(&self, id: BisectTaskId) -> Result<Option<BisectTaskState>> {
        let Some(lease) = Lease::acquire(
            Arc::clone(&self.leases),
            task_lease_key(id),
            self.config.task_lease_ttl(),
        )
        .await?
        else {
            debug!(task_id = %id, "Bisect task lease held elsewhere; skipping");
            return Ok(None);
        };

        let result = self.evaluate_with_retry(id).await;

        if let Err(e) = lease.release().await {
            warn!(task_id = %id, error = %e, "Failed to release bisect task lease");
        }
        result.map(Some)
    }

    /// Read, evaluate and conditionally write, starting over from a fresh
    /// read whenever the task changed underneath.
    async fn evaluate_with_retry(&self, id: BisectTaskId) -> Result<BisectTaskState> {
        let attempts = self.config.max_update_attempts.max(1);
        for attempt in 1..=attempts {
            let task = self
                .tasks
                .get(id)
                .await?
                .ok_or_else(|| Error::BisectTaskNotFound(id.to_string()))?;
            if task.state.is_terminal() {
                return Ok(task.state);
            }

            let evaluation = self.engine.evaluate(&task).await?;
            let Some(update) = evaluation.update else {
                return Ok(evaluation.state);
            };

            match self.tasks.try_update(&task, &update).await? {
                Some(updated) => {
                    if updated.state != task.state {
                        info!(
                            task_id = %id,
                            from = task.state.as_str(),
                            to = updated.state.as_str(),
                            "Bisect task state changed"
                        );
                    }
                    return Ok(updated.state);
                }
                None => {
                    debug!(task_id = %id, attempt, "Bisect task changed since read; retrying");
                }
            }
        }

        Err(Error::UpdateConflict {
            entity: format!("bisect task {}", id),
            attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_lease_key() {
        let id = BisectTaskId::new();
        assert_eq!(task_lease_key(id), format!("bisect/bis_{}", id.as_uuid()));
    }
}
