//! In-memory implementations of the persistence ports.
//!
//! These back single-process deployments and tests. They honour the same
//! contracts as the PostgreSQL repositories, including conditional updates
//! for bisect tasks and lease expiry.

use async_trait::async_trait;
use oxide_core::Result;
use oxide_core::bisect::{BisectTask, BisectTaskQuery, BisectTaskState, BisectTaskUpdate};
use oxide_core::ids::{BisectTaskId, StreamId, TemplateId};
use oxide_core::lease::LeaseToken;
use oxide_core::ports::{BisectTaskRepository, LeaseProvider, ScheduleRepository};
use oxide_core::schedule::Schedule;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    schedules: RwLock<HashMap<(StreamId, TemplateId), Schedule>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn get(
        &self,
        stream_id: &StreamId,
        template_id: &TemplateId,
    ) -> Result<Option<Schedule>> {
        let schedules = self.schedules.read().await;
        Ok(schedules
            .get(&(stream_id.clone(), template_id.clone()))
            .cloned())
    }

    async fn find(&self, enabled_only: bool) -> Result<Vec<Schedule>> {
        let schedules = self.schedules.read().await;
        let mut found: Vec<Schedule> = schedules
            .values()
            .filter(|s| !enabled_only || s.config.enabled)
            .cloned()
            .collect();
        found.sort_by(|a, b| {
            (&a.stream_id, &a.template_id).cmp(&(&b.stream_id, &b.template_id))
        });
        Ok(found)
    }

    async fn upsert_config(&self, schedule: &Schedule) -> Result<()> {
        let mut schedules = self.schedules.write().await;
        let key = (schedule.stream_id.clone(), schedule.template_id.clone());
        match schedules.get_mut(&key) {
            Some(existing) => existing.config = schedule.config.clone(),
            None => {
                schedules.insert(
                    key,
                    Schedule::new(
                        schedule.stream_id.clone(),
                        schedule.template_id.clone(),
                        schedule.config.clone(),
                    ),
                );
            }
        }
        Ok(())
    }

    async fn save_state(&self, schedule: &Schedule) -> Result<()> {
        let mut schedules = self.schedules.write().await;
        let key = (schedule.stream_id.clone(), schedule.template_id.clone());
        let Some(existing) = schedules.get_mut(&key) else {
            return Err(oxide_core::Error::ScheduleNotFound {
                stream: schedule.stream_id.to_string(),
                template: schedule.template_id.to_string(),
            });
        };
        existing.last_trigger_commit_id = schedule.last_trigger_commit_id.clone();
        existing.last_trigger_time = schedule.last_trigger_time;
        existing.active_jobs = schedule.active_jobs.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBisectTaskRepository {
    tasks: RwLock<HashMap<BisectTaskId, BisectTask>>,
}

impl InMemoryBisectTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BisectTaskRepository for InMemoryBisectTaskRepository {
    async fn create(&self, task: &BisectTask) -> Result<()> {
        self.tasks.write().await.insert(task.id, task.clone());
        Ok(())
    }

    async fn get(&self, id: BisectTaskId) -> Result<Option<BisectTask>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    async fn find(&self, query: &BisectTaskQuery) -> Result<Vec<BisectTask>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<BisectTask> =
            tasks.values().filter(|t| query.matches(t)).cloned().collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        if let Some(max) = query.max_results {
            found.truncate(max);
        }
        Ok(found)
    }

    async fn find_active(&self) -> Result<Vec<BisectTask>> {
        let tasks = self.tasks.read().await;
        let mut found: Vec<BisectTask> = tasks
            .values()
            .filter(|t| t.state == BisectTaskState::Running)
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn try_update(
        &self,
        task: &BisectTask,
        update: &BisectTaskUpdate,
    ) -> Result<Option<BisectTask>> {
        let mut tasks = self.tasks.write().await;
        let Some(stored) = tasks.get_mut(&task.id) else {
            return Ok(None);
        };
        if stored.update_idx != task.update_idx {
            return Ok(None);
        }
        let next = stored.apply(update);
        *stored = next.clone();
        Ok(Some(next))
    }
}

/// Process-local leases keyed by name.
#[derive(Default)]
pub struct InMemoryLeaseProvider {
    leases: Mutex<HashMap<String, (LeaseToken, Instant)>>,
}

impl InMemoryLeaseProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an unexpired lease is currently held for `key`.
    pub async fn is_held(&self, key: &str) -> bool {
        let leases = self.leases.lock().await;
        leases
            .get(key)
            .is_some_and(|(_, expires)| *expires > Instant::now())
    }
}

#[async_trait]
impl LeaseProvider for InMemoryLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>> {
        let mut leases = self.leases.lock().await;
        let now = Instant::now();
        if let Some((_, expires)) = leases.get(key)
            && *expires > now
        {
            return Ok(None);
        }
        let token = LeaseToken::new();
        leases.insert(key.to_string(), (token, now + ttl));
        Ok(Some(token))
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<()> {
        let mut leases = self.leases.lock().await;
        if leases.get(key).is_some_and(|(held, _)| held == token) {
            leases.remove(key);
        }
        Ok(())
    }
}
