//! Port traits (hexagonal architecture).
//!
//! These traits define the interfaces between the scheduling and bisection
//! engines and the external collaborators they depend on.

use crate::Result;
use crate::bisect::{BisectTask, BisectTaskQuery, BisectTaskUpdate};
use crate::commit::{Commit, CommitIdWithOrder, CommitQuery};
use crate::ids::*;
use crate::job::{CreateJobRequest, Job, JobQuery, JobStepRef, StepHistoryQuery};
use crate::lease::LeaseToken;
use crate::schedule::{FileFilter, Schedule, ScheduleQueueItem};
use crate::stream::StreamConfig;
use async_trait::async_trait;
use std::time::Duration;

/// Ordered, filterable view over the commits of a stream.
#[async_trait]
pub trait CommitHistory: Send + Sync {
    /// Find commits matching a query, newest first.
    async fn find(&self, stream_id: &StreamId, query: &CommitQuery) -> Result<Vec<Commit>>;

    /// Get the most recent code-affecting commit at or before `commit_id`.
    async fn last_code_change(
        &self,
        stream_id: &StreamId,
        commit_id: &CommitIdWithOrder,
    ) -> Result<Option<Commit>>;

    /// Check whether a commit touches files accepted by a filter.
    async fn matches_file_filter(
        &self,
        stream_id: &StreamId,
        commit: &Commit,
        filter: &FileFilter,
    ) -> Result<bool>;

    /// Submit a new commit touching `path`, returning it.
    async fn submit_synthetic(
        &self,
        stream_id: &StreamId,
        path: &str,
        description: &str,
    ) -> Result<Commit>;
}

/// Store of jobs and their step outcomes.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a new job.
    async fn create(&self, request: CreateJobRequest) -> Result<Job>;

    /// Get a job by ID.
    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Find jobs, newest commit first.
    async fn find(&self, query: &JobQuery) -> Result<Vec<Job>>;

    /// Find the history of a node across jobs, newest commit first.
    async fn find_step_history(&self, query: &StepHistoryQuery) -> Result<Vec<JobStepRef>>;
}

/// Source of stream and template configuration.
#[async_trait]
pub trait StreamConfigSource: Send + Sync {
    /// Get a stream's configuration, or `None` if it no longer exists.
    async fn get_stream(&self, id: &StreamId) -> Result<Option<StreamConfig>>;
}

/// Distributed lease with a time-to-live.
#[async_trait]
pub trait LeaseProvider: Send + Sync {
    /// Try to take the lease for `key`. Returns `None` if another holder
    /// owns an unexpired lease.
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>>;

    /// Release a lease. Releasing with a stale token is a no-op.
    async fn release(&self, key: &str, token: &LeaseToken) -> Result<()>;
}

/// Cross-instance queue of schedules, scored by due time.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Add an item, replacing its score if already present.
    async fn push(&self, item: &ScheduleQueueItem, score: i64) -> Result<()>;

    /// Pop the lowest-scored item whose score is at most `max_score`.
    async fn pop_lowest(&self, max_score: i64) -> Result<Option<ScheduleQueueItem>>;

    /// Remove an item.
    async fn remove(&self, item: &ScheduleQueueItem) -> Result<()>;

    /// Number of queued items.
    async fn len(&self) -> Result<usize>;
}

/// Repository for schedules.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// Get the schedule for a stream and template.
    async fn get(&self, stream_id: &StreamId, template_id: &TemplateId)
    -> Result<Option<Schedule>>;

    /// List schedules.
    async fn find(&self, enabled_only: bool) -> Result<Vec<Schedule>>;

    /// Create a schedule or replace its configuration, keeping trigger state.
    async fn upsert_config(&self, schedule: &Schedule) -> Result<()>;

    /// Persist trigger state (last trigger commit and time, active jobs).
    async fn save_state(&self, schedule: &Schedule) -> Result<()>;
}

/// Repository for bisect tasks with optimistic concurrency.
#[async_trait]
pub trait BisectTaskRepository: Send + Sync {
    /// Create a new task.
    async fn create(&self, task: &BisectTask) -> Result<()>;

    /// Get a task by ID.
    async fn get(&self, id: BisectTaskId) -> Result<Option<BisectTask>>;

    /// Find tasks, newest first.
    async fn find(&self, query: &BisectTaskQuery) -> Result<Vec<BisectTask>>;

    /// Find tasks that are still running.
    async fn find_active(&self) -> Result<Vec<BisectTask>>;

    /// Apply an update if the stored `update_idx` still equals `task.update_idx`.
    ///
    /// Returns the new version, or `None` if the task changed since it was read.
    async fn try_update(
        &self,
        task: &BisectTask,
        update: &BisectTaskUpdate,
    ) -> Result<Option<BisectTask>>;
}
