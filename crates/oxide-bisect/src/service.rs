//! Bisect task operations for callers outside the ticker.

use crate::config::BisectConfig;
use oxide_core::bisect::{
    BisectTask, BisectTaskQuery, BisectTaskState, BisectTaskUpdate, CreateBisectTaskOptions,
};
use oxide_core::commit::CommitIdWithOrder;
use oxide_core::ids::{BisectTaskId, JobId};
use oxide_core::job::{JobStepOutcome, JobStepRef};
use oxide_core::ports::{BisectTaskRepository, JobStore};
use oxide_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// User-requested changes to a bisect task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBisectTaskOptions {
    #[serde(default)]
    pub state: Option<BisectTaskState>,
    #[serde(default)]
    pub include_commit_ids: Vec<CommitIdWithOrder>,
    #[serde(default)]
    pub exclude_commit_ids: Vec<CommitIdWithOrder>,
    #[serde(default)]
    pub include_job_ids: Vec<JobId>,
    #[serde(default)]
    pub exclude_job_ids: Vec<JobId>,
}

impl From<UpdateBisectTaskOptions> for BisectTaskUpdate {
    fn from(options: UpdateBisectTaskOptions) -> Self {
        Self {
            state: options.state,
            include_commit_ids: options.include_commit_ids,
            exclude_commit_ids: options.exclude_commit_ids,
            include_job_ids: options.include_job_ids,
            exclude_job_ids: options.exclude_job_ids,
            ..Default::default()
        }
    }
}

pub struct BisectService {
    tasks: Arc<dyn BisectTaskRepository>,
    jobs: Arc<dyn JobStore>,
    config: BisectConfig,
}

impl BisectService {
    pub fn new(
        tasks: Arc<dyn BisectTaskRepository>,
        jobs: Arc<dyn JobStore>,
        config: BisectConfig,
    ) -> Self {
        Self {
            tasks,
            jobs,
            config,
        }
    }

    /// Start searching for the commit where `node_name` in `job_id` first
    /// produced `outcome`.
    pub async fn create(
        &self,
        job_id: JobId,
        node_name: &str,
        outcome: JobStepOutcome,
        owner_id: &str,
        options: CreateBisectTaskOptions,
    ) -> Result<BisectTask> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or_else(|| Error::JobNotFound(job_id.to_string()))?;
        let step = job.find_step(node_name).ok_or_else(|| Error::StepNotFound {
            job: job_id.to_string(),
            step: node_name.to_string(),
        })?;

        let task = BisectTask::new(
            owner_id,
            job.stream_id.clone(),
            job.template_id.clone(),
            JobStepRef::from_job(&job, step),
            outcome,
            options,
        );
        self.tasks.create(&task).await?;

        info!(
            task_id = %task.id,
            job_id = %job_id,
            node = node_name,
            outcome = outcome.as_str(),
            commit = %task.initial_commit_id,
            "Created bisect task"
        );
        Ok(task)
    }

    pub async fn get(&self, id: BisectTaskId) -> Result<Option<BisectTask>> {
        self.tasks.get(id).await
    }

    pub async fn find(&self, query: &BisectTaskQuery) -> Result<Vec<BisectTask>> {
        self.tasks.find(query).await
    }

    /// Apply a user update, re-reading and retrying on concurrent changes.
    pub async fn update(
        &self,
        id: BisectTaskId,
        options: UpdateBisectTaskOptions,
    ) -> Result<BisectTask> {
        let update = BisectTaskUpdate::from(options);
        let attempts = self.config.max_update_attempts.max(1);

        for attempt in 1..=attempts {
            let task = self
                .tasks
                .get(id)
                .await?
                .ok_or_else(|| Error::BisectTaskNotFound(id.to_string()))?;
            if update.is_empty() {
                return Ok(task);
            }
            if let Some(updated) = self.tasks.try_update(&task, &update).await? {
                info!(task_id = %id, state = updated.state.as_str(), "Updated bisect task");
                return Ok(updated);
            }
            debug!(task_id = %id, attempt, "Bisect task changed since read; retrying");
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
    fn test_update_options_from_json() {
        let options: UpdateBisectTaskOptions = serde_json::from_str(
            r#"{"exclude_commit_ids": [{"order": 95}], "state": "running"}"#,
        )
        .unwrap();
        let update = BisectTaskUpdate::from(options);
        assert_eq!(update.state, Some(BisectTaskState::Running));
        assert_eq!(update.exclude_commit_ids, vec![CommitIdWithOrder::new(95)]);
        assert!(update.add_step.is_none());
    }

    #[test]
    fn test_empty_options_make_empty_update() {
        assert!(BisectTaskUpdate::from(UpdateBisectTaskOptions::default()).is_empty());
    }
}
