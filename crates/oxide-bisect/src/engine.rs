//! Bisection engine.
//!
//! Given a task, reads the node's step history to find the current search
//! window and either records a refreshed bound, launches the next probe job,
//! or settles the task in a terminal state. The engine never writes the task
//! itself; it returns the update for the caller to apply conditionally.

use crate::config::BisectConfig;
use oxide_core::bisect::{BisectTask, BisectTaskState, BisectTaskUpdate};
use oxide_core::commit::{CommitIdWithOrder, CommitQuery};
use oxide_core::ids::JobId;
use oxide_core::job::{CreateJobRequest, JobOptions, JobStepRef, StepHistoryQuery};
use oxide_core::ports::{CommitHistory, JobStore, StreamConfigSource};
use oxide_core::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of evaluating a task once.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// State the task is in after the update is applied.
    pub state: BisectTaskState,
    /// Changes to persist, if any.
    pub update: Option<BisectTaskUpdate>,
    /// Probe job launched during this evaluation.
    pub probe: Option<JobId>,
}

impl Evaluation {
    fn wait() -> Self {
        Self {
            state: BisectTaskState::Running,
            update: None,
            probe: None,
        }
    }

    fn settle(state: BisectTaskState, mut update: BisectTaskUpdate) -> Self {
        update.state = Some(state);
        Self {
            state,
            update: Some(update),
            probe: None,
        }
    }
}

/// Search window found in step history.
#[derive(Debug, Clone)]
struct SearchWindow {
    /// Oldest step with the target outcome in the newest run of them.
    current: JobStepRef,
    /// Newest earlier step with a different or unresolved outcome.
    previous: Option<JobStepRef>,
}

pub struct BisectEngine {
    streams: Arc<dyn StreamConfigSource>,
    commits: Arc<dyn CommitHistory>,
    jobs: Arc<dyn JobStore>,
    config: BisectConfig,
}

impl BisectEngine {
    pub fn new(
        streams: Arc<dyn StreamConfigSource>,
        commits: Arc<dyn CommitHistory>,
        jobs: Arc<dyn JobStore>,
        config: BisectConfig,
    ) -> Self {
        Self {
            streams,
            commits,
            jobs,
            config,
        }
    }

    /// Evaluate one step of the search for `task`.
    pub async fn evaluate(&self, task: &BisectTask) -> Result<Evaluation> {
        if self.has_outstanding_probe(task).await? {
            debug!(task_id = %task.id, "Waiting for probe job");
            return Ok(Evaluation::wait());
        }

        let Some(window) = self.find_window(task).await? else {
            info!(task_id = %task.id, node = %task.node_name, "No job with target outcome remains");
            return Ok(Evaluation::settle(
                BisectTaskState::MissingJob,
                BisectTaskUpdate::default(),
            ));
        };

        let current = window.current;
        if current.job_id != task.current_job_step.job_id {
            debug!(
                task_id = %task.id,
                from = %task.current_commit_id,
                to = %current.commit_id,
                "Moving current bound"
            );
            return Ok(Evaluation {
                state: BisectTaskState::Running,
                update: Some(BisectTaskUpdate {
                    current_job_step: Some(current),
                    ..Default::default()
                }),
                probe: None,
            });
        }

        let Some(previous) = window.previous else {
            info!(
                task_id = %task.id,
                commit = %current.commit_id,
                "No earlier job to compare against"
            );
            return Ok(Evaluation::settle(
                BisectTaskState::MissingHistory,
                BisectTaskUpdate::default(),
            ));
        };
        if previous.outcome.is_none() {
            debug!(task_id = %task.id, commit = %previous.commit_id, "Waiting for baseline job");
            return Ok(Evaluation::wait());
        }

        let mut update = BisectTaskUpdate::default();
        if task.min_job_step.is_none() {
            update.min_job_step = Some(previous.clone());
        }

        let Some(stream) = self.streams.get_stream(&task.stream_id).await? else {
            return Ok(Evaluation::settle(BisectTaskState::MissingStream, update));
        };
        let Some(template) = stream.template(&task.template_id).cloned() else {
            return Ok(Evaluation::settle(BisectTaskState::MissingTemplate, update));
        };

        let candidates = self
            .candidates(task, &previous.commit_id, &current.commit_id)
            .await?;
        if candidates.is_empty() {
            info!(
                task_id = %task.id,
                node = %task.node_name,
                commit = %current.commit_id,
                "Bisection complete"
            );
            return Ok(Evaluation::settle(BisectTaskState::Succeeded, update));
        }

        let probe_commit = candidates[candidates.len() / 2].clone();
        let code_commit = self
            .commits
            .last_code_change(&task.stream_id, &probe_commit)
            .await?
            .map(|c| c.id)
            .unwrap_or_else(|| probe_commit.clone());

        let job = self
            .jobs
            .create(CreateJobRequest {
                stream_id: task.stream_id.clone(),
                template,
                commit_id: probe_commit.clone(),
                code_commit_id: code_commit,
                options: JobOptions {
                    name: Some(format!("Bisect: {}", task.node_name)),
                    targets: vec![task.node_name.clone()],
                    bisect_task_id: Some(task.id),
                    ..Default::default()
                },
            })
            .await?;
        let step = job
            .find_step(&task.node_name)
            .ok_or_else(|| Error::StepNotFound {
                job: job.id.to_string(),
                step: task.node_name.clone(),
            })?;

        info!(
            task_id = %task.id,
            job_id = %job.id,
            commit = %probe_commit,
            candidates = candidates.len(),
            window_min = %previous.commit_id,
            window_max = %current.commit_id,
            "Launched bisect probe"
        );

        update.add_step = Some(JobStepRef::from_job(&job, step));
        Ok(Evaluation {
            state: BisectTaskState::Running,
            update: Some(update),
            probe: Some(job.id),
        })
    }

    /// True if the latest probe's job still exists and its node has not finished.
    async fn has_outstanding_probe(&self, task: &BisectTask) -> Result<bool> {
        let Some(last) = task.steps.last() else {
            return Ok(false);
        };
        let Some(job) = self.jobs.get(last.job_id).await? else {
            return Ok(false);
        };
        Ok(job
            .find_step(&task.node_name)
            .is_some_and(|step| !step.state.is_terminal()))
    }

    /// Walk step history down from the current bound.
    async fn find_window(&self, task: &BisectTask) -> Result<Option<SearchWindow>> {
        let page_size = self.config.history_page_size.max(1);
        let mut current: Option<JobStepRef> = None;
        let mut max_commit = Some(task.current_commit_id.clone());

        loop {
            let query = StepHistoryQuery {
                stream_id: task.stream_id.clone(),
                template_id: task.template_id.clone(),
                node_name: task.node_name.clone(),
                max_commit: max_commit.clone(),
                count: page_size,
            };
            let steps = self.jobs.find_step_history(&query).await?;
            let Some(oldest) = steps.last() else {
                break;
            };
            let next_max = oldest.commit_id.predecessor();

            for step in &steps {
                if task.is_ignored_job(&step.job_id) || task.is_ignored_commit(&step.commit_id) {
                    continue;
                }
                if step.outcome == Some(task.outcome) {
                    current = Some(step.clone());
                    continue;
                }
                if let Some(c) = &current
                    && step.commit_id < c.commit_id
                {
                    return Ok(Some(SearchWindow {
                        current: c.clone(),
                        previous: Some(step.clone()),
                    }));
                }
            }

            if steps.len() < page_size {
                break;
            }
            max_commit = Some(next_max);
        }

        Ok(current.map(|current| SearchWindow {
            current,
            previous: None,
        }))
    }

    /// Commits strictly between the window bounds, oldest first.
    async fn candidates(
        &self,
        task: &BisectTask,
        min: &CommitIdWithOrder,
        max: &CommitIdWithOrder,
    ) -> Result<Vec<CommitIdWithOrder>> {
        let page_size = self.config.candidate_page_size.max(1);
        let mut found = Vec::new();
        let mut max_commit = max.predecessor();

        while max_commit > *min {
            let query = CommitQuery {
                min_commit: Some(min.clone()),
                include_min: false,
                max_commit: Some(max_commit.clone()),
                tags: task.commit_tags.clone(),
                limit: page_size,
            };
            let commits = self.commits.find(&task.stream_id, &query).await?;
            let Some(oldest) = commits.last() else {
                break;
            };
            let next_max = oldest.id.predecessor();
            let page_len = commits.len();

            found.extend(
                commits
                    .into_iter()
                    .map(|c| c.id)
                    .filter(|id| !task.is_ignored_commit(id)),
            );

            if page_len < page_size {
                break;
            }
            max_commit = next_max;
        }

        found.sort();
        found.dedup();
        Ok(found)
    }
}
