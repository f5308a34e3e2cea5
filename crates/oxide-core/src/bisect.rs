//! Bisect task types.
//!
//! A bisect task searches the commit history of a stream for the first
//! commit at which a node started producing a given outcome. Tasks are
//! versioned by `update_idx`; every mutation goes through
//! [`BisectTask::apply`] and a conditional write on the previous index.

use crate::commit::{CommitIdWithOrder, CommitTag};
use crate::ids::{BisectTaskId, JobId, StreamId, TemplateId};
use crate::job::{JobStepOutcome, JobStepRef};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BisectTaskState {
    Running,
    Succeeded,
    MissingHistory,
    MissingStream,
    MissingTemplate,
    MissingJob,
}

impl BisectTaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, BisectTaskState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BisectTaskState::Running => "running",
            BisectTaskState::Succeeded => "succeeded",
            BisectTaskState::MissingHistory => "missing_history",
            BisectTaskState::MissingStream => "missing_stream",
            BisectTaskState::MissingTemplate => "missing_template",
            BisectTaskState::MissingJob => "missing_job",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BisectTask {
    pub id: BisectTaskId,
    pub owner_id: String,
    pub stream_id: StreamId,
    pub template_id: TemplateId,
    pub node_name: String,
    pub outcome: JobStepOutcome,
    pub initial_job_step: JobStepRef,
    pub initial_commit_id: CommitIdWithOrder,
    /// Most recent confirmed-bad point.
    pub current_job_step: JobStepRef,
    pub current_commit_id: CommitIdWithOrder,
    /// Most recent confirmed-good point, once established.
    #[serde(default)]
    pub min_job_step: Option<JobStepRef>,
    #[serde(default)]
    pub min_commit_id: Option<CommitIdWithOrder>,
    #[serde(default)]
    pub steps: Vec<JobStepRef>,
    #[serde(default)]
    pub commit_tags: Vec<CommitTag>,
    #[serde(default)]
    pub ignore_commit_ids: Vec<CommitIdWithOrder>,
    #[serde(default)]
    pub ignore_job_ids: Vec<JobId>,
    pub state: BisectTaskState,
    pub update_idx: u32,
    pub created_at: DateTime<Utc>,
}

impl BisectTask {
    /// Start a new search from a step with the target outcome.
    pub fn new(
        owner_id: impl Into<String>,
        stream_id: StreamId,
        template_id: TemplateId,
        initial_job_step: JobStepRef,
        outcome: JobStepOutcome,
        options: CreateBisectTaskOptions,
    ) -> Self {
        let commit_id = initial_job_step.commit_id.clone();
        Self {
            id: BisectTaskId::new(),
            owner_id: owner_id.into(),
            stream_id,
            template_id,
            node_name: initial_job_step.node_name.clone(),
            outcome,
            initial_job_step: initial_job_step.clone(),
            initial_commit_id: commit_id.clone(),
            current_job_step: initial_job_step,
            current_commit_id: commit_id,
            min_job_step: None,
            min_commit_id: None,
            steps: vec![],
            commit_tags: options.commit_tags,
            ignore_commit_ids: options.ignore_commit_ids,
            ignore_job_ids: options.ignore_job_ids,
            state: BisectTaskState::Running,
            update_idx: 0,
            created_at: Utc::now(),
        }
    }

    pub fn is_ignored_commit(&self, commit: &CommitIdWithOrder) -> bool {
        self.ignore_commit_ids.contains(commit)
    }

    pub fn is_ignored_job(&self, job: &JobId) -> bool {
        self.ignore_job_ids.contains(job)
    }

    /// Produce the next version of this task with `update` applied.
    ///
    /// Changing either ignore set resumes the search from the existing
    /// bounds unless the update also forces a state.
    pub fn apply(&self, update: &BisectTaskUpdate) -> BisectTask {
        let mut next = self.clone();
        next.update_idx = self.update_idx + 1;

        if let Some(step) = &update.current_job_step {
            next.current_commit_id = step.commit_id.clone();
            next.current_job_step = step.clone();
        }
        if let Some(step) = &update.min_job_step {
            next.min_commit_id = Some(step.commit_id.clone());
            next.min_job_step = Some(step.clone());
        }
        if let Some(step) = &update.add_step {
            next.steps.push(step.clone());
        }

        let mut ignore_changed = false;
        for commit in &update.include_commit_ids {
            if let Some(pos) = next.ignore_commit_ids.iter().position(|c| c == commit) {
                next.ignore_commit_ids.remove(pos);
                ignore_changed = true;
            }
        }
        for commit in &update.exclude_commit_ids {
            if !next.ignore_commit_ids.contains(commit) {
                next.ignore_commit_ids.push(commit.clone());
                ignore_changed = true;
            }
        }
        for job in &update.include_job_ids {
            if let Some(pos) = next.ignore_job_ids.iter().position(|j| j == job) {
                next.ignore_job_ids.remove(pos);
                ignore_changed = true;
            }
        }
        for job in &update.exclude_job_ids {
            if !next.ignore_job_ids.contains(job) {
                next.ignore_job_ids.push(*job);
                ignore_changed = true;
            }
        }

        match update.state {
            Some(state) => next.state = state,
            None if ignore_changed => next.state = BisectTaskState::Running,
            None => {}
        }

        next
    }
}

/// Options supplied when a bisect task is created.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CreateBisectTaskOptions {
    #[serde(default)]
    pub commit_tags: Vec<CommitTag>,
    #[serde(default)]
    pub ignore_commit_ids: Vec<CommitIdWithOrder>,
    #[serde(default)]
    pub ignore_job_ids: Vec<JobId>,
}

/// A set of changes to a bisect task, applied atomically.
#[derive(Debug, Clone, Default)]
pub struct BisectTaskUpdate {
    pub state: Option<BisectTaskState>,
    pub current_job_step: Option<JobStepRef>,
    pub min_job_step: Option<JobStepRef>,
    pub add_step: Option<JobStepRef>,
    pub include_commit_ids: Vec<CommitIdWithOrder>,
    pub exclude_commit_ids: Vec<CommitIdWithOrder>,
    pub include_job_ids: Vec<JobId>,
    pub exclude_job_ids: Vec<JobId>,
}

impl BisectTaskUpdate {
    pub fn state(state: BisectTaskState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.current_job_step.is_none()
            && self.min_job_step.is_none()
            && self.add_step.is_none()
            && self.include_commit_ids.is_empty()
            && self.exclude_commit_ids.is_empty()
            && self.include_job_ids.is_empty()
            && self.exclude_job_ids.is_empty()
    }
}

/// Filter for listing bisect tasks.
#[derive(Debug, Clone, Default)]
pub struct BisectTaskQuery {
    pub stream_id: Option<StreamId>,
    pub template_id: Option<TemplateId>,
    pub owner_id: Option<String>,
    pub state: Option<BisectTaskState>,
    pub max_results: Option<usize>,
}

impl BisectTaskQuery {
    pub fn matches(&self, task: &BisectTask) -> bool {
        self.stream_id.as_ref().is_none_or(|s| *s == task.stream_id)
            && self.template_id.as_ref().is_none_or(|t| *t == task.template_id)
            && self.owner_id.as_ref().is_none_or(|o| *o == task.owner_id)
            && self.state.is_none_or(|s| s == task.state)
    }
}
