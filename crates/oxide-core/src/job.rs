//! Job and job step types.
//!
//! Jobs are executed elsewhere; this crate only reads their step outcomes and
//! asks the job store to create new ones.

use crate::commit::CommitIdWithOrder;
use crate::ids::{BatchId, BisectTaskId, JobId, StepId, StreamId, TemplateId};
use crate::stream::TemplateConfig;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    pub id: JobId,
    pub stream_id: StreamId,
    pub template_id: TemplateId,
    pub name: String,
    pub commit_id: CommitIdWithOrder,
    pub code_commit_id: CommitIdWithOrder,
    #[serde(default)]
    pub steps: Vec<JobStep>,
    #[serde(default)]
    pub started_by_schedule: bool,
    #[serde(default)]
    pub bisect_task_id: Option<BisectTaskId>,
    pub created_at: DateTime<Utc>,
}

impl Job {
    /// Find the step executing the named node.
    pub fn find_step(&self, name: &str) -> Option<&JobStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    /// A job is complete once every step has reached a terminal state.
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.state.is_terminal())
    }

    /// State and outcome of a named target, if the job contains it.
    pub fn target_state(&self, target: &str) -> Option<(JobStepState, JobStepOutcome)> {
        self.find_step(target).map(|s| (s.state, s.outcome))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStep {
    pub batch_id: BatchId,
    pub step_id: StepId,
    pub name: String,
    pub state: JobStepState,
    pub outcome: JobStepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStepState {
    Waiting,
    Ready,
    Running,
    Completed,
    Skipped,
    Aborted,
}

impl JobStepState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStepState::Completed | JobStepState::Skipped | JobStepState::Aborted
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStepOutcome {
    Unspecified,
    Failure,
    Warnings,
    Success,
}

impl JobStepOutcome {
    pub fn is_success_or_warnings(&self) -> bool {
        matches!(self, JobStepOutcome::Success | JobStepOutcome::Warnings)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStepOutcome::Unspecified => "unspecified",
            JobStepOutcome::Failure => "failure",
            JobStepOutcome::Warnings => "warnings",
            JobStepOutcome::Success => "success",
        }
    }
}

/// Reference to a step within a job, with its resolved outcome.
///
/// `outcome` is `None` until the step reaches a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct JobStepRef {
    pub job_id: JobId,
    pub batch_id: BatchId,
    pub step_id: StepId,
    pub node_name: String,
    pub commit_id: CommitIdWithOrder,
    #[serde(default)]
    pub outcome: Option<JobStepOutcome>,
}

impl JobStepRef {
    pub fn from_job(job: &Job, step: &JobStep) -> Self {
        Self {
            job_id: job.id,
            batch_id: step.batch_id.clone(),
            step_id: step.step_id.clone(),
            node_name: step.name.clone(),
            commit_id: job.commit_id.clone(),
            outcome: step.state.is_terminal().then_some(step.outcome),
        }
    }
}

/// Options applied to a newly created job.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOptions {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Restrict execution to these nodes; empty runs the whole graph.
    #[serde(default)]
    pub targets: Vec<String>,
    #[serde(default)]
    pub started_by_schedule: bool,
    #[serde(default)]
    pub bisect_task_id: Option<BisectTaskId>,
}

/// Request to create a job.
#[derive(Debug, Clone)]
pub struct CreateJobRequest {
    pub stream_id: StreamId,
    pub template: TemplateConfig,
    pub commit_id: CommitIdWithOrder,
    pub code_commit_id: CommitIdWithOrder,
    pub options: JobOptions,
}

/// Query over jobs. Results are ordered newest commit first.
#[derive(Debug, Clone, Default)]
pub struct JobQuery {
    pub stream_id: Option<StreamId>,
    pub templates: Vec<TemplateId>,
    pub min_commit: Option<CommitIdWithOrder>,
    pub max_commit: Option<CommitIdWithOrder>,
    pub count: usize,
}

/// Query over the history of a single node across jobs of a template.
/// Results are ordered newest commit first; `max_commit` is inclusive.
#[derive(Debug, Clone)]
pub struct StepHistoryQuery {
    pub stream_id: StreamId,
    pub template_id: TemplateId,
    pub node_name: String,
    pub max_commit: Option<CommitIdWithOrder>,
    pub count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(name: &str, state: JobStepState, outcome: JobStepOutcome) -> JobStep {
        JobStep {
            batch_id: BatchId::new("b1"),
            step_id: StepId::new(name),
            name: name.to_string(),
            state,
            outcome,
        }
    }

    fn job(steps: Vec<JobStep>) -> Job {
        Job {
            id: JobId::new(),
            stream_id: StreamId::new("main"),
            template_id: TemplateId::new("ci"),
            name: "CI".to_string(),
            commit_id: CommitIdWithOrder::new(100),
            code_commit_id: CommitIdWithOrder::new(100),
            steps,
            started_by_schedule: false,
            bisect_task_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_job_complete_requires_all_terminal() {
        let running = job(vec![
            step("Compile", JobStepState::Completed, JobStepOutcome::Success),
            step("Test", JobStepState::Running, JobStepOutcome::Unspecified),
        ]);
        assert!(!running.is_complete());

        let done = job(vec![
            step("Compile", JobStepState::Completed, JobStepOutcome::Success),
            step("Test", JobStepState::Skipped, JobStepOutcome::Unspecified),
        ]);
        assert!(done.is_complete());
    }

    #[test]
    fn test_step_ref_outcome_unresolved_until_terminal() {
        let j = job(vec![step(
            "Test",
            JobStepState::Running,
            JobStepOutcome::Unspecified,
        )]);
        let r = JobStepRef::from_job(&j, &j.steps[0]);
        assert_eq!(r.outcome, None);
        assert_eq!(r.commit_id, CommitIdWithOrder::new(100));

        let j = job(vec![step(
            "Test",
            JobStepState::Completed,
            JobStepOutcome::Failure,
        )]);
        let r = JobStepRef::from_job(&j, &j.steps[0]);
        assert_eq!(r.outcome, Some(JobStepOutcome::Failure));
    }
}
