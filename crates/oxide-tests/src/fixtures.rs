//! Test fixtures for creating sample data.

use chrono::Utc;
use oxide_core::commit::{Commit, CommitIdWithOrder, CommitTag};
use oxide_core::ids::{BatchId, JobId, StepId, StreamId, TemplateId};
use oxide_core::job::{JobStepOutcome, JobStepRef};
use oxide_core::schedule::{Schedule, ScheduleConfig};
use oxide_core::stream::{StreamConfig, TemplateConfig};
use std::collections::HashMap;

pub const STREAM: &str = "ue5-main";
pub const TEMPLATE: &str = "incremental";
pub const NODE: &str = "Compile Editor";

pub fn stream_id() -> StreamId {
    StreamId::new(STREAM)
}

pub fn template_id() -> TemplateId {
    TemplateId::new(TEMPLATE)
}

/// Factory for creating test commits.
pub struct CommitFixture;

impl CommitFixture {
    /// A code change.
    pub fn code(order: i64) -> Commit {
        Self::with_description(order, &format!("Change {}", order))
    }

    /// A content-only change.
    pub fn content(order: i64) -> Commit {
        Commit {
            tags: vec![CommitTag::content()],
            ..Self::code(order)
        }
    }

    pub fn with_description(order: i64, description: &str) -> Commit {
        Commit {
            id: CommitIdWithOrder::new(order),
            stream_id: stream_id(),
            author: "dev".to_string(),
            description: description.to_string(),
            tags: vec![CommitTag::code()],
            date_utc: Utc::now(),
        }
    }

    /// Code changes for every order in the range.
    pub fn range(orders: std::ops::RangeInclusive<i64>) -> Vec<Commit> {
        orders.map(Self::code).collect()
    }
}

/// Factory for creating test streams.
pub struct StreamFixture;

impl StreamFixture {
    /// The test stream with the given templates.
    pub fn with_templates(templates: &[&str]) -> StreamConfig {
        StreamConfig {
            id: stream_id(),
            name: "UE5 Main".to_string(),
            paused_until: None,
            pause_comment: None,
            templates: templates
                .iter()
                .map(|t| (TemplateId::new(*t), TemplateConfig::new(*t, format!("{} build", t))))
                .collect::<HashMap<_, _>>(),
        }
    }

    pub fn simple() -> StreamConfig {
        Self::with_templates(&[TEMPLATE])
    }
}

/// Factory for creating test schedules.
pub struct ScheduleFixture;

impl ScheduleFixture {
    pub fn with_config(config: ScheduleConfig) -> Schedule {
        Schedule::new(stream_id(), template_id(), config)
    }

    /// Hourly schedule building up to `max_changes` per tick.
    pub fn hourly(max_changes: u32) -> Schedule {
        Self::with_config(ScheduleConfig {
            max_changes,
            patterns: vec!["0 0 * * * *".to_string()],
            ..Default::default()
        })
    }
}

/// A resolved step reference for the test node.
pub fn step_ref(job_id: JobId, order: i64, outcome: Option<JobStepOutcome>) -> JobStepRef {
    JobStepRef {
        job_id,
        batch_id: BatchId::new("batch-1"),
        step_id: StepId::new(NODE),
        node_name: NODE.to_string(),
        commit_id: CommitIdWithOrder::new(order),
        outcome,
    }
}
