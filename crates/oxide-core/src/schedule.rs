//! Schedule types.
//!
//! There is one schedule per (stream, template). Its configuration comes
//! from the stream configuration; its trigger state is owned by the schedule
//! ticker and only mutated while holding the schedule's lease.

use crate::commit::{CommitIdWithOrder, CommitTag};
use crate::ids::{JobId, StreamId, TemplateId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Schedule {
    pub stream_id: StreamId,
    pub template_id: TemplateId,
    pub config: ScheduleConfig,
    #[serde(default)]
    pub last_trigger_commit_id: Option<CommitIdWithOrder>,
    #[serde(default)]
    pub last_trigger_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub active_jobs: Vec<JobId>,
}

impl Schedule {
    pub fn new(stream_id: StreamId, template_id: TemplateId, config: ScheduleConfig) -> Self {
        Self {
            stream_id,
            template_id,
            config,
            last_trigger_commit_id: None,
            last_trigger_time: None,
            active_jobs: vec![],
        }
    }

    pub fn queue_item(&self) -> ScheduleQueueItem {
        ScheduleQueueItem::new(self.stream_id.clone(), self.template_id.clone())
    }

    /// Record a commit as triggered. The stored commit never moves backwards.
    pub fn advance_last_trigger(&mut self, commit: &CommitIdWithOrder) {
        match &self.last_trigger_commit_id {
            Some(last) if last >= commit => {}
            _ => self.last_trigger_commit_id = Some(commit.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Maximum number of concurrently active jobs; 0 means unlimited.
    #[serde(default)]
    pub max_active: u32,
    /// Maximum number of changes to build per tick; 0 means one.
    #[serde(default)]
    pub max_changes: u32,
    #[serde(default)]
    pub require_submitted_change: bool,
    #[serde(default)]
    pub gate: Option<ScheduleGate>,
    #[serde(default)]
    pub commit_tags: Vec<CommitTag>,
    #[serde(default)]
    pub files: Option<FileFilter>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    /// Cron expressions describing when the schedule fires.
    #[serde(default)]
    pub patterns: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_active: 0,
            max_changes: 0,
            require_submitted_change: false,
            gate: None,
            commit_tags: vec![],
            files: None,
            parameters: HashMap::new(),
            patterns: vec![],
        }
    }
}

/// Wait for a target in another template to succeed before triggering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ScheduleGate {
    pub template_id: TemplateId,
    pub target: String,
}

/// Ordered include/exclude path rules.
///
/// A rule prefixed with `-` excludes matching paths; any other rule (with an
/// optional leading `+`) includes them. The last matching rule wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct FileFilter {
    pub rules: Vec<String>,
}

impl FileFilter {
    pub fn new<S: Into<String>>(rules: impl IntoIterator<Item = S>) -> Self {
        Self {
            rules: rules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Work queue entry naming a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScheduleQueueItem {
    pub stream_id: StreamId,
    pub template_id: TemplateId,
}

impl ScheduleQueueItem {
    pub fn new(stream_id: StreamId, template_id: TemplateId) -> Self {
        Self {
            stream_id,
            template_id,
        }
    }

    /// Parse the `stream:template` form used as a queue member.
    pub fn parse(s: &str) -> Option<Self> {
        let (stream, template) = s.split_once(':')?;
        if stream.is_empty() || template.is_empty() {
            return None;
        }
        Some(Self::new(StreamId::new(stream), TemplateId::new(template)))
    }
}

impl fmt::Display for ScheduleQueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.stream_id, self.template_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_item_round_trip() {
        let item = ScheduleQueueItem::new(StreamId::new("main"), TemplateId::new("nightly"));
        let parsed = ScheduleQueueItem::parse(&item.to_string()).unwrap();
        assert_eq!(item, parsed);
        assert!(ScheduleQueueItem::parse("no-separator").is_none());
        assert!(ScheduleQueueItem::parse(":template").is_none());
    }

    #[test]
    fn test_last_trigger_never_moves_backwards() {
        let mut schedule = Schedule::new(
            StreamId::new("main"),
            TemplateId::new("ci"),
            ScheduleConfig::default(),
        );
        schedule.advance_last_trigger(&CommitIdWithOrder::new(10));
        schedule.advance_last_trigger(&CommitIdWithOrder::new(7));
        assert_eq!(schedule.last_trigger_commit_id, Some(CommitIdWithOrder::new(10)));
        schedule.advance_last_trigger(&CommitIdWithOrder::new(12));
        assert_eq!(schedule.last_trigger_commit_id, Some(CommitIdWithOrder::new(12)));
    }

    #[test]
    fn test_config_defaults() {
        let config: ScheduleConfig = serde_json::from_str(r#"{"max_active": 2}"#).unwrap();
        assert!(config.enabled);
        assert_eq!(config.max_active, 2);
        assert_eq!(config.max_changes, 0);
        assert!(config.gate.is_none());
    }
}
