//! Stream and template configuration.
//!
//! These are owned by the configuration layer; schedules and bisect tasks
//! only look them up.

use crate::ids::{StreamId, TemplateId};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StreamConfig {
    pub id: StreamId,
    pub name: String,
    #[serde(default)]
    pub paused_until: Option<DateTime<Utc>>,
    #[serde(default)]
    pub pause_comment: Option<String>,
    #[serde(default)]
    pub templates: HashMap<TemplateId, TemplateConfig>,
}

impl StreamConfig {
    pub fn is_paused(&self, now: DateTime<Utc>) -> bool {
        self.paused_until.is_some_and(|until| until > now)
    }

    pub fn template(&self, id: &TemplateId) -> Option<&TemplateConfig> {
        self.templates.get(id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TemplateConfig {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    /// When set, scheduled runs submit a new change touching this path and
    /// build that instead of an existing commit.
    #[serde(default)]
    pub submit_new_change: Option<String>,
    #[serde(default)]
    pub submit_description: Option<String>,
    /// Hash of the compiled graph the template resolves to.
    #[serde(default)]
    pub graph_hash: Option<String>,
}

impl TemplateConfig {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: TemplateId::new(id),
            name: name.into(),
            arguments: vec![],
            priority: None,
            submit_new_change: None,
            submit_description: None,
            graph_hash: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_stream_pause_window() {
        let now = Utc::now();
        let mut stream = StreamConfig {
            id: StreamId::new("main"),
            name: "Main".to_string(),
            paused_until: None,
            pause_comment: None,
            templates: HashMap::new(),
        };
        assert!(!stream.is_paused(now));

        stream.paused_until = Some(now + Duration::hours(1));
        assert!(stream.is_paused(now));

        stream.paused_until = Some(now - Duration::hours(1));
        assert!(!stream.is_paused(now));
    }
}
