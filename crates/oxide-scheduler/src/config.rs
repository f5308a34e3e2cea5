//! Schedule ticker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval between ticks in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// TTL of the global refill lease. It is held to expiry, so the queue is
    /// refilled at most once per TTL across all instances.
    #[serde(default = "default_refill_lease_ttl")]
    pub refill_lease_ttl_secs: u64,
    /// TTL of a per-schedule lease. Must exceed the commit walk budget.
    #[serde(default = "default_item_lease_ttl")]
    pub item_lease_ttl_secs: u64,
    /// Wall-clock budget for walking commit history in one trigger.
    #[serde(default = "default_commit_walk_budget")]
    pub commit_walk_budget_secs: u64,
    /// Commits fetched per history query.
    #[serde(default = "default_commit_page_size")]
    pub commit_page_size: usize,
    /// Jobs fetched per query when walking a gate template.
    #[serde(default = "default_gate_page_size")]
    pub gate_page_size: usize,
    /// Commit descriptions matching this pattern are never triggered.
    #[serde(default = "default_skip_directive_pattern")]
    pub skip_directive_pattern: String,
    /// Maximum number of queue items dispatched per tick.
    #[serde(default = "default_max_items_per_tick")]
    pub max_items_per_tick: usize,
}

fn default_tick_interval() -> u64 {
    60
}

fn default_refill_lease_ttl() -> u64 {
    60
}

fn default_item_lease_ttl() -> u64 {
    300
}

fn default_commit_walk_budget() -> u64 {
    120
}

fn default_commit_page_size() -> usize {
    100
}

fn default_gate_page_size() -> usize {
    50
}

fn default_skip_directive_pattern() -> String {
    r"(?im)^\s*#(skip-?ci|ci-?skip|noschedule)\b".to_string()
}

fn default_max_items_per_tick() -> usize {
    1000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            refill_lease_ttl_secs: default_refill_lease_ttl(),
            item_lease_ttl_secs: default_item_lease_ttl(),
            commit_walk_budget_secs: default_commit_walk_budget(),
            commit_page_size: default_commit_page_size(),
            gate_page_size: default_gate_page_size(),
            skip_directive_pattern: default_skip_directive_pattern(),
            max_items_per_tick: default_max_items_per_tick(),
        }
    }
}

impl SchedulerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn refill_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.refill_lease_ttl_secs)
    }

    pub fn item_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.item_lease_ttl_secs)
    }

    pub fn commit_walk_budget(&self) -> Duration {
        Duration::from_secs(self.commit_walk_budget_secs)
    }

    /// Set the commit walk budget.
    pub fn with_commit_walk_budget(mut self, budget: Duration) -> Self {
        self.commit_walk_budget_secs = budget.as_secs();
        self
    }

    /// Set the commit page size.
    pub fn with_commit_page_size(mut self, size: usize) -> Self {
        self.commit_page_size = size.max(1);
        self
    }

    /// Set the skip directive pattern.
    pub fn with_skip_directive_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.skip_directive_pattern = pattern.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_lease_outlives_walk_budget() {
        let config = SchedulerConfig::default();
        assert!(config.item_lease_ttl() > config.commit_walk_budget());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("tick_interval_secs: 15\n").unwrap();
        assert_eq!(config.tick_interval(), Duration::from_secs(15));
        assert_eq!(config.commit_walk_budget(), Duration::from_secs(120));
        assert_eq!(config.commit_page_size, 100);
    }
}
