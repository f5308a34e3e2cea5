//! Bisect ticker configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BisectConfig {
    /// Interval between ticks in seconds.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// TTL of the per-task lease.
    #[serde(default = "default_task_lease_ttl")]
    pub task_lease_ttl_secs: u64,
    /// Conditional writes attempted before giving up on an update.
    #[serde(default = "default_max_update_attempts")]
    pub max_update_attempts: u32,
    /// Steps fetched per step history query.
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,
    /// Commits fetched per candidate query.
    #[serde(default = "default_candidate_page_size")]
    pub candidate_page_size: usize,
}

fn default_tick_interval() -> u64 {
    60
}

fn default_task_lease_ttl() -> u64 {
    300
}

fn default_max_update_attempts() -> u32 {
    3
}

fn default_history_page_size() -> usize {
    50
}

fn default_candidate_page_size() -> usize {
    500
}

impl Default for BisectConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            task_lease_ttl_secs: default_task_lease_ttl(),
            max_update_attempts: default_max_update_attempts(),
            history_page_size: default_history_page_size(),
            candidate_page_size: default_candidate_page_size(),
        }
    }
}

impl BisectConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn task_lease_ttl(&self) -> Duration {
        Duration::from_secs(self.task_lease_ttl_secs)
    }

    pub fn with_history_page_size(mut self, size: usize) -> Self {
        self.history_page_size = size.max(1);
        self
    }

    pub fn with_candidate_page_size(mut self, size: usize) -> Self {
        self.candidate_page_size = size.max(1);
        self
    }

    pub fn with_max_update_attempts(mut self, attempts: u32) -> Self {
        self.max_update_attempts = attempts.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BisectConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_secs(60));
        assert_eq!(config.task_lease_ttl(), Duration::from_secs(300));
        assert_eq!(config.max_update_attempts, 3);
    }

    #[test]
    fn test_yaml_overrides() {
        let yaml = "max_update_attempts: 5\nhistory_page_size: 10\n";
        let config: BisectConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.max_update_attempts, 5);
        assert_eq!(config.history_page_size, 10);
        assert_eq!(config.candidate_page_size, 500);
    }
}
