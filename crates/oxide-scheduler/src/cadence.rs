//! Schedule cadence evaluation.
//!
//! Patterns are cron expressions with a leading seconds field, e.g.
//! `0 0 2 * * *` for 02:00 UTC every day.

use chrono::{DateTime, Utc};
use cron::Schedule as CronSchedule;
use oxide_core::schedule::Schedule;
use oxide_core::{Error, Result};
use std::str::FromStr;

/// Parse a cron pattern.
pub fn parse_pattern(pattern: &str) -> Result<CronSchedule> {
    CronSchedule::from_str(pattern).map_err(|e| Error::InvalidSchedulePattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

/// Earliest time after the last trigger at which the schedule should fire.
///
/// A schedule that has never fired counts from `now`. Returns `None` for
/// schedules that are disabled or have no patterns.
pub fn next_trigger_time(schedule: &Schedule, now: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    if !schedule.config.enabled {
        return Ok(None);
    }

    let base = schedule.last_trigger_time.unwrap_or(now);
    let mut next: Option<DateTime<Utc>> = None;
    for pattern in &schedule.config.patterns {
        let cron = parse_pattern(pattern)?;
        if let Some(time) = cron.after(&base).next() {
            next = Some(match next {
                Some(current) => current.min(time),
                None => time,
            });
        }
    }
    Ok(next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use oxide_core::ids::{StreamId, TemplateId};
    use oxide_core::schedule::ScheduleConfig;

    fn schedule(patterns: &[&str]) -> Schedule {
        Schedule::new(
            StreamId::new("main"),
            TemplateId::new("nightly"),
            ScheduleConfig {
                patterns: patterns.iter().map(|p| p.to_string()).collect(),
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_next_after_last_trigger() {
        let mut s = schedule(&["0 0 2 * * *"]);
        s.last_trigger_time = Some(Utc.with_ymd_and_hms(2025, 3, 1, 2, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let next = next_trigger_time(&s, now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 2, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_earliest_pattern_wins() {
        let s = schedule(&["0 0 2 * * *", "0 30 * * * *"]);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 10, 0).unwrap();

        let next = next_trigger_time(&s, now).unwrap().unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 0).unwrap());
    }

    #[test]
    fn test_overdue_schedule_is_due_in_the_past() {
        let mut s = schedule(&["0 0 * * * *"]);
        s.last_trigger_time = Some(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap());
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

        let next = next_trigger_time(&s, now).unwrap().unwrap();
        assert!(next <= now);
    }

    #[test]
    fn test_no_patterns_never_fires() {
        assert!(next_trigger_time(&schedule(&[]), Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_disabled_never_fires() {
        let mut s = schedule(&["0 0 * * * *"]);
        s.config.enabled = false;
        assert!(next_trigger_time(&s, Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = next_trigger_time(&schedule(&["not a cron"]), Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidSchedulePattern { .. }));
    }
}
