//! Schedule trigger engine tests against in-memory adapters.
//!
//! Run with: `cargo test -p oxide-tests --test trigger_tests`

use chrono::{Duration as ChronoDuration, Utc};
use oxide_core::commit::{CommitIdWithOrder, CommitTag};
use oxide_core::ids::TemplateId;
use oxide_core::job::{JobStepOutcome, JobStepState};
use oxide_core::schedule::{FileFilter, Schedule, ScheduleConfig, ScheduleGate};
use oxide_scheduler::SchedulerConfig;
use oxide_tests::{
    CommitFixture, NODE, ScheduleFixture, SchedulerHarness, init_test_logging, stream_id,
    template_id,
};
use pretty_assertions::assert_eq;
use std::time::Duration;

fn harness() -> SchedulerHarness {
    init_test_logging();
    SchedulerHarness::new(SchedulerConfig::default()).expect("Failed to build harness")
}

/// A schedule that only builds changes after `last`.
fn after(last: i64, config: ScheduleConfig) -> Schedule {
    let mut schedule = ScheduleFixture::with_config(ScheduleConfig {
        require_submitted_change: true,
        ..config
    });
    schedule.last_trigger_commit_id = Some(CommitIdWithOrder::new(last));
    schedule
}

fn max_changes(n: u32) -> ScheduleConfig {
    ScheduleConfig {
        max_changes: n,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_backlog_takes_oldest_changes_first() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(101..=105));
    h.add_schedule(&after(100, max_changes(3))).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101, 102, 103]);

    let schedule = h.schedule().await.unwrap();
    assert_eq!(schedule.last_trigger_commit_id, Some(CommitIdWithOrder::new(103)));
    assert_eq!(schedule.active_jobs.len(), 3);
    assert!(schedule.last_trigger_time.is_some());

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101, 102, 103, 104, 105]);
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(105))
    );
}

#[tokio::test]
async fn test_scheduled_jobs_carry_schedule_options() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let mut config = max_changes(1);
    config
        .parameters
        .insert("Platform".to_string(), "Win64".to_string());
    h.add_schedule(&after(100, config)).await.unwrap();

    h.trigger().await.unwrap();

    let created = h.jobs.created();
    assert_eq!(created.len(), 1);
    assert!(created[0].started_by_schedule);
    assert_eq!(created[0].template_id, template_id());
    assert!(created[0].find_step(NODE).is_some());
}

#[tokio::test]
async fn test_max_active_caps_new_jobs() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(101..=105));

    let running = h
        .jobs
        .add_completed(&stream_id(), &template_id(), 100, &[(NODE, JobStepOutcome::Unspecified)]);
    h.jobs
        .set_step(running, NODE, JobStepState::Running, JobStepOutcome::Unspecified);

    let mut schedule = after(
        100,
        ScheduleConfig {
            max_active: 2,
            max_changes: 5,
            ..Default::default()
        },
    );
    schedule.active_jobs = vec![running];
    h.add_schedule(&schedule).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101]);
    assert_eq!(h.schedule().await.unwrap().active_jobs.len(), 2);

    // Full: nothing new until a job finishes
    assert!(!h.trigger().await.unwrap());
    assert_eq!(h.jobs.created().len(), 1);

    h.jobs.complete_job(running, JobStepOutcome::Success);
    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101, 102]);

    let schedule = h.schedule().await.unwrap();
    assert_eq!(schedule.active_jobs.len(), 2);
    assert!(!schedule.active_jobs.contains(&running));
}

#[tokio::test]
async fn test_vanished_jobs_leave_active_set() {
    let h = harness();
    let gone = h
        .jobs
        .add_completed(&stream_id(), &template_id(), 100, &[(NODE, JobStepOutcome::Unspecified)]);
    h.jobs
        .set_step(gone, NODE, JobStepState::Running, JobStepOutcome::Unspecified);

    let mut schedule = after(100, max_changes(1));
    schedule.active_jobs = vec![gone];
    h.add_schedule(&schedule).await.unwrap();
    h.jobs.remove(gone);

    assert!(!h.trigger().await.unwrap());
    assert!(h.schedule().await.unwrap().active_jobs.is_empty());
}

#[tokio::test]
async fn test_skip_directive_excludes_commit() {
    let h = harness();
    h.commits.add_all([
        CommitFixture::with_description(101, "Update docs\n#skip-ci"),
        CommitFixture::with_description(102, "Fix shader compile crash"),
        CommitFixture::with_description(103, "#noschedule\nBulk asset import"),
    ]);
    h.add_schedule(&after(100, max_changes(5))).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![102]);
}

#[tokio::test]
async fn test_first_run_builds_newest_change_only() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(1..=10));
    h.add_schedule(&ScheduleFixture::hourly(5)).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![10]);
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(10))
    );
}

#[tokio::test]
async fn test_last_trigger_never_moves_backwards() {
    let h = harness();
    h.commits.add_all([CommitFixture::code(103), CommitFixture::code(106)]);
    h.add_schedule(&after(105, max_changes(5))).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![106]);

    // A change that lands with an older order is never picked up
    h.commits.add(CommitFixture::code(104));
    assert!(!h.trigger().await.unwrap());
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(106))
    );
}

#[tokio::test]
async fn test_without_required_change_rebuilds_last_commit() {
    let h = harness();
    h.commits.add(CommitFixture::code(100));
    let mut schedule = ScheduleFixture::hourly(1);
    schedule.last_trigger_commit_id = Some(CommitIdWithOrder::new(100));
    h.add_schedule(&schedule).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![100]);
}

#[tokio::test]
async fn test_default_config_moves_past_last_commit() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(100..=102));
    let mut schedule = ScheduleFixture::with_config(ScheduleConfig::default());
    schedule.last_trigger_commit_id = Some(CommitIdWithOrder::new(100));
    h.add_schedule(&schedule).await.unwrap();

    for _ in 0..3 {
        assert!(h.trigger().await.unwrap());
    }

    // New changes first, then the newest is rebuilt once nothing newer is left
    assert_eq!(h.jobs.created_orders(), vec![101, 102, 102]);
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(102))
    );
}

#[tokio::test]
async fn test_gate_uses_successful_gate_jobs() {
    let h = harness();
    let gate = TemplateId::new("gate");
    h.jobs
        .add_completed(&stream_id(), &gate, 101, &[(NODE, JobStepOutcome::Success)]);
    h.jobs
        .add_completed(&stream_id(), &gate, 102, &[(NODE, JobStepOutcome::Failure)]);
    let running = h
        .jobs
        .add_completed(&stream_id(), &gate, 103, &[(NODE, JobStepOutcome::Unspecified)]);
    h.jobs
        .set_step(running, NODE, JobStepState::Running, JobStepOutcome::Unspecified);
    h.jobs
        .add_completed(&stream_id(), &gate, 104, &[(NODE, JobStepOutcome::Warnings)]);

    let config = ScheduleConfig {
        max_changes: 5,
        gate: Some(ScheduleGate {
            template_id: gate,
            target: NODE.to_string(),
        }),
        ..Default::default()
    };
    h.add_schedule(&after(100, config)).await.unwrap();

    assert!(h.trigger().await.unwrap());
    let created = h.jobs.created();
    assert_eq!(h.jobs.created_orders(), vec![101, 104]);
    assert_eq!(created[1].code_commit_id, CommitIdWithOrder::new(104));
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(104))
    );
}

#[tokio::test]
async fn test_paused_stream_does_not_trigger() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.add_schedule(&after(100, max_changes(1))).await.unwrap();
    h.streams
        .update(&stream_id(), |s| {
            s.paused_until = Some(Utc::now() + ChronoDuration::hours(1));
            s.pause_comment = Some("Branch lockdown".to_string());
        })
        .unwrap();

    assert!(!h.trigger().await.unwrap());
    assert!(h.jobs.created().is_empty());
    assert!(h.schedule().await.unwrap().last_trigger_time.is_none());

    h.streams
        .update(&stream_id(), |s| s.paused_until = Some(Utc::now() - ChronoDuration::minutes(1)))
        .unwrap();
    assert!(h.trigger().await.unwrap());
}

#[tokio::test]
async fn test_missing_template_does_not_trigger() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    h.add_schedule(&after(100, max_changes(1))).await.unwrap();
    h.streams
        .update(&stream_id(), |s| {
            s.templates.clear();
        })
        .unwrap();

    assert!(!h.trigger().await.unwrap());
    assert!(h.jobs.created().is_empty());
}

#[tokio::test]
async fn test_submit_new_change_builds_synthetic_commit() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(101..=102));
    h.streams
        .update(&stream_id(), |s| {
            if let Some(t) = s.templates.get_mut(&template_id()) {
                t.submit_new_change = Some("//UE5/Main/Build/Build.version".to_string());
                t.submit_description = Some("Nightly version bump".to_string());
            }
        })
        .unwrap();
    h.add_schedule(&after(100, max_changes(5))).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![103]);

    let submitted = h.commits.commits(&stream_id());
    assert_eq!(submitted.last().unwrap().description, "Nightly version bump");
    assert_eq!(
        h.schedule().await.unwrap().last_trigger_commit_id,
        Some(CommitIdWithOrder::new(103))
    );
}

#[tokio::test]
async fn test_file_filter_limits_commits() {
    let h = harness();
    h.commits.add_all(CommitFixture::range(101..=103));
    h.commits
        .set_files(&stream_id(), 101, &["/Engine/Source/Runtime/Core/Private/Math.cpp"]);
    h.commits.set_files(&stream_id(), 102, &["/Engine/Docs/README.md"]);
    h.commits
        .set_files(&stream_id(), 103, &["/Engine/Docs/README.md", "/Engine/Source/a.h"]);

    let config = ScheduleConfig {
        max_changes: 5,
        files: Some(FileFilter::new(["/Engine/...", "-/Engine/Docs/..."])),
        ..Default::default()
    };
    h.add_schedule(&after(100, config)).await.unwrap();

    assert!(h.trigger().await.unwrap());
    assert_eq!(h.jobs.created_orders(), vec![101, 103]);
}

#[tokio::test]
async fn test_commit_tags_filter_content_changes() {
    let h = harness();
    h.commits
        .add_all([CommitFixture::code(101), CommitFixture::content(102)]);
    let config = ScheduleConfig {
        max_changes: 5,
        commit_tags: vec![CommitTag::code()],
        ..Default::default()
    };
    h.add_schedule(&after(100, config)).await.unwrap();

    h.trigger().await.unwrap();
    assert_eq!(h.jobs.created_orders(), vec![101]);
}

#[tokio::test]
async fn test_content_change_builds_with_last_code_change() {
    let h = harness();
    h.commits
        .add_all([CommitFixture::code(101), CommitFixture::content(102)]);
    h.add_schedule(&after(101, max_changes(1))).await.unwrap();

    h.trigger().await.unwrap();

    let created = h.jobs.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].commit_id, CommitIdWithOrder::new(102));
    assert_eq!(created[0].code_commit_id, CommitIdWithOrder::new(101));
}

#[tokio::test]
async fn test_disabled_schedule_still_triggers_on_demand() {
    let h = harness();
    h.commits.add(CommitFixture::code(101));
    let config = ScheduleConfig {
        enabled: false,
        ..max_changes(1)
    };
    h.add_schedule(&after(100, config)).await.unwrap();

    assert!(h.trigger().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_commit_walk_is_time_boxed() {
    init_test_logging();
    let config = SchedulerConfig::default().with_commit_walk_budget(Duration::from_secs(1));
    let h = SchedulerHarness::new(config).unwrap();
    h.commits.add(CommitFixture::code(101));
    h.commits.set_find_delay(Duration::from_secs(5));
    h.add_schedule(&after(100, max_changes(1))).await.unwrap();

    assert!(!h.trigger().await.unwrap());
    assert!(h.jobs.created().is_empty());

    let schedule = h.schedule().await.unwrap();
    assert!(schedule.last_trigger_time.is_some());
    assert_eq!(schedule.last_trigger_commit_id, Some(CommitIdWithOrder::new(100)));
}

#[tokio::test]
async fn test_history_walk_pages_through_commits() {
    init_test_logging();
    let config = SchedulerConfig::default().with_commit_page_size(2);
    let h = SchedulerHarness::new(config).unwrap();
    h.commits.add_all(CommitFixture::range(101..=107));
    h.add_schedule(&after(100, max_changes(2))).await.unwrap();

    h.trigger().await.unwrap();

    assert_eq!(h.jobs.created_orders(), vec![101, 102]);
    assert!(h.commits.find_calls() >= 4);
}
