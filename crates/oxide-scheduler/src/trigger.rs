//! Schedule trigger engine.
//!
//! Decides, for one (stream, template) schedule at a point in time, which
//! commits to build and creates the jobs for them. Callers must hold the
//! schedule's lease; the engine itself takes no locks.

use crate::config::SchedulerConfig;
use crate::filters::CommitFilter;
use chrono::{DateTime, Utc};
use oxide_core::Result;
use oxide_core::commit::{CommitIdWithOrder, CommitQuery};
use oxide_core::ids::{StreamId, TemplateId};
use oxide_core::job::{CreateJobRequest, JobOptions, JobQuery};
use oxide_core::ports::{CommitHistory, JobStore, ScheduleRepository, StreamConfigSource};
use oxide_core::schedule::{Schedule, ScheduleGate};
use oxide_core::stream::TemplateConfig;
use std::sync::Arc;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, error, info, warn};

/// A commit selected for a scheduled job.
#[derive(Debug, Clone)]
struct TriggerCandidate {
    commit_id: CommitIdWithOrder,
    /// Known code change for the commit, if the source already resolved it.
    code_commit_id: Option<CommitIdWithOrder>,
}

/// Number of new changes a schedule may start this tick.
///
/// `max_changes` of zero means one; `max_active` of zero means unlimited.
pub fn max_new_changes(schedule: &Schedule) -> usize {
    let config = &schedule.config;
    let mut max_new = if config.max_changes == 0 {
        1
    } else {
        config.max_changes as usize
    };
    if config.max_active > 0 {
        let free = (config.max_active as usize).saturating_sub(schedule.active_jobs.len());
        max_new = max_new.min(free);
    }
    max_new
}

/// Per-schedule trigger decision logic.
pub struct TriggerEngine {
    schedules: Arc<dyn ScheduleRepository>,
    streams: Arc<dyn StreamConfigSource>,
    commits: Arc<dyn CommitHistory>,
    jobs: Arc<dyn JobStore>,
    filter: CommitFilter,
    config: SchedulerConfig,
}

impl TriggerEngine {
    pub fn new(
        schedules: Arc<dyn ScheduleRepository>,
        streams: Arc<dyn StreamConfigSource>,
        commits: Arc<dyn CommitHistory>,
        jobs: Arc<dyn JobStore>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        let filter = CommitFilter::new(&config.skip_directive_pattern)?;
        Ok(Self {
            schedules,
            streams,
            commits,
            jobs,
            filter,
            config,
        })
    }

    /// Evaluate a schedule and start any jobs it is due.
    ///
    /// Returns true if at least one job was started. Failures after the
    /// schedule's bookkeeping has been saved are logged, not returned.
    pub async fn trigger(
        &self,
        stream_id: &StreamId,
        template_id: &TemplateId,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let Some(mut schedule) = self.schedules.get(stream_id, template_id).await? else {
            warn!(stream_id = %stream_id, template_id = %template_id, "Schedule not found");
            return Ok(false);
        };

        let reconciled = self.reconcile_active_jobs(&mut schedule).await?;

        let stream = self.streams.get_stream(stream_id).await?;
        let paused = stream.as_ref().is_some_and(|s| s.is_paused(now));
        if !paused {
            schedule.last_trigger_time = Some(now);
        }
        if reconciled || !paused {
            self.schedules.save_state(&schedule).await?;
        }

        let Some(stream) = stream else {
            warn!(stream_id = %stream_id, template_id = %template_id, "Stream no longer exists");
            return Ok(false);
        };
        if paused {
            info!(
                stream_id = %stream_id,
                template_id = %template_id,
                paused_until = ?stream.paused_until,
                "Stream is paused; skipping schedule"
            );
            return Ok(false);
        }
        let Some(template) = stream.template(template_id).cloned() else {
            warn!(stream_id = %stream_id, template_id = %template_id, "Template no longer exists");
            return Ok(false);
        };

        let mut started = 0;
        if let Err(e) = self
            .trigger_jobs(&mut schedule, &template, &mut started)
            .await
        {
            error!(
                stream_id = %stream_id,
                template_id = %template_id,
                started,
                error = %e,
                "Failed to trigger schedule"
            );
        }

        Ok(started > 0)
    }

    /// Drop completed or vanished jobs from the active set.
    async fn reconcile_active_jobs(&self, schedule: &mut Schedule) -> Result<bool> {
        let mut retained = Vec::with_capacity(schedule.active_jobs.len());
        for job_id in &schedule.active_jobs {
            match self.jobs.get(*job_id).await? {
                Some(job) if !job.is_complete() => retained.push(*job_id),
                Some(_) => debug!(job_id = %job_id, "Scheduled job complete"),
                None => debug!(job_id = %job_id, "Scheduled job no longer exists"),
            }
        }
        let changed = retained.len() != schedule.active_jobs.len();
        schedule.active_jobs = retained;
        Ok(changed)
    }

    async fn trigger_jobs(
        &self,
        schedule: &mut Schedule,
        template: &TemplateConfig,
        started: &mut usize,
    ) -> Result<()> {
        let max_new = max_new_changes(schedule);
        if max_new == 0 {
            debug!(
                stream_id = %schedule.stream_id,
                template_id = %schedule.template_id,
                active = schedule.active_jobs.len(),
                "Schedule at max active jobs"
            );
            return Ok(());
        }

        let mut candidates = match schedule.config.gate.clone() {
            Some(gate) => self.gate_candidates(schedule, &gate, max_new).await?,
            None => self.history_candidates(schedule, max_new).await?,
        };
        if candidates.is_empty() {
            debug!(
                stream_id = %schedule.stream_id,
                template_id = %schedule.template_id,
                "No new changes to trigger"
            );
            return Ok(());
        }

        if let Some(path) = &template.submit_new_change {
            let description = template
                .submit_description
                .clone()
                .unwrap_or_else(|| format!("Scheduled build of {}", template.name));
            let commit = self
                .commits
                .submit_synthetic(&schedule.stream_id, path, &description)
                .await?;
            info!(
                stream_id = %schedule.stream_id,
                template_id = %schedule.template_id,
                commit = %commit.id,
                "Submitted new change for schedule"
            );
            candidates = vec![TriggerCandidate {
                commit_id: commit.id,
                code_commit_id: None,
            }];
        }

        for candidate in candidates {
            let code_commit_id = match candidate.code_commit_id {
                Some(id) => id,
                None => {
                    self.resolve_code_change(&schedule.stream_id, &candidate.commit_id)
                        .await?
                }
            };

            let request = CreateJobRequest {
                stream_id: schedule.stream_id.clone(),
                template: template.clone(),
                commit_id: candidate.commit_id.clone(),
                code_commit_id: code_commit_id.clone(),
                options: JobOptions {
                    name: Some(template.name.clone()),
                    arguments: template.arguments.clone(),
                    parameters: schedule.config.parameters.clone(),
                    targets: vec![],
                    started_by_schedule: true,
                    bisect_task_id: None,
                },
            };
            let job = self.jobs.create(request).await?;
            info!(
                stream_id = %schedule.stream_id,
                template_id = %schedule.template_id,
                job_id = %job.id,
                commit = %candidate.commit_id,
                code_commit = %code_commit_id,
                "Started scheduled job"
            );

            schedule.active_jobs.push(job.id);
            schedule.advance_last_trigger(&candidate.commit_id);
            self.schedules.save_state(schedule).await?;
            *started += 1;
        }

        Ok(())
    }

    /// Walk commit history from newest to the last triggered commit, keeping
    /// the oldest `max_new` commits that pass the schedule's filters.
    ///
    /// The last triggered commit is only rebuilt when no newer commit
    /// qualifies. If the walk runs out of budget, the commits found so far are
    /// the newest ones; building them moves the last trigger past anything
    /// older that was never reached.
    async fn history_candidates(
        &self,
        schedule: &Schedule,
        max_new: usize,
    ) -> Result<Vec<TriggerCandidate>> {
        let config = &schedule.config;
        let deadline = Instant::now() + self.config.commit_walk_budget();
        let page_size = self.config.commit_page_size.max(1);
        let first_run = schedule.last_trigger_commit_id.is_none();

        // Newest first
        let mut accepted: Vec<CommitIdWithOrder> = Vec::new();
        let mut rebuild = None;
        let mut max_commit = None;

        'walk: loop {
            let query = CommitQuery {
                min_commit: schedule.last_trigger_commit_id.clone(),
                include_min: !config.require_submitted_change,
                max_commit: max_commit.clone(),
                tags: config.commit_tags.clone(),
                limit: page_size,
            };
            let commits =
                match timeout_at(deadline, self.commits.find(&schedule.stream_id, &query)).await {
                    Ok(result) => result?,
                    Err(_) => {
                        warn!(
                            stream_id = %schedule.stream_id,
                            template_id = %schedule.template_id,
                            accepted = accepted.len(),
                            "Commit history walk exceeded budget; using partial results"
                        );
                        break;
                    }
                };
            let Some(oldest) = commits.last() else {
                break;
            };
            let next_max = oldest.id.predecessor();

            for commit in &commits {
                if self.filter.is_skipped(commit) {
                    debug!(commit = %commit.id, "Skipping commit with skip directive");
                    continue;
                }
                if !self.filter.matches_tags(commit, &config.commit_tags) {
                    continue;
                }
                if let Some(files) = &config.files
                    && !files.is_empty()
                {
                    let matched = match timeout_at(
                        deadline,
                        self.commits
                            .matches_file_filter(&schedule.stream_id, commit, files),
                    )
                    .await
                    {
                        Ok(result) => result?,
                        Err(_) => {
                            warn!(
                                stream_id = %schedule.stream_id,
                                template_id = %schedule.template_id,
                                accepted = accepted.len(),
                                "Commit history walk exceeded budget; using partial results"
                            );
                            break 'walk;
                        }
                    };
                    if !matched {
                        continue;
                    }
                }

                if schedule.last_trigger_commit_id.as_ref() == Some(&commit.id) {
                    rebuild = Some(commit.id.clone());
                    continue;
                }
                accepted.push(commit.id.clone());
                if first_run {
                    break 'walk;
                }
            }

            if commits.len() < page_size {
                break;
            }
            max_commit = Some(next_max);
        }

        accepted.reverse();
        accepted.truncate(max_new);
        if accepted.is_empty() {
            accepted.extend(rebuild);
        }
        Ok(accepted
            .into_iter()
            .map(|commit_id| TriggerCandidate {
                commit_id,
                code_commit_id: None,
            })
            .collect())
    }

    /// Walk the gate template's jobs backwards collecting commits where the
    /// gate target completed successfully or with warnings.
    async fn gate_candidates(
        &self,
        schedule: &Schedule,
        gate: &ScheduleGate,
        max_new: usize,
    ) -> Result<Vec<TriggerCandidate>> {
        let config = &schedule.config;
        let deadline = Instant::now() + self.config.commit_walk_budget();
        let page_size = self.config.gate_page_size.max(1);
        let min_commit = schedule.last_trigger_commit_id.clone();
        let include_min = !config.require_submitted_change;

        // Newest first
        let mut found: Vec<TriggerCandidate> = Vec::new();
        let mut max_commit = None;

        'walk: loop {
            let query = JobQuery {
                stream_id: Some(schedule.stream_id.clone()),
                templates: vec![gate.template_id.clone()],
                min_commit: min_commit.clone(),
                max_commit: max_commit.clone(),
                count: page_size,
            };
            let jobs = match timeout_at(deadline, self.jobs.find(&query)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(
                        stream_id = %schedule.stream_id,
                        template_id = %schedule.template_id,
                        gate_template = %gate.template_id,
                        "Gate walk exceeded budget; using partial results"
                    );
                    break;
                }
            };
            let Some(oldest) = jobs.last() else {
                break;
            };
            let next_max = oldest.commit_id.predecessor();

            for job in &jobs {
                if let Some(min) = &min_commit
                    && (job.commit_id < *min || (!include_min && job.commit_id == *min))
                {
                    continue;
                }
                let Some((state, outcome)) = job.target_state(&gate.target) else {
                    continue;
                };
                if !state.is_terminal() || !outcome.is_success_or_warnings() {
                    continue;
                }
                if found.iter().any(|c| c.commit_id == job.commit_id) {
                    continue;
                }

                found.push(TriggerCandidate {
                    commit_id: job.commit_id.clone(),
                    code_commit_id: Some(job.code_commit_id.clone()),
                });
                if found.len() >= max_new {
                    break 'walk;
                }
            }

            if jobs.len() < page_size {
                break;
            }
            max_commit = Some(next_max);
        }

        found.reverse();
        Ok(found)
    }

    async fn resolve_code_change(
        &self,
        stream_id: &StreamId,
        commit_id: &CommitIdWithOrder,
    ) -> Result<CommitIdWithOrder> {
        let code_change = self.commits.last_code_change(stream_id, commit_id).await?;
        Ok(code_change
            .map(|c| c.id)
            .unwrap_or_else(|| commit_id.clone()))
    }
}
