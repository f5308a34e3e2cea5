//! In-process fakes for the collaborators the engines depend on.
//!
//! Each fake keeps its data behind a mutex so tests can rearrange history
//! between ticks through a shared `Arc`.

use async_trait::async_trait;
use chrono::Utc;
use oxide_core::commit::{Commit, CommitIdWithOrder, CommitQuery, CommitTag};
use oxide_core::ids::{BatchId, JobId, StepId, StreamId, TemplateId};
use oxide_core::job::{
    CreateJobRequest, Job, JobQuery, JobStep, JobStepOutcome, JobStepRef, JobStepState,
    StepHistoryQuery,
};
use oxide_core::ports::{CommitHistory, JobStore, StreamConfigSource};
use oxide_core::schedule::FileFilter;
use oxide_core::stream::StreamConfig;
use oxide_core::{Error, Result};
use oxide_scheduler::filters::file_filter_matches;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Commit history backed by a sorted list per stream.
#[derive(Default)]
pub struct FakeCommitHistory {
    commits: Mutex<HashMap<StreamId, Vec<Commit>>>,
    files: Mutex<HashMap<(StreamId, i64), Vec<String>>>,
    find_delay: Mutex<Option<Duration>>,
    find_calls: Mutex<usize>,
}

impl FakeCommitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, commit: Commit) {
        let mut commits = self.commits.lock().expect("lock poisoned");
        let list = commits.entry(commit.stream_id.clone()).or_default();
        list.retain(|c| c.id != commit.id);
        list.push(commit);
        list.sort_by(|a, b| a.id.cmp(&b.id));
    }

    pub fn add_all(&self, commits: impl IntoIterator<Item = Commit>) {
        for commit in commits {
            self.add(commit);
        }
    }

    /// Record the files a commit touched.
    pub fn set_files(&self, stream_id: &StreamId, order: i64, files: &[&str]) {
        self.files.lock().expect("lock poisoned").insert(
            (stream_id.clone(), order),
            files.iter().map(|f| f.to_string()).collect(),
        );
    }

    /// Make every `find` call sleep first.
    pub fn set_find_delay(&self, delay: Duration) {
        *self.find_delay.lock().expect("lock poisoned") = Some(delay);
    }

    pub fn find_calls(&self) -> usize {
        *self.find_calls.lock().expect("lock poisoned")
    }

    pub fn commits(&self, stream_id: &StreamId) -> Vec<Commit> {
        self.commits
            .lock()
            .expect("lock poisoned")
            .get(stream_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl CommitHistory for FakeCommitHistory {
    async fn find(&self, stream_id: &StreamId, query: &CommitQuery) -> Result<Vec<Commit>> {
        *self.find_calls.lock().expect("lock poisoned") += 1;
        let delay = *self.find_delay.lock().expect("lock poisoned");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut found: Vec<Commit> = self
            .commits(stream_id)
            .into_iter()
            .rev()
            .filter(|c| query.contains(&c.id) && c.matches_tags(&query.tags))
            .collect();
        if query.limit > 0 {
            found.truncate(query.limit);
        }
        Ok(found)
    }

    async fn last_code_change(
        &self,
        stream_id: &StreamId,
        commit_id: &CommitIdWithOrder,
    ) -> Result<Option<Commit>> {
        Ok(self
            .commits(stream_id)
            .into_iter()
            .rev()
            .find(|c| c.id <= *commit_id && c.is_code_change()))
    }

    async fn matches_file_filter(
        &self,
        stream_id: &StreamId,
        commit: &Commit,
        filter: &FileFilter,
    ) -> Result<bool> {
        let files = self
            .files
            .lock()
            .expect("lock poisoned")
            .get(&(stream_id.clone(), commit.id.order))
            .cloned()
            .unwrap_or_default();
        Ok(file_filter_matches(filter, &files))
    }

    async fn submit_synthetic(
        &self,
        stream_id: &StreamId,
        path: &str,
        description: &str,
    ) -> Result<Commit> {
        let next = self
            .commits(stream_id)
            .last()
            .map_or(1, |c| c.id.order + 1);
        let commit = Commit {
            id: CommitIdWithOrder::new(next),
            stream_id: stream_id.clone(),
            author: "scheduler".to_string(),
            description: description.to_string(),
            tags: vec![CommitTag::content()],
            date_utc: Utc::now(),
        };
        self.add(commit.clone());
        self.set_files(stream_id, next, &[path]);
        Ok(commit)
    }
}

/// Job store that records created jobs and lets tests settle their steps.
#[derive(Default)]
pub struct FakeJobStore {
    /// In insertion order.
    jobs: Mutex<Vec<Job>>,
    nodes: Mutex<HashMap<TemplateId, Vec<String>>>,
    created: Mutex<Vec<JobId>>,
}

impl FakeJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes a job of `template_id` runs when no targets are given.
    pub fn set_nodes(&self, template_id: &TemplateId, nodes: &[&str]) {
        self.nodes.lock().expect("lock poisoned").insert(
            template_id.clone(),
            nodes.iter().map(|n| n.to_string()).collect(),
        );
    }

    pub fn insert(&self, job: Job) {
        self.jobs.lock().expect("lock poisoned").push(job);
    }

    /// Add a finished job whose steps all completed with the given outcomes.
    pub fn add_completed(
        &self,
        stream_id: &StreamId,
        template_id: &TemplateId,
        order: i64,
        steps: &[(&str, JobStepOutcome)],
    ) -> JobId {
        let job = Job {
            id: JobId::new(),
            stream_id: stream_id.clone(),
            template_id: template_id.clone(),
            name: template_id.to_string(),
            commit_id: CommitIdWithOrder::new(order),
            code_commit_id: CommitIdWithOrder::new(order),
            steps: steps
                .iter()
                .map(|(name, outcome)| job_step(name, JobStepState::Completed, *outcome))
                .collect(),
            started_by_schedule: false,
            bisect_task_id: None,
            created_at: Utc::now(),
        };
        let id = job.id;
        self.insert(job);
        id
    }

    /// Finish a step of a job.
    pub fn complete_step(&self, job_id: JobId, node: &str, outcome: JobStepOutcome) {
        self.set_step(job_id, node, JobStepState::Completed, outcome);
    }

    pub fn set_step(&self, job_id: JobId, node: &str, state: JobStepState, outcome: JobStepOutcome) {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if let Some(step) = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .and_then(|j| j.steps.iter_mut().find(|s| s.name == node))
        {
            step.state = state;
            step.outcome = outcome;
        }
    }

    /// Mark every step of a job as finished.
    pub fn complete_job(&self, job_id: JobId, outcome: JobStepOutcome) {
        let mut jobs = self.jobs.lock().expect("lock poisoned");
        if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
            for step in &mut job.steps {
                step.state = JobStepState::Completed;
                step.outcome = outcome;
            }
        }
    }

    pub fn remove(&self, job_id: JobId) {
        self.jobs
            .lock()
            .expect("lock poisoned")
            .retain(|j| j.id != job_id);
    }

    pub fn job(&self, job_id: JobId) -> Option<Job> {
        self.jobs
            .lock()
            .expect("lock poisoned")
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
    }

    /// Jobs created through [`JobStore::create`], oldest first.
    pub fn created(&self) -> Vec<Job> {
        let created = self.created.lock().expect("lock poisoned").clone();
        created.into_iter().filter_map(|id| self.job(id)).collect()
    }

    /// Commit orders of created jobs, oldest first.
    pub fn created_orders(&self) -> Vec<i64> {
        self.created().iter().map(|j| j.commit_id.order).collect()
    }

    /// All jobs, newest insertion first, ordered by descending commit.
    fn newest_first(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .lock()
            .expect("lock poisoned")
            .iter()
            .rev()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.commit_id.cmp(&a.commit_id));
        jobs
    }
}

fn job_step(name: &str, state: JobStepState, outcome: JobStepOutcome) -> JobStep {
    JobStep {
        batch_id: BatchId::new("batch-1"),
        step_id: StepId::new(name),
        name: name.to_string(),
        state,
        outcome,
    }
}

#[async_trait]
impl JobStore for FakeJobStore {
    async fn create(&self, request: CreateJobRequest) -> Result<Job> {
        let nodes = if request.options.targets.is_empty() {
            self.nodes
                .lock()
                .expect("lock poisoned")
                .get(&request.template.id)
                .cloned()
                .unwrap_or_default()
        } else {
            request.options.targets.clone()
        };

        let job = Job {
            id: JobId::new(),
            stream_id: request.stream_id,
            template_id: request.template.id.clone(),
            name: request
                .options
                .name
                .unwrap_or_else(|| request.template.name.clone()),
            commit_id: request.commit_id,
            code_commit_id: request.code_commit_id,
            steps: nodes
                .iter()
                .map(|n| job_step(n, JobStepState::Waiting, JobStepOutcome::Unspecified))
                .collect(),
            started_by_schedule: request.options.started_by_schedule,
            bisect_task_id: request.options.bisect_task_id,
            created_at: Utc::now(),
        };

        self.created.lock().expect("lock poisoned").push(job.id);
        self.insert(job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.job(id))
    }

    async fn find(&self, query: &JobQuery) -> Result<Vec<Job>> {
        let mut found: Vec<Job> = self
            .newest_first()
            .into_iter()
            .filter(|j| query.stream_id.as_ref().is_none_or(|s| *s == j.stream_id))
            .filter(|j| query.templates.is_empty() || query.templates.contains(&j.template_id))
            .filter(|j| query.min_commit.as_ref().is_none_or(|min| j.commit_id >= *min))
            .filter(|j| query.max_commit.as_ref().is_none_or(|max| j.commit_id <= *max))
            .collect();
        if query.count > 0 {
            found.truncate(query.count);
        }
        Ok(found)
    }

    async fn find_step_history(&self, query: &StepHistoryQuery) -> Result<Vec<JobStepRef>> {
        let mut found: Vec<JobStepRef> = self
            .newest_first()
            .iter()
            .filter(|j| j.stream_id == query.stream_id && j.template_id == query.template_id)
            .filter(|j| query.max_commit.as_ref().is_none_or(|max| j.commit_id <= *max))
            .filter_map(|j| {
                j.find_step(&query.node_name)
                    .map(|step| JobStepRef::from_job(j, step))
            })
            .collect();
        if query.count > 0 {
            found.truncate(query.count);
        }
        Ok(found)
    }
}

/// Stream configuration keyed by stream id.
#[derive(Default)]
pub struct FakeStreamConfig {
    streams: Mutex<HashMap<StreamId, StreamConfig>>,
}

impl FakeStreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, stream: StreamConfig) {
        self.streams
            .lock()
            .expect("lock poisoned")
            .insert(stream.id.clone(), stream);
    }

    pub fn remove(&self, id: &StreamId) {
        self.streams.lock().expect("lock poisoned").remove(id);
    }

    /// Apply `f` to a stored stream.
    pub fn update(&self, id: &StreamId, f: impl FnOnce(&mut StreamConfig)) -> Result<()> {
        let mut streams = self.streams.lock().expect("lock poisoned");
        let stream = streams
            .get_mut(id)
            .ok_or_else(|| Error::StreamNotFound(id.to_string()))?;
        f(stream);
        Ok(())
    }
}

#[async_trait]
impl StreamConfigSource for FakeStreamConfig {
    async fn get_stream(&self, id: &StreamId) -> Result<Option<StreamConfig>> {
        Ok(self.streams.lock().expect("lock poisoned").get(id).cloned())
    }
}
