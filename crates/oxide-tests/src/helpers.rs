//! Wiring for engine and ticker tests.
//!
//! Each harness connects the real engines to the collaborator fakes and the
//! in-memory persistence adapters.

use crate::fakes::{FakeCommitHistory, FakeJobStore, FakeStreamConfig};
use crate::fixtures::{NODE, StreamFixture, stream_id, template_id};
use oxide_bisect::{BisectConfig, BisectEngine, BisectService, BisectTicker};
use oxide_core::Result;
use oxide_core::bisect::{BisectTask, CreateBisectTaskOptions};
use oxide_core::job::JobStepOutcome;
use oxide_core::ports::ScheduleRepository;
use oxide_core::schedule::Schedule;
use oxide_db::{InMemoryBisectTaskRepository, InMemoryLeaseProvider, InMemoryScheduleRepository};
use oxide_scheduler::{ScheduleQueue, ScheduleTicker, SchedulerConfig, TriggerEngine};
use std::sync::Arc;

pub struct SchedulerHarness {
    pub commits: Arc<FakeCommitHistory>,
    pub jobs: Arc<FakeJobStore>,
    pub streams: Arc<FakeStreamConfig>,
    pub schedules: Arc<InMemoryScheduleRepository>,
    pub leases: Arc<InMemoryLeaseProvider>,
    pub queue: Arc<ScheduleQueue>,
    pub engine: Arc<TriggerEngine>,
    pub ticker: ScheduleTicker,
}

impl SchedulerHarness {
    pub fn new(config: SchedulerConfig) -> Result<Self> {
        let commits = Arc::new(FakeCommitHistory::new());
        let jobs = Arc::new(FakeJobStore::new());
        let streams = Arc::new(FakeStreamConfig::new());
        let schedules = Arc::new(InMemoryScheduleRepository::new());
        let leases = Arc::new(InMemoryLeaseProvider::new());
        let queue = Arc::new(ScheduleQueue::new());

        streams.insert(StreamFixture::simple());
        jobs.set_nodes(&template_id(), &["Setup", NODE]);

        let engine = Arc::new(TriggerEngine::new(
            schedules.clone(),
            streams.clone(),
            commits.clone(),
            jobs.clone(),
            config.clone(),
        )?);
        let ticker = ScheduleTicker::new(
            engine.clone(),
            schedules.clone(),
            queue.clone(),
            leases.clone(),
            config,
        );

        Ok(Self {
            commits,
            jobs,
            streams,
            schedules,
            leases,
            queue,
            engine,
            ticker,
        })
    }

    /// Store a schedule including its trigger state.
    pub async fn add_schedule(&self, schedule: &Schedule) -> Result<()> {
        self.schedules.upsert_config(schedule).await?;
        self.schedules.save_state(schedule).await
    }

    /// The test schedule as currently stored.
    pub async fn schedule(&self) -> Result<Schedule> {
        self.schedules
            .get(&stream_id(), &template_id())
            .await?
            .ok_or_else(|| oxide_core::Error::ScheduleNotFound {
                stream: stream_id().to_string(),
                template: template_id().to_string(),
            })
    }

    /// Trigger the test schedule now.
    pub async fn trigger(&self) -> Result<bool> {
        self.engine
            .trigger(&stream_id(), &template_id(), chrono::Utc::now())
            .await
    }
}

pub struct BisectHarness {
    pub commits: Arc<FakeCommitHistory>,
    pub jobs: Arc<FakeJobStore>,
    pub streams: Arc<FakeStreamConfig>,
    pub tasks: Arc<InMemoryBisectTaskRepository>,
    pub leases: Arc<InMemoryLeaseProvider>,
    pub engine: Arc<BisectEngine>,
    pub ticker: BisectTicker,
    pub service: BisectService,
}

impl BisectHarness {
    pub fn new(config: BisectConfig) -> Self {
        let commits = Arc::new(FakeCommitHistory::new());
        let jobs = Arc::new(FakeJobStore::new());
        let streams = Arc::new(FakeStreamConfig::new());
        let tasks = Arc::new(InMemoryBisectTaskRepository::new());
        let leases = Arc::new(InMemoryLeaseProvider::new());

        streams.insert(StreamFixture::simple());

        let engine = Arc::new(BisectEngine::new(
            streams.clone(),
            commits.clone(),
            jobs.clone(),
            config.clone(),
        ));
        let ticker = BisectTicker::new(engine.clone(), tasks.clone(), leases.clone(), config.clone());
        let service = BisectService::new(tasks.clone(), jobs.clone(), config);

        Self {
            commits,
            jobs,
            streams,
            tasks,
            leases,
            engine,
            ticker,
            service,
        }
    }

    /// Record a completed job of the test template with one outcome for the node.
    pub fn add_run(&self, order: i64, outcome: JobStepOutcome) -> oxide_core::ids::JobId {
        self.jobs
            .add_completed(&stream_id(), &template_id(), order, &[(NODE, outcome)])
    }

    /// Start bisecting a failure of the test node in `job_id`.
    pub async fn start(&self, job_id: oxide_core::ids::JobId) -> Result<BisectTask> {
        self.service
            .create(
                job_id,
                NODE,
                JobStepOutcome::Failure,
                "tester",
                CreateBisectTaskOptions::default(),
            )
            .await
    }
}
