//! Test context for database-backed tests.

use crate::containers::PostgresContainer;
use oxide_db::{
    Database, PgBisectTaskRepository, PgLeaseProvider, PgScheduleRepository, PgWorkQueue,
};

/// PostgreSQL container with migrations applied.
///
/// Drop this to stop the container.
pub struct TestContext {
    pub postgres: PostgresContainer,
    pub db: Database,
}

impl TestContext {
    pub async fn new() -> anyhow::Result<Self> {
        crate::init_test_logging();

        let postgres = PostgresContainer::start().await?;
        let db = Database::connect(postgres.connection_string()).await?;
        db.migrate().await?;

        Ok(Self { postgres, db })
    }

    pub fn schedules(&self) -> PgScheduleRepository {
        PgScheduleRepository::new(self.db.pool().clone())
    }

    pub fn bisect_tasks(&self) -> PgBisectTaskRepository {
        PgBisectTaskRepository::new(self.db.pool().clone())
    }

    pub fn leases(&self) -> PgLeaseProvider {
        PgLeaseProvider::new(self.db.pool().clone())
    }

    pub fn queue(&self) -> PgWorkQueue {
        PgWorkQueue::new(self.db.pool().clone())
    }
}
