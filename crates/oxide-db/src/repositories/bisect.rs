//! PostgreSQL implementation of BisectTaskRepository.

use async_trait::async_trait;
use oxide_core::bisect::{BisectTask, BisectTaskQuery, BisectTaskState, BisectTaskUpdate};
use oxide_core::ids::BisectTaskId;
use oxide_core::ports::BisectTaskRepository;
use oxide_core::{Error, Result};
use sqlx::{PgPool, Row};
use tracing::debug;

/// PostgreSQL implementation of BisectTaskRepository.
///
/// Updates are conditional on the stored `update_idx`, so concurrent writers
/// holding the same version race and exactly one wins.
pub struct PgBisectTaskRepository {
    pool: PgPool,
}

impl PgBisectTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_task(&self, r: &sqlx::postgres::PgRow) -> Result<BisectTask> {
        let mut task: BisectTask = serde_json::from_value(r.get("document"))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        // The column is authoritative for the version.
        task.update_idx = r.get::<i32, _>("update_idx") as u32;
        Ok(task)
    }
}

#[async_trait]
impl BisectTaskRepository for PgBisectTaskRepository {
    async fn create(&self, task: &BisectTask) -> Result<()> {
        let document =
            serde_json::to_value(task).map_err(|e| Error::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO bisect_tasks (id, owner_id, stream_id, template_id, state, update_idx, document, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"#,
        )
        .bind(task.id.as_uuid())
        .bind(&task.owner_id)
        .bind(task.stream_id.as_str())
        .bind(task.template_id.as_str())
        .bind(task.state.as_str())
        .bind(task.update_idx as i32)
        .bind(&document)
        .bind(task.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn get(&self, id: BisectTaskId) -> Result<Option<BisectTask>> {
        let row = sqlx::query("SELECT update_idx, document FROM bisect_tasks WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(self.row_to_task(&r)?)),
            None => Ok(None),
        }
    }

    async fn find(&self, query: &BisectTaskQuery) -> Result<Vec<BisectTask>> {
        let rows = sqlx::query(
            r#"SELECT update_idx, document FROM bisect_tasks
               WHERE ($1::TEXT IS NULL OR stream_id = $1)
                 AND ($2::TEXT IS NULL OR template_id = $2)
                 AND ($3::TEXT IS NULL OR owner_id = $3)
                 AND ($4::TEXT IS NULL OR state = $4)
               ORDER BY created_at DESC
               LIMIT $5"#,
        )
        .bind(query.stream_id.as_ref().map(|s| s.as_str()))
        .bind(query.template_id.as_ref().map(|t| t.as_str()))
        .bind(query.owner_id.as_deref())
        .bind(query.state.map(|s| s.as_str()))
        .bind(query.max_results.map(|m| m as i64))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.iter().map(|r| self.row_to_task(r)).collect()
    }

    async fn find_active(&self) -> Result<Vec<BisectTask>> {
        let rows = sqlx::query(
            "SELECT update_idx, document FROM bisect_tasks WHERE state = $1 ORDER BY created_at ASC",
        )
        .bind(BisectTaskState::Running.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.iter().map(|r| self.row_to_task(r)).collect()
    }

    async fn try_update(
        &self,
        task: &BisectTask,
        update: &BisectTaskUpdate,
    ) -> Result<Option<BisectTask>> {
        let next = task.apply(update);
        let document =
            serde_json::to_value(&next).map_err(|e| Error::Serialization(e.to_string()))?;

        let result = sqlx::query(
            "UPDATE bisect_tasks SET state = $3, update_idx = $4, document = $5, updated_at = NOW() WHERE id = $1 AND update_idx = $2",
        )
        .bind(task.id.as_uuid())
        .bind(task.update_idx as i32)
        .bind(next.state.as_str())
        .bind(next.update_idx as i32)
        .bind(&document)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            debug!(task_id = %task.id, update_idx = task.update_idx, "Bisect task version changed");
            return Ok(None);
        }

        Ok(Some(next))
    }
}
