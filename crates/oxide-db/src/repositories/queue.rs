//! PostgreSQL-backed schedule work queue.

use async_trait::async_trait;
use oxide_core::ports::WorkQueue;
use oxide_core::schedule::ScheduleQueueItem;
use oxide_core::{Error, Result};
use sqlx::{PgPool, Row};
use tracing::warn;

pub struct PgWorkQueue {
    pool: PgPool,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn push(&self, item: &ScheduleQueueItem, score: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO schedule_queue (item, score) VALUES ($1, $2) ON CONFLICT (item) DO UPDATE SET score = EXCLUDED.score",
        )
        .bind(item.to_string())
        .bind(score)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(())
    }

    async fn pop_lowest(&self, max_score: i64) -> Result<Option<ScheduleQueueItem>> {
        let row = sqlx::query(
            r#"DELETE FROM schedule_queue
               WHERE item = (
                   SELECT item FROM schedule_queue
                   WHERE score <= $1
                   ORDER BY score, item
                   LIMIT 1
                   FOR UPDATE SKIP LOCKED
               )
               RETURNING item"#,
        )
        .bind(max_score)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Queue(e.to_string()))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let member: String = row.get("item");
        match ScheduleQueueItem::parse(&member) {
            Some(item) => Ok(Some(item)),
            None => {
                warn!(item = %member, "Discarding malformed queue item");
                Ok(None)
            }
        }
    }

    async fn remove(&self, item: &ScheduleQueueItem) -> Result<()> {
        sqlx::query("DELETE FROM schedule_queue WHERE item = $1")
            .bind(item.to_string())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM schedule_queue")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| Error::Queue(e.to_string()))?;

        Ok(row.get::<i64, _>("count") as usize)
    }
}
