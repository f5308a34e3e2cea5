//! PostgreSQL implementation of ScheduleRepository.

use async_trait::async_trait;
use oxide_core::commit::CommitIdWithOrder;
use oxide_core::ids::{JobId, StreamId, TemplateId};
use oxide_core::ports::ScheduleRepository;
use oxide_core::schedule::{Schedule, ScheduleConfig};
use oxide_core::{Error, Result};
use sqlx::{PgPool, Row};

const SELECT_COLUMNS: &str = "SELECT stream_id, template_id, config, last_trigger_order, last_trigger_name, last_trigger_time, active_jobs FROM schedules";

/// PostgreSQL implementation of ScheduleRepository.
pub struct PgScheduleRepository {
    pool: PgPool,
}

impl PgScheduleRepository {
    /// Create a new PgScheduleRepository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_schedule(&self, r: &sqlx::postgres::PgRow) -> Result<Schedule> {
        let config: ScheduleConfig = serde_json::from_value(r.get("config"))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let active_jobs: Vec<JobId> = serde_json::from_value(r.get("active_jobs"))
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let last_trigger_commit_id = r
            .get::<Option<i64>, _>("last_trigger_order")
            .map(|order| CommitIdWithOrder {
                order,
                name: r.get("last_trigger_name"),
            });

        Ok(Schedule {
            stream_id: StreamId::new(r.get::<String, _>("stream_id")),
            template_id: TemplateId::new(r.get::<String, _>("template_id")),
            config,
            last_trigger_commit_id,
            last_trigger_time: r.get("last_trigger_time"),
            active_jobs,
        })
    }
}

#[async_trait]
impl ScheduleRepository for PgScheduleRepository {
    async fn get(
        &self,
        stream_id: &StreamId,
        template_id: &TemplateId,
    ) -> Result<Option<Schedule>> {
        let row = sqlx::query(&format!(
            "{} WHERE stream_id = $1 AND template_id = $2",
            SELECT_COLUMNS
        ))
        .bind(stream_id.as_str())
        .bind(template_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        match row {
            Some(r) => Ok(Some(self.row_to_schedule(&r)?)),
            None => Ok(None),
        }
    }

    async fn find(&self, enabled_only: bool) -> Result<Vec<Schedule>> {
        let rows = sqlx::query(&format!(
            "{} WHERE ($1 = FALSE OR enabled = TRUE) ORDER BY stream_id, template_id",
            SELECT_COLUMNS
        ))
        .bind(enabled_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        rows.iter().map(|r| self.row_to_schedule(r)).collect()
    }

    async fn upsert_config(&self, schedule: &Schedule) -> Result<()> {
        let config_json = serde_json::to_value(&schedule.config)
            .map_err(|e| Error::Serialization(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO schedules (stream_id, template_id, enabled, config)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (stream_id, template_id)
               DO UPDATE SET enabled = EXCLUDED.enabled, config = EXCLUDED.config, updated_at = NOW()"#,
        )
        .bind(schedule.stream_id.as_str())
        .bind(schedule.template_id.as_str())
        .bind(schedule.config.enabled)
        .bind(&config_json)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(())
    }

    async fn save_state(&self, schedule: &Schedule) -> Result<()> {
        let active_jobs_json = serde_json::to_value(&schedule.active_jobs)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        let last = schedule.last_trigger_commit_id.as_ref();

        let result = sqlx::query(
            "UPDATE schedules SET last_trigger_order = $3, last_trigger_name = $4, last_trigger_time = $5, active_jobs = $6, updated_at = NOW() WHERE stream_id = $1 AND template_id = $2",
        )
        .bind(schedule.stream_id.as_str())
        .bind(schedule.template_id.as_str())
        .bind(last.map(|c| c.order))
        .bind(last.and_then(|c| c.name.clone()))
        .bind(schedule.last_trigger_time)
        .bind(&active_jobs_json)
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(Error::ScheduleNotFound {
                stream: schedule.stream_id.to_string(),
                template: schedule.template_id.to_string(),
            });
        }

        Ok(())
    }
}
