//! Persistence layer for Oxide CI schedules and bisect tasks.
//!
//! PostgreSQL repositories live in [`repositories`]; [`memory`] provides
//! process-local implementations of the same ports.

pub mod memory;
pub mod repositories;

pub use memory::{InMemoryBisectTaskRepository, InMemoryLeaseProvider, InMemoryScheduleRepository};
pub use repositories::*;

use oxide_core::Result;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::time::Duration;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(|e| oxide_core::Error::Database(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| oxide_core::Error::Database(e.to_string()))?;
        Ok(())
    }
}
