//! PostgreSQL-backed leases.

use async_trait::async_trait;
use oxide_core::lease::LeaseToken;
use oxide_core::ports::LeaseProvider;
use oxide_core::{Error, Result};
use sqlx::{PgPool, Row};
use std::time::Duration;

/// Lease table keyed by name. An expired row may be taken over by any caller.
pub struct PgLeaseProvider {
    pool: PgPool,
}

impl PgLeaseProvider {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseProvider for PgLeaseProvider {
    async fn try_acquire(&self, key: &str, ttl: Duration) -> Result<Option<LeaseToken>> {
        let token = LeaseToken::new();

        let row = sqlx::query(
            r#"INSERT INTO leases (key, token, expires_at)
               VALUES ($1, $2, NOW() + make_interval(secs => $3))
               ON CONFLICT (key) DO UPDATE
                 SET token = EXCLUDED.token, expires_at = EXCLUDED.expires_at
                 WHERE leases.expires_at <= NOW()
               RETURNING token"#,
        )
        .bind(key)
        .bind(token.as_uuid())
        .bind(ttl.as_secs_f64())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Lease(e.to_string()))?;

        Ok(row.map(|r| LeaseToken::from_uuid(r.get::<uuid::Uuid, _>("token"))))
    }

    async fn release(&self, key: &str, token: &LeaseToken) -> Result<()> {
        sqlx::query("DELETE FROM leases WHERE key = $1 AND token = $2")
            .bind(key)
            .bind(token.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Lease(e.to_string()))?;

        Ok(())
    }
}
