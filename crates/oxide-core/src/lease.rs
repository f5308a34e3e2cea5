//! Lease guard over a [`LeaseProvider`].

use crate::Result;
use crate::ports::LeaseProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use uuid::Uuid;

/// Proof of ownership handed out by a lease provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LeaseToken(Uuid);

impl LeaseToken {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for LeaseToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LeaseToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A held lease.
///
/// Call [`Lease::release`] when done. Dropping an unreleased lease spawns a
/// best-effort release on the current Tokio runtime; [`Lease::forget`]
/// leaves it to expire at its TTL instead.
pub struct Lease {
    provider: Arc<dyn LeaseProvider>,
    key: String,
    token: Option<LeaseToken>,
}

impl Lease {
    /// Try to acquire a lease, returning `None` if it is held elsewhere.
    pub async fn acquire(
        provider: Arc<dyn LeaseProvider>,
        key: impl Into<String>,
        ttl: Duration,
    ) -> Result<Option<Self>> {
        let key = key.into();
        let token = provider.try_acquire(&key, ttl).await?;
        Ok(token.map(|token| Self {
            provider,
            key,
            token: Some(token),
        }))
    }

    /// Release the lease now.
    pub async fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.provider.release(&self.key, &token).await,
            None => Ok(()),
        }
    }

    /// Keep the lease until its TTL expires.
    pub fn forget(mut self) {
        self.token = None;
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            warn!(key = %self.key, "Lease dropped outside a runtime; left to expire");
            return;
        };
        let provider = Arc::clone(&self.provider);
        let key = std::mem::take(&mut self.key);
        handle.spawn(async move {
            if let Err(e) = provider.release(&key, &token).await {
                warn!(key = %key, error = %e, "Failed to release dropped lease");
            }
        });
    }
}
