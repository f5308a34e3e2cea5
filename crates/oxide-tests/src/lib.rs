//! Test infrastructure for Oxide CI scheduling and bisection.
//!
//! Engine tests run against the in-memory adapters and the fakes in
//! [`fakes`]. PostgreSQL adapter tests use testcontainers and are gated by
//! the `integration` feature.
//!
//! # Usage
//!
//! ```ignore
//! use oxide_tests::SchedulerHarness;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let h = SchedulerHarness::new(SchedulerConfig::default()).unwrap();
//!     // Use h.commits, h.jobs, h.engine, h.ticker, etc.
//! }
//! ```

pub mod containers;
pub mod context;
pub mod fakes;
pub mod fixtures;
pub mod helpers;

pub use context::TestContext;
pub use fakes::*;
pub use fixtures::*;
pub use helpers::*;

/// Initialize test logging (call once per test binary).
pub fn init_test_logging() {
    use tracing_subscriber::{EnvFilter, fmt};

    let _ = fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("warn,oxide_scheduler=debug,oxide_bisect=debug")),
        )
        .with_test_writer()
        .try_init();
}
