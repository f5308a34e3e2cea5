//! Schedule triggering for Oxide CI.
//!
//! [`TriggerEngine`] decides which commits a schedule should build;
//! [`ScheduleTicker`] drives it across instances through a shared work queue
//! and leases.

pub mod cadence;
pub mod config;
pub mod filters;
pub mod queue;
pub mod ticker;
pub mod trigger;

pub use config::SchedulerConfig;
pub use queue::ScheduleQueue;
pub use ticker::{ScheduleTicker, TickSummary};
pub use trigger::TriggerEngine;
