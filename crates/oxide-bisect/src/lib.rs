//! Automated bisection for Oxide CI.
//!
//! A bisect task narrows the range of commits in which a node started to
//! fail by launching probe jobs at the median of the remaining candidates.

pub mod config;
pub mod engine;
pub mod service;
pub mod ticker;

pub use config::BisectConfig;
pub use engine::{BisectEngine, Evaluation};
pub use service::{BisectService, UpdateBisectTaskOptions};
pub use ticker::{BisectTickSummary, BisectTicker};
