//! Oxide CI Core
//!
//! Core domain types, traits, and error handling for the Oxide CI schedule
//! and bisection services. This crate has minimal dependencies and defines
//! the shared vocabulary used across all other crates.

pub mod bisect;
pub mod commit;
pub mod error;
pub mod ids;
pub mod job;
pub mod lease;
pub mod ports;
pub mod schedule;
pub mod stream;

pub use error::{Error, Result};
pub use ids::*;
