//! Repository implementations for PostgreSQL.

mod bisect;
mod lease;
mod queue;
mod schedule;

pub use bisect::PgBisectTaskRepository;
pub use lease::PgLeaseProvider;
pub use queue::PgWorkQueue;
pub use schedule::PgScheduleRepository;
