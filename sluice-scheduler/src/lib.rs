//! Sluice Scheduler
//!
//! Background job scheduler for the Sluice platform: runs external-process
//! jobs and in-process async callables under a global concurrency cap,
//! with lifecycle tracking, cancellation and per-job timeouts. Independent
//! of the pipeline executor; the API layer polls it for status.

mod callable;
mod command;
pub mod error;
pub mod scheduler;

pub use error::SchedulerError;
pub use scheduler::Scheduler;
