//! Error types for the scheduler

use thiserror::Error;

/// Errors that can occur on the scheduler's submission/query surface
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No task is registered under the given id
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// A task with this id was already submitted
    #[error("task id already in use: {0}")]
    DuplicateTask(String),

    /// `wait` elapsed before the task reached a terminal state
    #[error("timed out waiting for task {task_id}")]
    WaitTimeout { task_id: String },
}
