//! Background task domain types
//!
//! Structure shared between the scheduler (mutates) and the API layer
//! (polls). A task is mutated only by the scheduler worker that owns it.

use serde::{Deserialize, Serialize};

/// Kind of background work a task runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskKind {
    /// External subprocess
    Command,
    /// In-process async callable
    Callable,
}

/// Task lifecycle status
///
/// Legal transitions: Pending -> Running -> {Completed, Failed, Cancelled}.
/// Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal (absorbing)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

/// Background task record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// Job output: captured stdout for commands, returned value for callables
    pub result: Option<serde_json::Value>,
    /// Error text when the task failed
    pub error: Option<String>,
    /// Progress in [0.0, 1.0], best-effort
    pub progress: f32,
}

impl Task {
    /// Creates a fresh pending task
    pub fn pending(task_id: impl Into<String>, kind: TaskKind) -> Self {
        Self {
            task_id: task_id.into(),
            kind,
            status: TaskStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            progress: 0.0,
        }
    }
}
