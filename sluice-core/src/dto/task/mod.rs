//! Task submission and status DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

use crate::domain::task::{Task, TaskKind, TaskStatus};

/// Spec for an external-process job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program (or shell line when `shell` is set)
    pub command: String,
    /// Run through `sh -c` instead of spawning the program directly
    #[serde(default)]
    pub shell: bool,
    /// Per-job timeout in milliseconds; None means no timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Extra environment variables for the child
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Working directory override
    #[serde(default)]
    pub cwd: Option<String>,
}

impl CommandSpec {
    /// Creates a spec running `command` through the shell
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: true,
            timeout_ms: None,
            env: HashMap::new(),
            cwd: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// The per-job timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Client-facing task snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDto {
    pub task_id: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    pub error: Option<String>,
    pub progress: f32,
}

impl From<&Task> for TaskDto {
    fn from(task: &Task) -> Self {
        Self {
            task_id: task.task_id.clone(),
            kind: task.kind,
            status: task.status,
            created_at: task.created_at,
            started_at: task.started_at,
            completed_at: task.completed_at,
            error: task.error.clone(),
            progress: task.progress,
        }
    }
}
