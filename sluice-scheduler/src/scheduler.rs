//! Background job scheduler
//!
//! Tracks tasks through PENDING -> RUNNING -> {COMPLETED, FAILED,
//! CANCELLED}. Admission from PENDING to RUNNING is gated by a counting
//! semaphore of `max_concurrent` permits, so the number of RUNNING tasks
//! never exceeds the cap no matter how many are submitted. Each task is
//! mutated only by the spawned worker that owns it; external callers read
//! snapshots or signal cancellation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info, warn};

use sluice_core::domain::task::{Task, TaskKind, TaskStatus};
use sluice_core::dto::task::CommandSpec;

use crate::callable::run_callable;
use crate::command::run_command;
use crate::error::SchedulerError;

/// Terminal result of one job execution
pub(crate) enum JobOutcome {
    Completed(serde_json::Value),
    Failed(String),
    Cancelled,
}

/// Suspends until the cancel flag is raised; pends forever if the flag's
/// sender is gone (the task table owns it for the process lifetime)
pub(crate) async fn cancelled(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        std::future::pending::<()>().await;
    }
}

struct TaskEntry {
    task: Task,
    status_tx: watch::Sender<TaskStatus>,
    cancel_tx: watch::Sender<bool>,
}

struct Inner {
    semaphore: Arc<Semaphore>,
    tasks: Mutex<HashMap<String, TaskEntry>>,
}

/// Background job scheduler
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

impl Scheduler {
    /// Creates a scheduler admitting at most `max_concurrent` RUNNING tasks
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                semaphore: Arc::new(Semaphore::new(max_concurrent)),
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Submits an external-process job
    ///
    /// Registers the task as PENDING and returns immediately; execution
    /// starts asynchronously once the semaphore admits it.
    pub fn submit_command(
        &self,
        task_id: impl Into<String>,
        spec: CommandSpec,
    ) -> Result<String, SchedulerError> {
        let task_id = task_id.into();
        let mut cancel_rx = self.inner.register(&task_id, TaskKind::Command)?;

        let inner = self.inner.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let Ok(_permit) = inner.semaphore.clone().acquire_owned().await else {
                inner.finish(&id, JobOutcome::Failed("scheduler unavailable".into()));
                return;
            };
            inner.mark_running(&id);
            let outcome = run_command(spec, &mut cancel_rx).await;
            inner.finish(&id, outcome);
        });

        Ok(task_id)
    }

    /// Submits an in-process async job
    ///
    /// The callable is constructed lazily, after the semaphore admits the
    /// task, and raced against the task's cancel flag.
    pub fn submit_callable<F, Fut>(
        &self,
        task_id: impl Into<String>,
        f: F,
    ) -> Result<String, SchedulerError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<serde_json::Value>> + Send + 'static,
    {
        let task_id = task_id.into();
        let mut cancel_rx = self.inner.register(&task_id, TaskKind::Callable)?;

        let inner = self.inner.clone();
        let id = task_id.clone();
        tokio::spawn(async move {
            let Ok(_permit) = inner.semaphore.clone().acquire_owned().await else {
                inner.finish(&id, JobOutcome::Failed("scheduler unavailable".into()));
                return;
            };
            inner.mark_running(&id);
            let outcome = run_callable(f(), &mut cancel_rx).await;
            inner.finish(&id, outcome);
        });

        Ok(task_id)
    }

    /// Snapshot of one task
    pub fn get_status(&self, task_id: &str) -> Result<Task, SchedulerError> {
        let tasks = self.inner.tasks.lock().unwrap();
        tasks
            .get(task_id)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))
    }

    /// Signals cancellation to a RUNNING task
    ///
    /// Returns true only when a RUNNING task was actually signalled;
    /// PENDING and terminal tasks return false.
    pub fn cancel(&self, task_id: &str) -> bool {
        let tasks = self.inner.tasks.lock().unwrap();
        match tasks.get(task_id) {
            Some(entry) if entry.task.status == TaskStatus::Running => {
                info!("Cancelling task {}", task_id);
                entry.cancel_tx.send_replace(true);
                true
            }
            _ => false,
        }
    }

    /// Snapshots of every task currently in `status`
    pub fn list_by_status(&self, status: TaskStatus) -> Vec<Task> {
        let tasks = self.inner.tasks.lock().unwrap();
        tasks
            .values()
            .filter(|entry| entry.task.status == status)
            .map(|entry| entry.task.clone())
            .collect()
    }

    /// Suspends until the task reaches a terminal state or `timeout` fires
    pub async fn wait(&self, task_id: &str, timeout: Duration) -> Result<Task, SchedulerError> {
        let mut status_rx = {
            let tasks = self.inner.tasks.lock().unwrap();
            tasks
                .get(task_id)
                .map(|entry| entry.status_tx.subscribe())
                .ok_or_else(|| SchedulerError::TaskNotFound(task_id.to_string()))?
        };

        let terminal = tokio::time::timeout(
            timeout,
            status_rx.wait_for(|status| status.is_terminal()),
        )
        .await;

        match terminal {
            Ok(_) => self.get_status(task_id),
            Err(_) => Err(SchedulerError::WaitTimeout {
                task_id: task_id.to_string(),
            }),
        }
    }

    /// Best-effort progress update for the owning job
    pub fn set_progress(&self, task_id: &str, progress: f32) {
        let mut tasks = self.inner.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(task_id) {
            entry.task.progress = progress.clamp(0.0, 1.0);
        }
    }

    /// Signals cancel to every RUNNING task and waits up to `grace` for
    /// each to reach a terminal state
    pub async fn shutdown(&self, grace: Duration) {
        let running: Vec<(String, watch::Receiver<TaskStatus>)> = {
            let tasks = self.inner.tasks.lock().unwrap();
            tasks
                .values()
                .filter(|entry| entry.task.status == TaskStatus::Running)
                .map(|entry| {
                    entry.cancel_tx.send_replace(true);
                    (entry.task.task_id.clone(), entry.status_tx.subscribe())
                })
                .collect()
        };

        info!("Scheduler shutdown: cancelling {} running task(s)", running.len());

        for (task_id, mut status_rx) in running {
            let stopped = tokio::time::timeout(
                grace,
                status_rx.wait_for(|status| status.is_terminal()),
            )
            .await;
            if stopped.is_err() {
                warn!("Task {} did not stop within the grace period", task_id);
            }
        }
    }
}

impl Inner {
    /// Registers a fresh PENDING task and hands back its cancel flag
    fn register(
        &self,
        task_id: &str,
        kind: TaskKind,
    ) -> Result<watch::Receiver<bool>, SchedulerError> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(task_id) {
            return Err(SchedulerError::DuplicateTask(task_id.to_string()));
        }

        let (status_tx, _) = watch::channel(TaskStatus::Pending);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        tasks.insert(
            task_id.to_string(),
            TaskEntry {
                task: Task::pending(task_id, kind),
                status_tx,
                cancel_tx,
            },
        );
        debug!("Task {} registered as pending", task_id);
        Ok(cancel_rx)
    }

    /// PENDING -> RUNNING, performed by the owning worker after admission
    fn mark_running(&self, task_id: &str) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(entry) = tasks.get_mut(task_id) {
            entry.task.status = TaskStatus::Running;
            entry.task.started_at = Some(chrono::Utc::now());
            entry.status_tx.send_replace(TaskStatus::Running);
            debug!("Task {} running", task_id);
        }
    }

    /// RUNNING -> terminal, performed exactly once by the owning worker
    fn finish(&self, task_id: &str, outcome: JobOutcome) {
        let mut tasks = self.tasks.lock().unwrap();
        let Some(entry) = tasks.get_mut(task_id) else {
            return;
        };
        // Terminal states are absorbing.
        if entry.task.status.is_terminal() {
            return;
        }

        let status = match outcome {
            JobOutcome::Completed(value) => {
                entry.task.result = Some(value);
                entry.task.progress = 1.0;
                TaskStatus::Completed
            }
            JobOutcome::Failed(error) => {
                entry.task.error = Some(error);
                TaskStatus::Failed
            }
            JobOutcome::Cancelled => TaskStatus::Cancelled,
        };

        entry.task.status = status;
        entry.task.completed_at = Some(chrono::Utc::now());
        entry.status_tx.send_replace(status);
        info!("Task {} finished as {:?}", task_id, status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Polls until the task is RUNNING, or panics after a bound
    async fn wait_until_running(scheduler: &Scheduler, task_id: &str) {
        for _ in 0..200 {
            if scheduler.get_status(task_id).unwrap().status == TaskStatus::Running {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {task_id} never reached RUNNING");
    }

    #[tokio::test]
    async fn test_callable_completes_with_result() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-ok", || async { Ok(serde_json::json!({"n": 42})) })
            .unwrap();

        let task = scheduler.wait("t-ok", Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        assert_eq!(task.result, Some(serde_json::json!({"n": 42})));
        assert_eq!(task.progress, 1.0);
        assert!(task.started_at.is_some());
        assert!(task.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_raising_callable_fails_with_error_text() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-boom", || async {
                Err(anyhow::anyhow!("ValueError: boom"))
            })
            .unwrap();

        let task = scheduler.wait("t-boom", Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_ref().unwrap().contains("boom"));
    }

    #[tokio::test]
    async fn test_command_captures_stdout() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_command("t-echo", CommandSpec::shell("echo hello"))
            .unwrap();

        let task = scheduler.wait("t-echo", Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Completed);
        let stdout = task.result.unwrap()["stdout"].as_str().unwrap().to_string();
        assert!(stdout.contains("hello"));
    }

    #[tokio::test]
    async fn test_command_nonzero_exit_fails_with_stderr() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_command("t-bad", CommandSpec::shell("echo oops >&2; exit 3"))
            .unwrap();

        let task = scheduler.wait("t-bad", Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        let error = task.error.unwrap();
        assert!(error.contains("3"));
        assert!(error.contains("oops"));
    }

    #[tokio::test]
    async fn test_command_timeout_fails_with_diagnostic() {
        let scheduler = Scheduler::new(2);
        let started = Instant::now();
        scheduler
            .submit_command(
                "t-slow",
                CommandSpec::shell("sleep 5").with_timeout(Duration::from_secs(1)),
            )
            .unwrap();

        let task = scheduler.wait("t-slow", Duration::from_secs(10)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Failed);
        assert!(task.error.as_ref().unwrap().contains("timed out"));
        // Well under the sleep's 5 s: the timeout did the stopping.
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancel_running_command() {
        // The shell forks `sleep` as a grandchild; cancellation must stop
        // the whole process group, not just the immediate `sh`.
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_command("t-cancel", CommandSpec::shell("sleep 30"))
            .unwrap();
        wait_until_running(&scheduler, "t-cancel").await;

        let signalled = Instant::now();
        assert!(scheduler.cancel("t-cancel"));
        let task = scheduler
            .wait("t-cancel", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
        // Sleep honors SIGTERM, so nothing should linger near the grace
        // period, let alone the sleep's 30 s.
        assert!(signalled.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_cancel_running_callable() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-long", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(serde_json::Value::Null)
            })
            .unwrap();
        wait_until_running(&scheduler, "t-long").await;

        assert!(scheduler.cancel("t-long"));
        let task = scheduler.wait("t-long", Duration::from_secs(5)).await.unwrap();
        assert_eq!(task.status, TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_completed_task_returns_false() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-done", || async { Ok(serde_json::Value::Null) })
            .unwrap();
        scheduler.wait("t-done", Duration::from_secs(5)).await.unwrap();

        assert!(!scheduler.cancel("t-done"));
        // Terminal states are absorbing.
        assert_eq!(
            scheduler.get_status("t-done").unwrap().status,
            TaskStatus::Completed
        );
    }

    #[tokio::test]
    async fn test_cancel_pending_task_returns_false() {
        let scheduler = Scheduler::new(1);
        scheduler
            .submit_callable("t-hog", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(serde_json::Value::Null)
            })
            .unwrap();
        wait_until_running(&scheduler, "t-hog").await;

        // Second task cannot be admitted while the hog runs.
        scheduler
            .submit_callable("t-queued", || async { Ok(serde_json::Value::Null) })
            .unwrap();
        assert_eq!(
            scheduler.get_status("t-queued").unwrap().status,
            TaskStatus::Pending
        );
        assert!(!scheduler.cancel("t-queued"));

        scheduler.cancel("t-hog");
    }

    #[tokio::test]
    async fn test_running_never_exceeds_max_concurrent() {
        let scheduler = Scheduler::new(2);
        for i in 0..6 {
            scheduler
                .submit_callable(format!("t-{i}"), || async {
                    tokio::time::sleep(Duration::from_millis(150)).await;
                    Ok(serde_json::Value::Null)
                })
                .unwrap();
        }

        let mut saw_running = false;
        for _ in 0..40 {
            let running = scheduler.list_by_status(TaskStatus::Running).len();
            assert!(running <= 2, "observed {running} running tasks");
            saw_running |= running > 0;
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        assert!(saw_running);

        for i in 0..6 {
            let task = scheduler
                .wait(&format!("t-{i}"), Duration::from_secs(10))
                .await
                .unwrap();
            assert_eq!(task.status, TaskStatus::Completed);
        }
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-forever", || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(serde_json::Value::Null)
            })
            .unwrap();

        let err = scheduler
            .wait("t-forever", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::WaitTimeout { .. }));

        scheduler.cancel("t-forever");
    }

    #[tokio::test]
    async fn test_duplicate_task_id_is_rejected() {
        let scheduler = Scheduler::new(2);
        scheduler
            .submit_callable("t-dup", || async { Ok(serde_json::Value::Null) })
            .unwrap();

        let err = scheduler
            .submit_callable("t-dup", || async { Ok(serde_json::Value::Null) })
            .unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateTask(_)));
    }

    #[tokio::test]
    async fn test_unknown_task_is_not_found() {
        let scheduler = Scheduler::new(2);
        assert!(matches!(
            scheduler.get_status("ghost"),
            Err(SchedulerError::TaskNotFound(_))
        ));
        assert!(!scheduler.cancel("ghost"));
    }

    #[tokio::test]
    async fn test_shutdown_cancels_running_tasks() {
        let scheduler = Scheduler::new(4);
        for i in 0..2 {
            scheduler
                .submit_callable(format!("t-{i}"), || async {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    Ok(serde_json::Value::Null)
                })
                .unwrap();
        }
        wait_until_running(&scheduler, "t-0").await;
        wait_until_running(&scheduler, "t-1").await;

        scheduler.shutdown(Duration::from_secs(5)).await;

        for i in 0..2 {
            assert_eq!(
                scheduler.get_status(&format!("t-{i}")).unwrap().status,
                TaskStatus::Cancelled
            );
        }
    }

    #[tokio::test]
    async fn test_progress_updates_are_visible() {
        let scheduler = Scheduler::new(1);
        let handle = scheduler.clone();
        scheduler
            .submit_callable("t-progress", move || async move {
                handle.set_progress("t-progress", 0.5);
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(serde_json::Value::Null)
            })
            .unwrap();

        wait_until_running(&scheduler, "t-progress").await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(scheduler.get_status("t-progress").unwrap().progress, 0.5);

        let task = scheduler
            .wait("t-progress", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(task.progress, 1.0);
    }
}
