//! Callable job execution
//!
//! Runs a caller-supplied async unit of work raced against the task's
//! cancel flag. Cancellation drops the future at its next await point.

use std::future::Future;
use tokio::sync::watch;
use tracing::debug;

use crate::scheduler::{JobOutcome, cancelled};

/// Runs one callable job to an outcome
pub(crate) async fn run_callable<Fut>(fut: Fut, cancel: &mut watch::Receiver<bool>) -> JobOutcome
where
    Fut: Future<Output = anyhow::Result<serde_json::Value>>,
{
    tokio::select! {
        result = fut => match result {
            Ok(value) => JobOutcome::Completed(value),
            Err(err) => JobOutcome::Failed(format!("{err:#}")),
        },
        _ = cancelled(cancel) => {
            debug!("Callable job cancelled");
            JobOutcome::Cancelled
        }
    }
}
