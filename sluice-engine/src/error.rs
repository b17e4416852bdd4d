//! Pipeline-construction error types
//!
//! These are the only errors a pipeline run surfaces to its submitter.
//! Per-record operator failures never appear here; they are recovered by
//! the call harness and recorded on the record itself.

use thiserror::Error;

use crate::registry::RegistryError;
use crate::sink::SinkError;

/// Errors that abort a whole pipeline run
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Pipelines with zero operators are rejected before any pool exists
    #[error("pipeline has no operators")]
    EmptyPipeline,

    /// No operator is flagged as the last stage, so no audit row would
    /// ever be written for the run
    #[error("pipeline has no terminal stage")]
    NoTerminalStage,

    /// A stage declared an invalid resource spec
    #[error("invalid resource spec for operator '{operator}': {reason}")]
    InvalidResource { operator: String, reason: String },

    /// A stage's resource requirements cannot be met by any worker
    #[error("no worker satisfies resource spec for operator '{operator}': {reason}")]
    UnsatisfiableResource { operator: String, reason: String },

    /// Operator name could not be resolved or its module failed to load
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Operator construction rejected its init parameters
    #[error("failed to construct operator '{operator}': {reason}")]
    Construction { operator: String, reason: String },

    /// Audit persistence failed past its retry budget; audit loss is a
    /// run-level correctness failure
    #[error("audit sink failure: {0}")]
    Audit(#[from] SinkError),

    /// A stage worker panicked or was torn down unexpectedly
    #[error("stage worker failed: {0}")]
    Worker(String),
}

impl PipelineError {
    /// Shorthand for construction failures
    pub fn construction(operator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Construction {
            operator: operator.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for invalid resource specs
    pub fn invalid_resource(operator: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::InvalidResource {
            operator: operator.into(),
            reason: reason.to_string(),
        }
    }
}
