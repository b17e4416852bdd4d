//! Operator contract
//!
//! Every pipeline step implements one of three trait kinds:
//! - [`Mapper`]: one record in, one record out. LLM-calling steps are
//!   mappers whose `execute` awaits a remote completion call.
//! - [`Filter`]: one record in, one record out; the harness drops the
//!   record when both payloads come back empty.
//! - [`Slicer`]: one record in, zero or more records out (chunking,
//!   tiling).
//!
//! Operators are constructed by an [`OperatorFactory`] from keyword-style
//! init parameters plus engine-injected context. Concrete operator
//! algorithms live outside this crate; only the calling convention is
//! defined here.

pub mod harness;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use sluice_core::domain::record::Record;

use crate::error::PipelineError;

/// The kind of a pipeline step, driving harness dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Mapper,
    Filter,
    Slicer,
}

impl std::fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatorKind::Mapper => f.write_str("mapper"),
            OperatorKind::Filter => f.write_str("filter"),
            OperatorKind::Slicer => f.write_str("slicer"),
        }
    }
}

/// Failure raised by an operator's `execute`
///
/// Variants mirror the classifier's stable categories; anything that does
/// not fit maps to `Other` and classifies as unknown.
#[derive(Debug, Error)]
pub enum OperatorError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// 1:1 transform; any field may change, none may be dropped by contract
#[async_trait]
pub trait Mapper: Send + Sync {
    async fn execute(&self, record: Record) -> Result<Record, OperatorError>;
}

/// 1:1-or-drop transform
///
/// Implementations signal a drop by draining both payloads; the harness
/// treats a drained record as filtered-out, not failed.
#[async_trait]
pub trait Filter: Send + Sync {
    async fn execute(&self, record: Record) -> Result<Record, OperatorError>;
}

/// 1:N fan-out transform
#[async_trait]
pub trait Slicer: Send + Sync {
    async fn execute(&self, record: Record) -> Result<Vec<Record>, OperatorError>;
}

/// A constructed pipeline step of one of the three kinds
pub enum Operator {
    Mapper(Box<dyn Mapper>),
    Filter(Box<dyn Filter>),
    Slicer(Box<dyn Slicer>),
}

impl Operator {
    pub fn kind(&self) -> OperatorKind {
        match self {
            Operator::Mapper(_) => OperatorKind::Mapper,
            Operator::Filter(_) => OperatorKind::Filter,
            Operator::Slicer(_) => OperatorKind::Slicer,
        }
    }
}

/// Engine-injected construction context for an operator instance
#[derive(Debug, Clone)]
pub struct OperatorInit {
    /// Keyword-style init parameters from the pipeline submission
    pub params: HashMap<String, serde_json::Value>,
    /// Pipeline run this instance belongs to
    pub instance_id: Uuid,
    pub is_first: bool,
    pub is_last: bool,
}

impl OperatorInit {
    pub fn new(instance_id: Uuid) -> Self {
        Self {
            params: HashMap::new(),
            instance_id,
            is_first: false,
            is_last: false,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, serde_json::Value>) -> Self {
        self.params = params;
        self
    }
}

/// Construction seam for operator plugins
///
/// Factories are what the registry resolves; `build` runs once per stage
/// per pipeline run. Rejecting bad init parameters here is the only way an
/// operator can abort a run.
pub trait OperatorFactory: Send + Sync {
    fn build(&self, init: OperatorInit) -> Result<Operator, PipelineError>;
}
