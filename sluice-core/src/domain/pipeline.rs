//! Pipeline configuration types
//!
//! A pipeline is an ordered list of operator specs plus run-wide constants.
//! Configs are immutable once a run starts; reruns create a new instance id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Declared resource requirements for one stage's worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// CPU fraction per worker, must be > 0 for a runnable stage
    pub cpu: f64,
    /// Optional memory ceiling in bytes
    pub memory: Option<u64>,
    /// Required accelerator tag (e.g. "cuda"), if any
    pub accelerator: Option<String>,
    /// Required worker architecture (e.g. "x86_64"), if any
    pub arch: Option<String>,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cpu: 1.0,
            memory: None,
            accelerator: None,
            arch: None,
        }
    }
}

/// One operator bound to its position in a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSpec {
    /// Registry name the operator is resolved by
    pub name: String,
    /// Keyword-style construction parameters
    #[serde(default)]
    pub init_params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub resource: ResourceSpec,
    pub is_first: bool,
    pub is_last: bool,
}

impl OperatorSpec {
    /// Creates a spec with default resources; position flags are set by
    /// [`PipelineConfig::new`]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            init_params: HashMap::new(),
            resource: ResourceSpec::default(),
            is_first: false,
            is_last: false,
        }
    }

    pub fn with_params(mut self, params: HashMap<String, serde_json::Value>) -> Self {
        self.init_params = params;
        self
    }

    pub fn with_resource(mut self, resource: ResourceSpec) -> Self {
        self.resource = resource;
        self
    }
}

/// Configuration for one pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub instance_id: Uuid,
    pub dataset_path: String,
    pub export_path: String,
    pub operators: Vec<OperatorSpec>,
}

impl PipelineConfig {
    /// Creates a config and normalizes `is_first`/`is_last` from position
    pub fn new(
        instance_id: Uuid,
        dataset_path: impl Into<String>,
        export_path: impl Into<String>,
        mut operators: Vec<OperatorSpec>,
    ) -> Self {
        let last = operators.len().saturating_sub(1);
        for (idx, op) in operators.iter_mut().enumerate() {
            op.is_first = idx == 0;
            op.is_last = idx == last;
        }
        Self {
            instance_id,
            dataset_path: dataset_path.into(),
            export_path: export_path.into(),
            operators,
        }
    }
}
