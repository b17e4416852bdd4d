//! Pipeline submission DTOs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::pipeline::{OperatorSpec, PipelineConfig, ResourceSpec};

/// One operator entry in a submitted pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorSubmission {
    pub name: String,
    #[serde(default)]
    pub params: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub resource: ResourceSpec,
}

/// A pipeline as submitted by the API layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSubmission {
    pub instance_id: Uuid,
    pub dataset_path: String,
    pub export_path: String,
    pub operators: Vec<OperatorSubmission>,
}

impl PipelineSubmission {
    /// Converts the submission into a normalized run config
    ///
    /// Position flags (`is_first`/`is_last`) are derived here; submitters
    /// never set them.
    pub fn into_config(self) -> PipelineConfig {
        let operators = self
            .operators
            .into_iter()
            .map(|op| {
                OperatorSpec::new(op.name)
                    .with_params(op.params)
                    .with_resource(op.resource)
            })
            .collect();

        PipelineConfig::new(
            self.instance_id,
            self.dataset_path,
            self.export_path,
            operators,
        )
    }
}
