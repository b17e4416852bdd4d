//! Record domain types
//!
//! A record is the unit of data flowing through a pipeline: identifying
//! file metadata, a text and a binary payload, a free-form extension bag,
//! and two engine-managed fields (`execute_status`, `failure_reason`).
//! Identity (`file_id`) is immutable; content changes as stages run.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::failure::FailureReason;

/// Terminal status of one stage pass over a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecuteStatus {
    Completed,
    Failed,
}

/// The unit of data flowing through a pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Record {
    /// Stable identity of the source file
    pub file_id: String,
    pub file_name: String,
    pub file_type: String,
    pub file_path: String,
    pub file_size: u64,

    /// Text payload
    #[serde(default)]
    pub text: String,
    /// Binary payload
    #[serde(default)]
    pub bytes: Vec<u8>,

    /// Pipeline run this record belongs to (nil until augmented)
    #[serde(default = "Uuid::nil")]
    pub instance_id: Uuid,
    /// Destination path for exported output
    #[serde(default)]
    pub export_path: String,

    /// Free-form per-record extension parameters
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,

    /// Fan-out size, set by the Slicer harness on every child record
    #[serde(default)]
    pub slice_count: Option<u32>,

    /// Set exactly once per stage pass by the call harness
    #[serde(default)]
    pub execute_status: Option<ExecuteStatus>,
    /// Present only when `execute_status` is `Failed`
    #[serde(default)]
    pub failure_reason: Option<FailureReason>,
}

impl Record {
    /// Creates a record with identity fields set and empty payloads
    pub fn new(file_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            file_id: file_id.into(),
            file_name: file_name.into(),
            instance_id: Uuid::nil(),
            ..Default::default()
        }
    }

    /// Combined payload length, used for audit sizes
    ///
    /// A record drained by a Filter (both payloads empty) reports 0.
    pub fn payload_size(&self) -> u64 {
        (self.text.len() + self.bytes.len()) as u64
    }

    /// Whether both payloads are empty (the Filter drop condition)
    pub fn is_drained(&self) -> bool {
        self.text.is_empty() && self.bytes.is_empty()
    }

    /// Whether a prior stage already marked this record failed
    pub fn is_failed(&self) -> bool {
        self.execute_status == Some(ExecuteStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_size_counts_both_payloads() {
        let mut record = Record::new("f-1", "a.txt");
        record.text = "abc".to_string();
        record.bytes = vec![0u8; 5];
        assert_eq!(record.payload_size(), 8);
        assert!(!record.is_drained());
    }

    #[test]
    fn test_drained_record_has_zero_size() {
        let record = Record::new("f-1", "a.txt");
        assert!(record.is_drained());
        assert_eq!(record.payload_size(), 0);
    }

    #[test]
    fn test_is_failed_reflects_status() {
        let mut record = Record::new("f-1", "a.txt");
        assert!(!record.is_failed());
        record.execute_status = Some(ExecuteStatus::Failed);
        assert!(record.is_failed());
    }
}
