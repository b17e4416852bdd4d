//! Per-record audit outcomes
//!
//! One flat row per record that reached a pipeline's last stage or was
//! dropped by a Filter. Rows are upserted keyed by (instance id, dest id),
//! so a rerun over the same instance overwrites rather than duplicates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::record::{ExecuteStatus, Record};

/// Terminal outcome of one record, as persisted for audit/resumability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub instance_id: Uuid,
    pub source_id: String,
    pub source_name: String,
    pub source_path: String,
    pub dest_id: String,
    pub dest_name: String,
    pub dest_path: String,
    pub file_type: String,
    pub source_size: u64,
    pub dest_size: u64,
    pub status: ExecuteStatus,
    /// Free-text result: failure diagnostic, or "ok" for successes
    pub result: String,
}

impl RecordOutcome {
    /// Builds the audit row for a terminal record
    ///
    /// Destination size is the record's current payload size; a record
    /// drained by a Filter therefore audits with size 0.
    pub fn from_record(record: &Record) -> Self {
        let result = match &record.failure_reason {
            Some(reason) => format!("{}: {}", reason.code, reason.detail),
            None => "ok".to_string(),
        };

        Self {
            instance_id: record.instance_id,
            source_id: record.file_id.clone(),
            source_name: record.file_name.clone(),
            source_path: record.file_path.clone(),
            dest_id: record.file_id.clone(),
            dest_name: record.file_name.clone(),
            dest_path: record.export_path.clone(),
            file_type: record.file_type.clone(),
            source_size: record.file_size,
            dest_size: record.payload_size(),
            status: record.execute_status.unwrap_or(ExecuteStatus::Failed),
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::failure::{ErrorCode, FailureReason};

    #[test]
    fn test_outcome_from_completed_record() {
        let mut record = Record::new("f-1", "a.txt");
        record.instance_id = Uuid::new_v4();
        record.text = "hello".to_string();
        record.execute_status = Some(ExecuteStatus::Completed);

        let outcome = RecordOutcome::from_record(&record);
        assert_eq!(outcome.dest_id, "f-1");
        assert_eq!(outcome.dest_size, 5);
        assert_eq!(outcome.status, ExecuteStatus::Completed);
        assert_eq!(outcome.result, "ok");
    }

    #[test]
    fn test_outcome_carries_failure_diagnostic() {
        let mut record = Record::new("f-2", "b.txt");
        record.execute_status = Some(ExecuteStatus::Failed);
        record.failure_reason = Some(FailureReason {
            operator: "ocr_text".to_string(),
            code: ErrorCode::Timeout,
            detail: "model call timed out".to_string(),
        });

        let outcome = RecordOutcome::from_record(&record);
        assert_eq!(outcome.status, ExecuteStatus::Failed);
        assert!(outcome.result.contains("TIMEOUT"));
        assert!(outcome.result.contains("model call timed out"));
    }
}
