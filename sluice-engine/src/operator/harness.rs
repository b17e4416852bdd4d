//! Operator call harness
//!
//! The single calling convention shared by all operator kinds. The harness
//! turns operator failures into classified, non-fatal failure markers on
//! the record, enforces the Filter drop rule and Slicer fan-out metadata,
//! and flushes terminal records to the outcome sink. Only persistence
//! errors escape, and those abort the run.

use std::sync::Arc;
use tracing::{debug, warn};

use sluice_core::domain::failure::FailureReason;
use sluice_core::domain::outcome::RecordOutcome;
use sluice_core::domain::record::{ExecuteStatus, Record};

use crate::classifier::classify;
use crate::operator::{Operator, OperatorError};
use crate::sink::{OutcomeSink, SinkError};

/// Uniform invocation wrapper for one pipeline stage
pub struct OperatorHarness {
    name: String,
    operator: Operator,
    is_last: bool,
    sink: Arc<OutcomeSink>,
}

impl OperatorHarness {
    pub fn new(
        name: impl Into<String>,
        operator: Operator,
        is_last: bool,
        sink: Arc<OutcomeSink>,
    ) -> Self {
        Self {
            name: name.into(),
            operator,
            is_last,
            sink,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invokes the operator on one record
    ///
    /// Returns the records to forward to the next stage: one for mappers,
    /// zero or one for filters, zero or more for slicers. Records that
    /// already carry a prior-stage failure pass through untouched. The
    /// only error this returns is a fatal sink failure.
    pub async fn invoke(&self, record: Record) -> Result<Vec<Record>, SinkError> {
        // Dead records skip the operator entirely but still reach the
        // sink at the last stage.
        if record.is_failed() {
            self.flush_if_last(&record).await?;
            return Ok(vec![record]);
        }

        match &self.operator {
            Operator::Mapper(mapper) => {
                let original = record.clone();
                match mapper.execute(record).await {
                    Ok(out) => {
                        let out = self.complete(out).await?;
                        Ok(vec![out])
                    }
                    Err(err) => Ok(vec![self.fail(original, err).await?]),
                }
            }
            Operator::Filter(filter) => {
                let original = record.clone();
                match filter.execute(record).await {
                    Ok(out) => {
                        if out.is_drained() {
                            // Filtered out, not failed: audit with size 0
                            // and drop from the pipeline.
                            let mut dropped = out;
                            dropped.execute_status = Some(ExecuteStatus::Completed);
                            debug!(
                                "Operator '{}' filtered out record {}",
                                self.name, dropped.file_id
                            );
                            self.flush(&dropped).await?;
                            Ok(Vec::new())
                        } else {
                            let out = self.complete(out).await?;
                            Ok(vec![out])
                        }
                    }
                    Err(err) => Ok(vec![self.fail(original, err).await?]),
                }
            }
            Operator::Slicer(slicer) => {
                let original = record.clone();
                match slicer.execute(record).await {
                    Ok(children) if children.is_empty() => {
                        // Sliced into nothing: audit the parent with size 0
                        // so the record never vanishes without trace.
                        let mut dropped = original;
                        dropped.text.clear();
                        dropped.bytes.clear();
                        dropped.execute_status = Some(ExecuteStatus::Completed);
                        debug!(
                            "Operator '{}' sliced record {} into nothing",
                            self.name, dropped.file_id
                        );
                        self.flush(&dropped).await?;
                        Ok(Vec::new())
                    }
                    Ok(children) => {
                        let fan_out = children.len() as u32;
                        let mut out = Vec::with_capacity(children.len());
                        for child in children {
                            let child = merge_parent_metadata(&original, child, fan_out);
                            out.push(self.complete(child).await?);
                        }
                        Ok(out)
                    }
                    Err(err) => Ok(vec![self.fail(original, err).await?]),
                }
            }
        }
    }

    /// Marks a record completed and flushes it at the last stage
    async fn complete(&self, mut record: Record) -> Result<Record, SinkError> {
        record.execute_status = Some(ExecuteStatus::Completed);
        self.flush_if_last(&record).await?;
        Ok(record)
    }

    /// Attaches a classified failure marker and flushes at the last stage
    async fn fail(&self, mut record: Record, err: OperatorError) -> Result<Record, SinkError> {
        let code = classify(&err);
        warn!(
            "Operator '{}' failed on record {} ({}): {}",
            self.name, record.file_id, code, err
        );

        record.execute_status = Some(ExecuteStatus::Failed);
        record.failure_reason = Some(FailureReason {
            operator: self.name.clone(),
            code,
            detail: err.to_string(),
        });
        self.flush_if_last(&record).await?;
        Ok(record)
    }

    async fn flush_if_last(&self, record: &Record) -> Result<(), SinkError> {
        if self.is_last {
            self.flush(record).await?;
        }
        Ok(())
    }

    async fn flush(&self, record: &Record) -> Result<(), SinkError> {
        self.sink.record(&RecordOutcome::from_record(record)).await
    }
}

/// Backfills shared parent metadata into a slicer child
///
/// Children keep their own identity and payload; run-wide constants,
/// the file type and extension entries the child did not set itself are
/// inherited from the parent. Every child carries the fan-out size.
fn merge_parent_metadata(parent: &Record, mut child: Record, fan_out: u32) -> Record {
    child.instance_id = parent.instance_id;
    child.slice_count = Some(fan_out);

    if child.export_path.is_empty() {
        child.export_path = parent.export_path.clone();
    }
    if child.file_type.is_empty() {
        child.file_type = parent.file_type.clone();
    }
    if child.file_id.is_empty() {
        child.file_id = parent.file_id.clone();
    }
    if child.file_name.is_empty() {
        child.file_name = parent.file_name.clone();
    }
    if child.file_path.is_empty() {
        child.file_path = parent.file_path.clone();
    }
    for (key, value) in &parent.extensions {
        child
            .extensions
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }

    child
}
