//! Pipeline executor
//!
//! Turns a [`PipelineConfig`] into a running multi-stage computation over
//! a dataset of records. Each stage runs one operator across a bounded
//! worker pool sized from its resource spec; consecutive stages are
//! connected by bounded channels, so back-pressure is implicit and
//! buffering finite. Per-record operator failures are absorbed by the
//! call harness; only construction problems and audit-sink failures abort
//! a run.

pub mod pool;

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info};

use sluice_core::domain::pipeline::PipelineConfig;
use sluice_core::domain::record::Record;

use crate::config::EngineConfig;
use crate::error::PipelineError;
use crate::executor::pool::pool_size;
use crate::operator::harness::OperatorHarness;
use crate::operator::OperatorInit;
use crate::registry::Registry;
use crate::sink::OutcomeSink;

/// Drives pipeline runs over the shared registry and outcome sink
pub struct Executor {
    registry: Arc<Registry>,
    sink: Arc<OutcomeSink>,
    config: EngineConfig,
}

struct StagePlan {
    harness: Arc<OperatorHarness>,
    workers: usize,
}

impl Executor {
    pub fn new(registry: Arc<Registry>, sink: Arc<OutcomeSink>, config: EngineConfig) -> Self {
        Self {
            registry,
            sink,
            config,
        }
    }

    /// Runs one pipeline to completion
    ///
    /// Returns the surviving output batch: completed records and records
    /// that failed mid-pipeline. Filter-dropped records are excluded (they
    /// are visible through the outcome sink). Cross-record output order is
    /// not guaranteed.
    pub async fn run(
        &self,
        pipeline: &PipelineConfig,
        dataset: Vec<Record>,
    ) -> Result<Vec<Record>, PipelineError> {
        // Fail fast: every construction check runs before a single
        // worker is spawned.
        let plans = self.plan(pipeline)?;

        info!(
            "Starting pipeline {} ({} stage(s), {} record(s))",
            pipeline.instance_id,
            plans.len(),
            dataset.len()
        );

        let mut join: JoinSet<Result<(), PipelineError>> = JoinSet::new();

        let (feed_tx, feed_rx) = mpsc::channel::<Record>(self.config.stage_buffer);
        let mut upstream = feed_rx;

        for plan in plans {
            let (tx, rx) = mpsc::channel::<Record>(self.config.stage_buffer);
            let shared_rx = Arc::new(tokio::sync::Mutex::new(upstream));

            debug!(
                "Stage '{}' running with {} worker(s)",
                plan.harness.name(),
                plan.workers
            );
            for _ in 0..plan.workers {
                join.spawn(stage_worker(
                    plan.harness.clone(),
                    shared_rx.clone(),
                    tx.clone(),
                ));
            }
            // Workers hold the only clones of `tx`; when the stage's pool
            // drains and exits, the downstream channel closes.
            upstream = rx;
        }

        // Feed concurrently with collection so bounded buffers cannot
        // deadlock on large datasets.
        let instance_id = pipeline.instance_id;
        let export_path = pipeline.export_path.clone();
        let feeder = tokio::spawn(async move {
            for record in dataset {
                let record = augment(record, instance_id, &export_path);
                if feed_tx.send(record).await.is_err() {
                    break;
                }
            }
        });

        let mut output = Vec::new();
        while let Some(record) = upstream.recv().await {
            output.push(record);
        }

        feeder
            .await
            .map_err(|e| PipelineError::Worker(e.to_string()))?;

        let mut failure = None;
        while let Some(result) = join.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(err)) => failure = failure.or(Some(err)),
                Err(join_err) => {
                    failure = failure.or(Some(PipelineError::Worker(join_err.to_string())))
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }

        info!(
            "Pipeline {} finished with {} output record(s)",
            pipeline.instance_id,
            output.len()
        );
        Ok(output)
    }

    /// Validates the config and constructs every stage
    fn plan(&self, pipeline: &PipelineConfig) -> Result<Vec<StagePlan>, PipelineError> {
        if pipeline.operators.is_empty() {
            return Err(PipelineError::EmptyPipeline);
        }
        if !pipeline.operators.last().is_some_and(|op| op.is_last) {
            return Err(PipelineError::NoTerminalStage);
        }

        let mut plans = Vec::with_capacity(pipeline.operators.len());
        for spec in &pipeline.operators {
            let workers = pool_size(&spec.name, &spec.resource, &self.config)?;
            let factory = self.registry.resolve(&spec.name)?;

            let init = OperatorInit {
                params: spec.init_params.clone(),
                instance_id: pipeline.instance_id,
                is_first: spec.is_first,
                is_last: spec.is_last,
            };
            let operator = factory.build(init)?;

            plans.push(StagePlan {
                harness: Arc::new(OperatorHarness::new(
                    &spec.name,
                    operator,
                    spec.is_last,
                    self.sink.clone(),
                )),
                workers,
            });
        }
        Ok(plans)
    }
}

/// Backfills run-wide constants into a raw input record
///
/// Existing per-record metadata is never overwritten.
fn augment(mut record: Record, instance_id: uuid::Uuid, export_path: &str) -> Record {
    if record.instance_id.is_nil() {
        record.instance_id = instance_id;
    }
    if record.export_path.is_empty() {
        record.export_path = export_path.to_string();
    }
    record
}

/// One worker of a stage pool
///
/// Pulls from the shared stage input, invokes the harness, forwards the
/// outputs downstream. The receiver lock is held only across `recv`, so
/// pool members process records in parallel.
async fn stage_worker(
    harness: Arc<OperatorHarness>,
    rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Record>>>,
    tx: mpsc::Sender<Record>,
) -> Result<(), PipelineError> {
    loop {
        let record = { rx.lock().await.recv().await };
        let Some(record) = record else {
            return Ok(());
        };

        let outputs = harness.invoke(record).await?;
        for output in outputs {
            if tx.send(output).await.is_err() {
                // Downstream pool is gone; nothing left to do.
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use uuid::Uuid;

    use sluice_core::domain::pipeline::{OperatorSpec, ResourceSpec};
    use sluice_core::domain::record::ExecuteStatus;

    use crate::operator::{Filter, Mapper, Operator, OperatorError, OperatorFactory, Slicer};
    use crate::registry::loader::SearchRootLoader;
    use crate::registry::RegistryError;

    // ---------------------------------------------------------------
    // Test operators
    // ---------------------------------------------------------------

    struct Upper;

    #[async_trait]
    impl Mapper for Upper {
        async fn execute(&self, mut record: Record) -> Result<Record, OperatorError> {
            record.text = record.text.to_uppercase();
            Ok(record)
        }
    }

    struct UpperFactory;

    impl OperatorFactory for UpperFactory {
        fn build(&self, _init: OperatorInit) -> Result<Operator, PipelineError> {
            Ok(Operator::Mapper(Box::new(Upper)))
        }
    }

    struct DropEmptyText;

    #[async_trait]
    impl Filter for DropEmptyText {
        async fn execute(&self, mut record: Record) -> Result<Record, OperatorError> {
            if record.text.is_empty() {
                record.bytes.clear();
            }
            Ok(record)
        }
    }

    struct DropEmptyTextFactory;

    impl OperatorFactory for DropEmptyTextFactory {
        fn build(&self, _init: OperatorInit) -> Result<Operator, PipelineError> {
            Ok(Operator::Filter(Box::new(DropEmptyText)))
        }
    }

    struct SplitWords;

    #[async_trait]
    impl Slicer for SplitWords {
        async fn execute(&self, record: Record) -> Result<Vec<Record>, OperatorError> {
            Ok(record
                .text
                .split_whitespace()
                .enumerate()
                .map(|(idx, word)| {
                    let mut child = Record::new(format!("{}-{}", record.file_id, idx), "");
                    child.text = word.to_string();
                    child
                })
                .collect())
        }
    }

    struct SplitWordsFactory;

    impl OperatorFactory for SplitWordsFactory {
        fn build(&self, _init: OperatorInit) -> Result<Operator, PipelineError> {
            Ok(Operator::Slicer(Box::new(SplitWords)))
        }
    }

    struct FailOn {
        needle: String,
    }

    #[async_trait]
    impl Mapper for FailOn {
        async fn execute(&self, record: Record) -> Result<Record, OperatorError> {
            if record.text.contains(&self.needle) {
                Err(OperatorError::MalformedInput(format!(
                    "payload contains '{}'",
                    self.needle
                )))
            } else {
                Ok(record)
            }
        }
    }

    /// Factory that requires a "needle" init parameter
    struct FailOnFactory;

    impl OperatorFactory for FailOnFactory {
        fn build(&self, init: OperatorInit) -> Result<Operator, PipelineError> {
            let needle = init
                .params
                .get("needle")
                .and_then(|v| v.as_str())
                .ok_or_else(|| PipelineError::construction("fail_on", "missing 'needle' param"))?
                .to_string();
            Ok(Operator::Mapper(Box::new(FailOn { needle })))
        }
    }

    // ---------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------

    async fn executor() -> (Executor, Arc<OutcomeSink>) {
        let registry = Arc::new(Registry::new(Arc::new(SearchRootLoader::unbacked())));
        registry
            .register_factory("upper", Arc::new(UpperFactory), false)
            .unwrap();
        registry
            .register_factory("drop_empty_text", Arc::new(DropEmptyTextFactory), false)
            .unwrap();
        registry
            .register_factory("split_words", Arc::new(SplitWordsFactory), false)
            .unwrap();
        registry
            .register_factory("fail_on", Arc::new(FailOnFactory), false)
            .unwrap();

        let sink = Arc::new(OutcomeSink::in_memory().await.unwrap());
        (
            Executor::new(registry, sink.clone(), EngineConfig::default()),
            sink,
        )
    }

    fn pipeline(operators: Vec<OperatorSpec>) -> PipelineConfig {
        PipelineConfig::new(Uuid::new_v4(), "/data/in", "/data/out", operators)
    }

    fn record(file_id: &str, text: &str) -> Record {
        let mut record = Record::new(file_id, format!("{file_id}.txt"));
        record.text = text.to_string();
        record
    }

    // ---------------------------------------------------------------
    // Tests
    // ---------------------------------------------------------------

    #[tokio::test]
    async fn test_filter_pipeline_end_to_end() {
        // Three records, one with empty text: two survive, three audit
        // rows, one of them size 0.
        let (executor, sink) = executor().await;
        let config = pipeline(vec![OperatorSpec::new("drop_empty_text")]);

        let output = executor
            .run(
                &config,
                vec![record("f-1", "alpha"), record("f-2", ""), record("f-3", "gamma")],
            )
            .await
            .unwrap();

        assert_eq!(output.len(), 2);
        let rows = sink.for_instance(config.instance_id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.iter().filter(|r| r.dest_size == 0).count(), 1);
    }

    #[tokio::test]
    async fn test_mapper_then_slicer() {
        let (executor, sink) = executor().await;
        let config = pipeline(vec![
            OperatorSpec::new("upper"),
            OperatorSpec::new("split_words"),
        ]);

        let output = executor
            .run(&config, vec![record("doc", "alpha beta gamma")])
            .await
            .unwrap();

        assert_eq!(output.len(), 3);
        let mut words: Vec<&str> = output.iter().map(|r| r.text.as_str()).collect();
        words.sort();
        assert_eq!(words, vec!["ALPHA", "BETA", "GAMMA"]);
        for child in &output {
            assert_eq!(child.slice_count, Some(3));
            assert_eq!(child.instance_id, config.instance_id);
        }

        // Slicer was the last stage: every child audited.
        let rows = sink.for_instance(config.instance_id).await.unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[tokio::test]
    async fn test_record_failure_does_not_abort_the_batch() {
        let (executor, sink) = executor().await;
        let mut fail_spec = OperatorSpec::new("fail_on");
        fail_spec
            .init_params
            .insert("needle".to_string(), serde_json::json!("poison"));
        let config = pipeline(vec![fail_spec, OperatorSpec::new("upper")]);

        let output = executor
            .run(
                &config,
                vec![
                    record("f-1", "clean"),
                    record("f-2", "poison pill"),
                    record("f-3", "clean too"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(output.len(), 3);
        let failed: Vec<&Record> = output.iter().filter(|r| r.is_failed()).collect();
        assert_eq!(failed.len(), 1);
        // The later mapper never touched the dead record.
        assert_eq!(failed[0].text, "poison pill");
        let reason = failed[0].failure_reason.as_ref().unwrap();
        assert_eq!(reason.operator, "fail_on");
        assert_eq!(reason.code.as_str(), "MALFORMED_INPUT");

        let rows = sink.for_instance(config.instance_id).await.unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(
            rows.iter()
                .filter(|r| r.status == ExecuteStatus::Failed)
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_operator_fails_before_any_pool() {
        let (executor, _) = executor().await;
        let config = pipeline(vec![OperatorSpec::new("ghost_operator")]);

        let err = executor.run(&config, vec![record("f-1", "x")]).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Registry(RegistryError::OperatorNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_rejected() {
        let (executor, _) = executor().await;
        let config = pipeline(Vec::new());

        let err = executor.run(&config, Vec::new()).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyPipeline));
    }

    #[tokio::test]
    async fn test_pipeline_without_terminal_stage_is_rejected() {
        let (executor, _) = executor().await;
        // Hand-built config bypassing flag normalization.
        let config = PipelineConfig {
            instance_id: Uuid::new_v4(),
            dataset_path: "/in".to_string(),
            export_path: "/out".to_string(),
            operators: vec![OperatorSpec::new("upper")],
        };

        let err = executor.run(&config, vec![record("f-1", "x")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoTerminalStage));
    }

    #[tokio::test]
    async fn test_bad_init_params_fail_construction() {
        let (executor, _) = executor().await;
        // "fail_on" without its required needle param.
        let config = pipeline(vec![OperatorSpec::new("fail_on")]);

        let err = executor.run(&config, vec![record("f-1", "x")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Construction { .. }));
    }

    #[tokio::test]
    async fn test_unsatisfiable_stage_fails_the_run() {
        let (executor, _) = executor().await;
        let spec = OperatorSpec::new("upper").with_resource(ResourceSpec {
            cpu: 1.0,
            accelerator: Some("cuda".to_string()),
            ..Default::default()
        });
        let config = pipeline(vec![spec]);

        let err = executor.run(&config, vec![record("f-1", "x")]).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsatisfiableResource { .. }));
    }

    #[tokio::test]
    async fn test_dataset_augmentation_preserves_existing_metadata() {
        let (executor, _) = executor().await;
        let config = pipeline(vec![OperatorSpec::new("upper")]);

        let mut preset = record("f-1", "x");
        preset.export_path = "/custom/out".to_string();

        let output = executor
            .run(&config, vec![preset, record("f-2", "y")])
            .await
            .unwrap();

        let by_id = |id: &str| output.iter().find(|r| r.file_id == id).unwrap();
        assert_eq!(by_id("f-1").export_path, "/custom/out");
        assert_eq!(by_id("f-2").export_path, "/data/out");
        assert_eq!(by_id("f-2").instance_id, config.instance_id);
    }

    #[tokio::test]
    async fn test_large_batch_drains_through_bounded_buffers() {
        let (executor, sink) = executor().await;
        let config = pipeline(vec![
            OperatorSpec::new("upper"),
            OperatorSpec::new("drop_empty_text"),
        ]);

        // Several times the stage buffer, to exercise back-pressure.
        let dataset: Vec<Record> = (0..500)
            .map(|i| record(&format!("f-{i}"), &format!("payload {i}")))
            .collect();

        let output = executor.run(&config, dataset).await.unwrap();
        assert_eq!(output.len(), 500);
        let rows = sink.for_instance(config.instance_id).await.unwrap();
        assert_eq!(rows.len(), 500);
    }
}
