//! Sluice Engine
//!
//! Execution core of the Sluice data-processing platform:
//! - Operator contract (Mapper/Filter/Slicer) and its uniform call harness
//! - Error classifier mapping operator failures to stable codes
//! - Operator registry with deferred, search-root based loading
//! - Pipeline executor driving records through resource-aware worker pools
//! - Durable outcome sink for per-record audit rows

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod operator;
pub mod registry;
pub mod sink;

pub use config::{EngineConfig, WorkerCapacity};
pub use error::PipelineError;
pub use executor::Executor;
pub use registry::{Registry, RegistryError};
pub use sink::{OutcomeSink, SinkError};
