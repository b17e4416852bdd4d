//! Resource-aware pool sizing
//!
//! Turns a stage's declared [`ResourceSpec`] into a worker count, or
//! rejects the stage outright when no advertised worker can satisfy it.
//! Unsatisfiable specs fail pipeline construction, never individual
//! records.

use sluice_core::domain::pipeline::ResourceSpec;

use crate::config::{EngineConfig, WorkerCapacity};
use crate::error::PipelineError;

/// Computes the worker pool size for one stage
///
/// The size is `floor(capacity.cpus / spec.cpu)` clamped to
/// `[1, max_actor_nums]`. A required accelerator or architecture must be
/// advertised by the capacity, and a declared memory ceiling must fit.
pub fn pool_size(
    operator: &str,
    spec: &ResourceSpec,
    config: &EngineConfig,
) -> Result<usize, PipelineError> {
    if spec.cpu <= 0.0 {
        return Err(PipelineError::invalid_resource(
            operator,
            format!("cpu must be > 0, got {}", spec.cpu),
        ));
    }

    check_capability(operator, spec, &config.capacity)?;

    let by_cpu = (config.capacity.cpus / spec.cpu).floor() as usize;
    Ok(by_cpu.clamp(1, config.max_actor_nums))
}

fn check_capability(
    operator: &str,
    spec: &ResourceSpec,
    capacity: &WorkerCapacity,
) -> Result<(), PipelineError> {
    if spec.cpu > capacity.cpus {
        return Err(PipelineError::UnsatisfiableResource {
            operator: operator.to_string(),
            reason: format!(
                "stage needs {} cpu per worker, workers advertise {}",
                spec.cpu, capacity.cpus
            ),
        });
    }

    if let Some(accelerator) = &spec.accelerator {
        if !capacity.accelerators.iter().any(|a| a == accelerator) {
            return Err(PipelineError::UnsatisfiableResource {
                operator: operator.to_string(),
                reason: format!("required accelerator '{accelerator}' not advertised"),
            });
        }
    }

    if let Some(arch) = &spec.arch {
        if capacity.arch.as_deref() != Some(arch.as_str()) {
            return Err(PipelineError::UnsatisfiableResource {
                operator: operator.to_string(),
                reason: format!(
                    "required arch '{}' does not match worker arch {:?}",
                    arch, capacity.arch
                ),
            });
        }
    }

    if let (Some(needed), Some(available)) = (spec.memory, capacity.memory) {
        if needed > available {
            return Err(PipelineError::UnsatisfiableResource {
                operator: operator.to_string(),
                reason: format!("memory ceiling {needed} exceeds worker memory {available}"),
            });
        }
    }

    Ok(())
}
