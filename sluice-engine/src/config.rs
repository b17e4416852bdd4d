//! Engine configuration
//!
//! Bounds for stage worker pools and the advertised capabilities of the
//! physical workers stages are scheduled onto. Everything is configurable
//! so the same engine tunes for laptops and accelerator hosts.

use serde::{Deserialize, Serialize};

/// Capabilities advertised by the workers this engine schedules onto
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerCapacity {
    /// Total CPU available for stage workers
    pub cpus: f64,
    /// Total memory in bytes, if bounded
    pub memory: Option<u64>,
    /// Accelerator tags available (e.g. "cuda", "npu")
    pub accelerators: Vec<String>,
    /// Worker architecture tag (e.g. "x86_64")
    pub arch: Option<String>,
}

impl Default for WorkerCapacity {
    fn default() -> Self {
        Self {
            cpus: 4.0,
            memory: None,
            accelerators: Vec::new(),
            arch: Some(std::env::consts::ARCH.to_string()),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on workers per stage
    pub max_actor_nums: usize,
    /// Bounded buffer size between consecutive stages
    pub stage_buffer: usize,
    pub capacity: WorkerCapacity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_actor_nums: 4,
            stage_buffer: 64,
            capacity: WorkerCapacity::default(),
        }
    }
}

impl EngineConfig {
    /// Creates configuration from environment variables
    ///
    /// Expected environment variables:
    /// - SLUICE_MAX_ACTORS (optional, default: 4)
    /// - SLUICE_STAGE_BUFFER (optional, default: 64)
    /// - SLUICE_WORKER_CPUS (optional, default: 4.0)
    /// - SLUICE_WORKER_MEMORY (optional, bytes)
    /// - SLUICE_ACCELERATORS (optional, comma separated tags)
    /// - SLUICE_ARCH (optional, default: compile-time arch)
    pub fn from_env() -> Self {
        let max_actor_nums = std::env::var("SLUICE_MAX_ACTORS")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(4);

        let stage_buffer = std::env::var("SLUICE_STAGE_BUFFER")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(64);

        let cpus = std::env::var("SLUICE_WORKER_CPUS")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .unwrap_or(4.0);

        let memory = std::env::var("SLUICE_WORKER_MEMORY")
            .ok()
            .and_then(|s| s.parse::<u64>().ok());

        let accelerators = std::env::var("SLUICE_ACCELERATORS")
            .map(|s| {
                s.split(',')
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let arch = std::env::var("SLUICE_ARCH")
            .ok()
            .or_else(|| Some(std::env::consts::ARCH.to_string()));

        Self {
            max_actor_nums,
            stage_buffer,
            capacity: WorkerCapacity {
                cpus,
                memory,
                accelerators,
                arch,
            },
        }
    }

    /// Adds an accelerator tag to the advertised capacity
    pub fn with_accelerator(mut self, tag: impl Into<String>) -> Self {
        self.capacity.accelerators.push(tag.into());
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_actor_nums == 0 {
            return Err("max_actor_nums must be greater than 0".to_string());
        }
        if self.stage_buffer == 0 {
            return Err("stage_buffer must be greater than 0".to_string());
        }
        if self.capacity.cpus <= 0.0 {
            return Err("worker cpus must be greater than 0".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_actor_nums, 4);
        assert_eq!(config.stage_buffer, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();
        assert!(config.validate().is_ok());

        config.max_actor_nums = 0;
        assert!(config.validate().is_err());

        config.max_actor_nums = 4;
        config.capacity.cpus = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_with_accelerator() {
        let config = EngineConfig::default()
            .with_accelerator("cuda")
            .with_accelerator("npu");
        assert_eq!(config.capacity.accelerators, vec!["cuda", "npu"]);
    }
}
