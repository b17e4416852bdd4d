//! Sluice Core
//!
//! Core types and abstractions for the Sluice data-processing platform.
//!
//! This crate contains:
//! - Domain types: Core entities (Record, PipelineConfig, Task, RecordOutcome)
//! - DTOs: Data transfer objects for the submission/query surface

pub mod domain;
pub mod dto;
