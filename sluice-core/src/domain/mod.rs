//! Domain types
//!
//! Core entities shared between the engine (executes) and the
//! scheduler/API layer (tracks and reports).

pub mod failure;
pub mod outcome;
pub mod pipeline;
pub mod record;
pub mod task;
