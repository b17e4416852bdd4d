//! Data transfer objects
//!
//! External shapes consumed from / exposed to the API layer. These are the
//! only types the submission and status surfaces serialize.

pub mod pipeline;
pub mod task;
