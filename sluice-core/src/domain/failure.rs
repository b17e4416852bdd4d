//! Stable failure codes
//!
//! Error codes attached to records by the engine's classifier. The string
//! forms are part of the audit/API contract and must stay stable.

use serde::{Deserialize, Serialize};

/// Stable classification of an operator-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    NotFound,
    PermissionDenied,
    Timeout,
    ResourceExhausted,
    MalformedInput,
    Unknown,
}

impl ErrorCode {
    /// Returns the stable wire string for this code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::PermissionDenied => "PERMISSION_DENIED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ErrorCode::MalformedInput => "MALFORMED_INPUT",
            ErrorCode::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure detail attached to a record by the call harness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Name of the operator that failed
    pub operator: String,
    /// Stable classified code
    pub code: ErrorCode,
    /// Free-text diagnostic
    pub detail: String,
}
