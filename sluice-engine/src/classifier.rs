//! Error classifier
//!
//! Pure mapping from an operator failure to a stable [`ErrorCode`]. The
//! classifier is total: every error maps to some code, with `Unknown` as
//! the fallback. It never fails itself.

use sluice_core::domain::failure::ErrorCode;

use crate::operator::OperatorError;

/// Classifies an operator failure into its stable audit code
pub fn classify(err: &OperatorError) -> ErrorCode {
    match err {
        OperatorError::NotFound(_) => ErrorCode::NotFound,
        OperatorError::PermissionDenied(_) => ErrorCode::PermissionDenied,
        OperatorError::Timeout(_) => ErrorCode::Timeout,
        OperatorError::ResourceExhausted(_) => ErrorCode::ResourceExhausted,
        OperatorError::MalformedInput(_) => ErrorCode::MalformedInput,
        OperatorError::Io(io) => classify_io(io),
        OperatorError::Other(_) => ErrorCode::Unknown,
    }
}

/// Maps IO error kinds onto the same stable categories
fn classify_io(err: &std::io::Error) -> ErrorCode {
    use std::io::ErrorKind;

    match err.kind() {
        ErrorKind::NotFound => ErrorCode::NotFound,
        ErrorKind::PermissionDenied => ErrorCode::PermissionDenied,
        ErrorKind::TimedOut => ErrorCode::Timeout,
        ErrorKind::OutOfMemory | ErrorKind::StorageFull | ErrorKind::QuotaExceeded => {
            ErrorCode::ResourceExhausted
        }
        ErrorKind::InvalidData | ErrorKind::InvalidInput | ErrorKind::UnexpectedEof => {
            ErrorCode::MalformedInput
        }
        _ => ErrorCode::Unknown,
    }
}
