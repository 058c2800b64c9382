//! Error types for the operation algebra.

use thiserror::Error;

/// Result type alias for operation algebra calls.
pub type OtResult<T> = Result<T, OtError>;

/// Length contract violations between operations and the text they act on.
///
/// These never occur when operations are built against the document they are
/// applied to; seeing one means the caller's bookkeeping is out of step.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OtError {
    /// `compose` or `transform` was given operations with unrelated lengths.
    #[error("Incompatible operation lengths: expected {expected}, got {actual}")]
    IncompatibleLengths { expected: usize, actual: usize },

    /// `apply` was given text whose codepoint length is not the base length.
    #[error("Operation base length {expected} does not match text length {actual}")]
    LengthMismatch { expected: usize, actual: usize },
}
