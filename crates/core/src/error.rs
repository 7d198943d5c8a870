//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Deterministic failures only: malformed input, broken invariants, unknown
/// records. Store and transport failures have their own error types in
/// `billseq-infra`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. a failure rate outside `0..=1`).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier did not have the expected shape.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A state transition would break an invoice invariant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The requested record does not exist (or was soft-deleted).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }
}
