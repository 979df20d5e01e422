//! Domain-specific error types following panic-free policy.

use crate::SessionId;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Start requested while the session timer is already ticking
    #[error("Timer already running for session {session_id}")]
    AlreadyRunning { session_id: SessionId },

    /// Session identifiers must contain at least one character
    #[error("Session id must not be empty")]
    EmptySessionId,

    /// Invalid field value
    #[error("Invalid {field}: {value} (expected {expected})")]
    InvalidFieldValue {
        field: String,
        value: String,
        expected: String,
    },
}

impl DomainError {
    /// Creates an `InvalidFieldValue` error.
    pub fn invalid_field(
        field: impl Into<String>,
        value: impl Into<String>,
        expected: impl Into<String>,
    ) -> Self {
        Self::InvalidFieldValue {
            field: field.into(),
            value: value.into(),
            expected: expected.into(),
        }
    }
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_display() {
        let err = DomainError::AlreadyRunning {
            session_id: SessionId::new("abc"),
        };
        assert_eq!(err.to_string(), "Timer already running for session abc");

        let err = DomainError::invalid_field("remainingTime", "\"ten\"", "a non-negative integer");
        assert_eq!(
            err.to_string(),
            "Invalid remainingTime: \"ten\" (expected a non-negative integer)"
        );
    }
}
