//! Security-specific error types.

use thiserror::Error;

use super::rls::RlsOperation;
use crate::catalog::Table;

/// Security-related errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    /// No policy granted the operation to the caller.
    #[error("permission denied: {operation} on {table}")]
    PermissionDenied {
        /// Table the operation targeted.
        table: Table,
        /// Operation that was refused.
        operation: RlsOperation,
    },

    /// The operation needs an authenticated identity and the caller has none.
    #[error("authentication required")]
    AuthenticationRequired,

    /// The presented credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
}

/// Result type for security operations.
pub type SecurityResult<T> = Result<T, SecurityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SecurityError::PermissionDenied {
            table: Table::Courses,
            operation: RlsOperation::Insert,
        };
        assert_eq!(err.to_string(), "permission denied: insert on courses");

        let err = SecurityError::AuthenticationFailed("expired token".into());
        assert!(err.to_string().contains("expired token"));
    }
}
