//! Core error types.

use thiserror::Error;

use crate::catalog::Table;
use crate::constraint::ValidationError;
use crate::provisioning::ProvisioningError;
use crate::security::SecurityError;

/// Core errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Row not found, or not visible to the caller.
    #[error("{table} row not found: {id}")]
    NotFound {
        /// Table that was searched.
        table: Table,
        /// Key of the missing row.
        id: String,
    },

    /// Unique or foreign key constraint violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(#[from] ConstraintError),

    /// Payload failed validation.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Identity provisioning failed.
    #[error("provisioning failed: {0}")]
    Provisioning(#[from] ProvisioningError),

    /// Authorization failure.
    #[error(transparent)]
    Security(#[from] SecurityError),

    /// Cascade processing failed.
    #[error("cascade error: maximum depth {depth} exceeded")]
    CascadeDepthExceeded {
        /// Depth at which processing stopped.
        depth: usize,
    },

    /// Stored data has an unexpected shape.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

/// Constraint violations raised by the data-access layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// A unique value (or primary key) is already taken by another row.
    #[error("duplicate key value violates unique constraint \"{constraint}\": {field} = {value}")]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
        /// Table the constraint belongs to.
        table: Table,
        /// Constrained field.
        field: String,
        /// Conflicting value.
        value: String,
    },

    /// A referenced row does not exist.
    #[error("insert or update on \"{table}\" violates foreign key \"{constraint}\": {field} = {value} is not present")]
    ForeignKeyViolation {
        /// Constraint name.
        constraint: String,
        /// Referencing table.
        table: Table,
        /// Referencing field.
        field: String,
        /// Missing referenced key.
        value: String,
    },

    /// Removing the row would leave an identity without any role.
    #[error("identity {identity} must keep at least one role")]
    RoleRequired {
        /// Identity that would be left without roles.
        identity: String,
    },
}

/// Broad error categories surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A policy refused the operation.
    Denied,
    /// The operation needs an authenticated identity.
    Unauthenticated,
    /// The row does not exist or is not visible.
    NotFound,
    /// A unique value is already taken.
    Duplicate,
    /// The payload or a reference is invalid.
    Invalid,
    /// Identity provisioning failed.
    Provisioning,
    /// Storage or encoding failure.
    Internal,
}

impl Error {
    /// Create a not-found error for a row.
    pub fn not_found(table: Table, id: impl ToString) -> Self {
        Error::NotFound {
            table,
            id: id.to_string(),
        }
    }

    /// Categorize the error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::ConstraintViolation(ConstraintError::UniqueViolation { .. }) => {
                ErrorKind::Duplicate
            }
            Error::ConstraintViolation(_) | Error::Validation(_) => ErrorKind::Invalid,
            Error::Provisioning(_) => ErrorKind::Provisioning,
            Error::Security(SecurityError::AuthenticationRequired)
            | Error::Security(SecurityError::AuthenticationFailed(_)) => ErrorKind::Unauthenticated,
            Error::Security(_) => ErrorKind::Denied,
            Error::Storage(_)
            | Error::Serialization(_)
            | Error::Deserialization(_)
            | Error::CascadeDepthExceeded { .. }
            | Error::InvalidData(_) => ErrorKind::Internal,
        }
    }

    /// Whether the error is a unique constraint violation.
    pub fn is_duplicate(&self) -> bool {
        self.kind() == ErrorKind::Duplicate
    }
}
